//! Condition evaluation shared by segment membership (§4.5) and automation
//! step/enrollment conditions (§4.12). Both are "does this contact's data
//! satisfy this stored boolean expression" checks over the same
//! `shared::value::Value` document shape the renderer's context uses, which
//! is exactly what `Value::lookup_path`/`Value::contains` were built for.

use serde::{Deserialize, Serialize};
use shared::value::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    Equals { field: String, value: Value },
    NotEquals { field: String, value: Value },
    Contains { field: String, value: Value },
    NotContains { field: String, value: Value },
    InList { field: String, values: Vec<Value> },
    HasTag { tag: String },
    GreaterThan { field: String, value: Value },
    LessThan { field: String, value: Value },
    IsSet { field: String },
    IsNotSet { field: String },
    /// Whether the contact has opened a campaign email; `campaign_id`
    /// scopes the check to one campaign's tracked opens when present
    /// (looked up from `openedCampaignIds` on the context), otherwise
    /// falls back to "has ever opened anything" via `engagementOpened`.
    OpenedEmail { campaign_id: Option<i32> },
    /// Same scoping rule as `OpenedEmail`, over `clickedCampaignIds` /
    /// `engagementClicked`.
    ClickedEmail { campaign_id: Option<i32> },
    And { conditions: Vec<Condition> },
    Or { conditions: Vec<Condition> },
    Not { condition: Box<Condition> },
}

/// Evaluates `condition` against `context` (typically a `contact.*`-rooted
/// document as produced by `core::render::build_context`, or a bare contact
/// document for segment compilation). Missing fields evaluate to "no match"
/// rather than erroring — a segment referencing a field a contact doesn't
/// have simply excludes that contact.
pub fn evaluate(condition: &Condition, context: &Value) -> bool {
    match condition {
        Condition::Equals { field, value } => {
            context.lookup_path(field).is_some_and(|v| v == value)
        }
        Condition::NotEquals { field, value } => {
            !context.lookup_path(field).is_some_and(|v| v == value)
        }
        Condition::Contains { field, value } => context
            .lookup_path(field)
            .is_some_and(|v| v.contains(value)),
        Condition::NotContains { field, value } => !context
            .lookup_path(field)
            .is_some_and(|v| v.contains(value)),
        Condition::InList { field, values } => context
            .lookup_path(field)
            .is_some_and(|v| values.contains(v)),
        Condition::HasTag { tag } => context
            .lookup_path("tags")
            .is_some_and(|v| v.contains(&Value::String(tag.clone()))),
        Condition::GreaterThan { field, value } => {
            matches!(
                context.lookup_path(field).and_then(|v| v.partial_cmp_numeric(value)),
                Some(std::cmp::Ordering::Greater)
            )
        }
        Condition::LessThan { field, value } => {
            matches!(
                context.lookup_path(field).and_then(|v| v.partial_cmp_numeric(value)),
                Some(std::cmp::Ordering::Less)
            )
        }
        Condition::IsSet { field } => context
            .lookup_path(field)
            .is_some_and(|v| !v.is_nullish()),
        Condition::IsNotSet { field } => context
            .lookup_path(field)
            .map(|v| v.is_nullish())
            .unwrap_or(true),
        Condition::OpenedEmail { campaign_id } => {
            engagement_check(context, *campaign_id, "openedCampaignIds", "engagementOpened")
        }
        Condition::ClickedEmail { campaign_id } => {
            engagement_check(context, *campaign_id, "clickedCampaignIds", "engagementClicked")
        }
        Condition::And { conditions } => conditions.iter().all(|c| evaluate(c, context)),
        Condition::Or { conditions } => conditions.iter().any(|c| evaluate(c, context)),
        Condition::Not { condition } => !evaluate(condition, context),
    }
}

fn engagement_check(context: &Value, campaign_id: Option<i32>, list_field: &str, count_field: &str) -> bool {
    match campaign_id {
        Some(id) => context
            .lookup_path(list_field)
            .is_some_and(|v| v.contains(&Value::Int(id as i64))),
        None => context
            .lookup_path(count_field)
            .and_then(|v| v.as_f64())
            .is_some_and(|n| n > 0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact_ctx() -> Value {
        let mut c = Value::object();
        c.set("firstName", "Ada");
        c.set("tags", Value::List(vec![Value::String("vip".into())]));
        c.set("score", 42_i64);
        c
    }

    #[test]
    fn equals_matches_exact_field() {
        let cond = Condition::Equals {
            field: "firstName".into(),
            value: Value::String("Ada".into()),
        };
        assert!(evaluate(&cond, &contact_ctx()));
    }

    #[test]
    fn has_tag_checks_tags_list() {
        let cond = Condition::HasTag { tag: "vip".into() };
        assert!(evaluate(&cond, &contact_ctx()));
        let cond = Condition::HasTag { tag: "gold".into() };
        assert!(!evaluate(&cond, &contact_ctx()));
    }

    #[test]
    fn and_requires_all_subconditions() {
        let cond = Condition::And {
            conditions: vec![
                Condition::HasTag { tag: "vip".into() },
                Condition::GreaterThan {
                    field: "score".into(),
                    value: Value::Int(10),
                },
            ],
        };
        assert!(evaluate(&cond, &contact_ctx()));
    }

    #[test]
    fn missing_field_does_not_match() {
        let cond = Condition::Equals {
            field: "missing".into(),
            value: Value::String("x".into()),
        };
        assert!(!evaluate(&cond, &contact_ctx()));
    }

    #[test]
    fn in_list_matches_any_member() {
        let cond = Condition::InList {
            field: "firstName".into(),
            values: vec![Value::String("Ada".into()), Value::String("Grace".into())],
        };
        assert!(evaluate(&cond, &contact_ctx()));
    }

    #[test]
    fn not_contains_is_negation_of_contains() {
        let cond = Condition::NotContains {
            field: "tags".into(),
            value: Value::String("vip".into()),
        };
        assert!(!evaluate(&cond, &contact_ctx()));
    }

    #[test]
    fn opened_email_falls_back_to_engagement_count() {
        let mut ctx = contact_ctx();
        ctx.set("engagementOpened", 3_i64);
        let cond = Condition::OpenedEmail { campaign_id: None };
        assert!(evaluate(&cond, &ctx));
    }

    #[test]
    fn opened_email_scoped_to_campaign_checks_id_list() {
        let mut ctx = contact_ctx();
        ctx.set("openedCampaignIds", Value::List(vec![Value::Int(7)]));
        assert!(evaluate(&Condition::OpenedEmail { campaign_id: Some(7) }, &ctx));
        assert!(!evaluate(&Condition::OpenedEmail { campaign_id: Some(8) }, &ctx));
    }
}
