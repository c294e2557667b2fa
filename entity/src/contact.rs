use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::enums::{BounceType, ContactStatus, EngagementLevel};

/// Unique per `(org_id, lower(email))`. Profile fields beyond the ones named
/// by the spec (first/last name) are organization-defined and live in
/// `profile` as free-form JSON, mirroring how automation conditions and the
/// renderer already treat contact fields as a dotted-path document.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "contact")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub created_at: DateTime<Utc>,
    pub org_id: i32,

    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,

    #[sea_orm(column_type = "JsonBinary")]
    pub profile: Json,

    pub status: ContactStatus,

    /// lowercased tag strings
    #[sea_orm(column_type = "JsonBinary")]
    pub tags: Json,

    pub engagement_received: i32,
    pub engagement_opened: i32,
    pub engagement_clicked: i32,
    pub engagement_score: i16,
    pub engagement_level: EngagementLevel,
    pub last_opened_at: Option<DateTime<Utc>>,
    pub last_clicked_at: Option<DateTime<Utc>>,

    pub bounce_count: i32,
    pub complaint_count: i32,
    pub last_bounce_type: Option<BounceType>,
    pub last_bounce_at: Option<DateTime<Utc>>,

    pub unsubscribe_reason: Option<String>,
    pub unsubscribed_from_campaign_id: Option<i32>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::organization::Entity",
        from = "Column::OrgId",
        to = "super::organization::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Organization,
    #[sea_orm(has_many = "super::contact_list_membership::Entity")]
    ContactListMembership,
    #[sea_orm(has_many = "super::email_log::Entity")]
    EmailLog,
    #[sea_orm(has_many = "super::automation_enrollment::Entity")]
    AutomationEnrollment,
}

impl Related<super::organization::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Organization.def()
    }
}

impl Related<super::contact_list_membership::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ContactListMembership.def()
    }
}

impl Related<super::email_log::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EmailLog.def()
    }
}

impl Related<super::automation_enrollment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AutomationEnrollment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Derives `(score, level)` from the raw engagement counters.
///
/// Thresholds follow the glossary: a contact that has never received an
/// email is `new`; beyond that, score is weighted toward clicks (stronger
/// engagement signal) over opens, capped at 100.
pub fn engagement_score(received: i32, opened: i32, clicked: i32) -> (i16, EngagementLevel) {
    if received == 0 {
        return (0, EngagementLevel::New);
    }

    let open_rate = opened as f64 / received as f64;
    let click_rate = clicked as f64 / received as f64;
    let raw = (open_rate * 40.0) + (click_rate * 60.0);
    let score = raw.clamp(0.0, 100.0).round() as i16;

    let level = match score {
        0 => EngagementLevel::Cold,
        1..=24 => EngagementLevel::Cooling,
        25..=59 => EngagementLevel::Warm,
        _ => EngagementLevel::Hot,
    };

    (score, level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_received_is_new() {
        assert_eq!(engagement_score(0, 0, 0), (0, EngagementLevel::New));
    }

    #[test]
    fn no_engagement_is_cold() {
        assert_eq!(engagement_score(10, 0, 0), (0, EngagementLevel::Cold));
    }

    #[test]
    fn heavy_clicker_is_hot() {
        let (score, level) = engagement_score(10, 8, 6);
        assert!(score > 59);
        assert_eq!(level, EngagementLevel::Hot);
    }
}
