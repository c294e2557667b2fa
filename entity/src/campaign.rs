use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::enums::{CampaignScheduleKind, CampaignStatus};

/// The send unit. Recipient selectors and A/B test config are always
/// read/written whole (the resolver and dispatcher load the full campaign
/// before acting), so they're `jsonb` columns rather than child tables; the
/// `errors` log is a small capped array for the same reason.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "campaign")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub created_at: DateTime<Utc>,
    pub org_id: i32,
    pub name: String,

    /// `{ lists: [i32], segments: [i32], excludeLists: [i32], excludeSegments: [i32], excludeRecentDays: Option<i32> }`
    #[sea_orm(column_type = "JsonBinary")]
    pub selectors: Json,

    pub template_id: Option<i32>,
    #[sea_orm(column_type = "Text", nullable)]
    pub inline_html: Option<String>,
    pub subject: String,
    pub from_name: String,
    pub from_email: String,
    pub reply_to: Option<String>,

    pub schedule_kind: CampaignScheduleKind,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub timezone: Option<String>,

    pub track_opens: bool,
    pub track_clicks: bool,

    /// A/B test config: `{ variants: [{name, percentage, templateId}], winnerMetric, testDurationMinutes }`, null if disabled
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub ab_test: Option<Json>,

    pub status: CampaignStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub progress_total: i32,
    pub progress_processed: i32,
    pub progress_failed: i32,
    pub progress_percentage: i16,

    pub analytics_sent: i32,
    pub analytics_delivered: i32,
    pub analytics_opens: i32,
    pub analytics_unique_opens: i32,
    pub analytics_clicks: i32,
    pub analytics_unique_clicks: i32,
    pub analytics_bounced: i32,
    pub analytics_soft_bounced: i32,
    pub analytics_hard_bounced: i32,
    pub analytics_complained: i32,
    pub analytics_unsubscribed: i32,

    /// `url -> click count`
    #[sea_orm(column_type = "JsonBinary")]
    pub link_clicks: Json,

    /// capped array of `{type, message, count, lastOccurredAt}`
    #[sea_orm(column_type = "JsonBinary")]
    pub errors: Json,
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
    #[sea_orm(
        belongs_to = "super::template::Entity",
        from = "Column::TemplateId",
        to = "super::template::Column::Id",
        on_update = "Cascade",
        on_delete = "SetNull"
    )]
    Template,
    #[sea_orm(has_many = "super::email_log::Entity")]
    EmailLog,
}

impl Related<super::organization::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Organization.def()
    }
}

impl Related<super::template::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Template.def()
    }
}

impl Related<super::email_log::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EmailLog.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Derived rates, recomputed after every counter write per §4.8: zero
/// denominators produce zero, resolution is two decimal places.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CampaignRates {
    pub delivery_rate: f64,
    pub open_rate: f64,
    pub click_rate: f64,
    pub click_to_open_rate: f64,
    pub bounce_rate: f64,
    pub unsubscribe_rate: f64,
    pub complaint_rate: f64,
}

fn round2(ratio: f64) -> f64 {
    (ratio * 10000.0).round() / 100.0
}

fn safe_ratio(numerator: i32, denominator: i32) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        round2(numerator as f64 / denominator as f64)
    }
}

impl Model {
    pub fn rates(&self) -> CampaignRates {
        CampaignRates {
            delivery_rate: safe_ratio(self.analytics_delivered, self.analytics_sent),
            bounce_rate: safe_ratio(self.analytics_bounced, self.analytics_sent),
            open_rate: safe_ratio(self.analytics_unique_opens, self.analytics_delivered),
            click_rate: safe_ratio(self.analytics_unique_clicks, self.analytics_delivered),
            click_to_open_rate: safe_ratio(self.analytics_unique_clicks, self.analytics_unique_opens),
            unsubscribe_rate: safe_ratio(self.analytics_unsubscribed, self.analytics_sent),
            complaint_rate: safe_ratio(self.analytics_complained, self.analytics_sent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Model {
        Model {
            id: 1,
            created_at: Utc::now(),
            org_id: 1,
            name: "test".into(),
            selectors: Json::Null,
            template_id: None,
            inline_html: None,
            subject: "hi".into(),
            from_name: "Acme".into(),
            from_email: "acme@example.com".into(),
            reply_to: None,
            schedule_kind: CampaignScheduleKind::Immediate,
            scheduled_at: None,
            timezone: None,
            track_opens: true,
            track_clicks: true,
            ab_test: None,
            status: CampaignStatus::Sent,
            started_at: None,
            completed_at: None,
            progress_total: 100,
            progress_processed: 100,
            progress_failed: 0,
            progress_percentage: 100,
            analytics_sent: 100,
            analytics_delivered: 90,
            analytics_opens: 50,
            analytics_unique_opens: 45,
            analytics_clicks: 20,
            analytics_unique_clicks: 18,
            analytics_bounced: 10,
            analytics_soft_bounced: 3,
            analytics_hard_bounced: 7,
            analytics_complained: 1,
            analytics_unsubscribed: 2,
            link_clicks: Json::Null,
            errors: Json::Null,
        }
    }

    #[test]
    fn zero_denominator_rates_are_zero_not_error() {
        let mut m = sample();
        m.analytics_sent = 0;
        m.analytics_delivered = 0;
        let rates = m.rates();
        assert_eq!(rates.delivery_rate, 0.0);
        assert_eq!(rates.open_rate, 0.0);
    }

    #[test]
    fn rates_round_to_two_decimal_places() {
        let rates = sample().rates();
        assert_eq!(rates.delivery_rate, 90.0);
        assert_eq!(rates.open_rate, round2(45.0 / 90.0));
    }
}
