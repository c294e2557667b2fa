use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::enums::EmailLogStatus;

/// One row per `(campaign_or_automation, contact)` send attempt. The
/// `tracking_id` is the public tracking-URL namespace (§4.9); `events` is
/// append-only and lives in `email_log_event` since the tracking endpoints
/// write to it independently of the parent row, while `tracked_links` is a
/// `jsonb` column because it's written once at creation and only ever read
/// back as a whole map keyed by link index.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "email_log")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub created_at: DateTime<Utc>,
    pub org_id: i32,
    pub contact_id: i32,

    pub campaign_id: Option<i32>,
    pub automation_id: Option<i32>,

    #[sea_orm(unique, column_type = "Text")]
    pub tracking_id: String,
    #[sea_orm(unique, nullable)]
    pub message_id: Option<String>,

    pub status: EmailLogStatus,

    pub opened: bool,
    pub clicked: bool,
    pub unsubscribed: bool,
    pub complained: bool,
    pub first_opened_at: Option<DateTime<Utc>>,
    pub first_clicked_at: Option<DateTime<Utc>>,
    pub open_count: i32,
    pub click_count: i32,

    pub delivery_attempts: i32,

    /// `{ "0": "https://...", "1": "https://..." }` keyed by link index
    #[sea_orm(column_type = "JsonBinary")]
    pub tracked_links: Json,

    pub expires_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::contact::Entity",
        from = "Column::ContactId",
        to = "super::contact::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Contact,
    #[sea_orm(
        belongs_to = "super::campaign::Entity",
        from = "Column::CampaignId",
        to = "super::campaign::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Campaign,
    #[sea_orm(has_many = "super::email_log_event::Entity")]
    EmailLogEvent,
}

impl Related<super::contact::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Contact.def()
    }
}

impl Related<super::campaign::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Campaign.def()
    }
}

impl Related<super::email_log_event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EmailLogEvent.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether `next` would regress the monotonic status path
    /// `queued -> sent -> delivered -> {bounced|complained}`; regressing
    /// writes must be silently discarded per the concurrency model.
    pub fn would_regress(&self, next: &EmailLogStatus) -> bool {
        next.rank() < self.status.rank()
    }

    /// Generates a fresh 128-bit tracking id as 32 lowercase hex chars.
    pub fn generate_tracking_id() -> String {
        let bytes: [u8; 16] = rand::random();
        hex::encode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tracking_id_is_32_hex_chars() {
        let id = Model::generate_tracking_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn delivered_to_sent_regression_is_detected() {
        assert!(EmailLogStatus::Sent.rank() < EmailLogStatus::Delivered.rank());
    }
}
