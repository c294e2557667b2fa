use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Append-only log of raw provider notifications, TTL 90 days. Drives the
/// suppression list: a permanent bounce or complaint here is what makes
/// `suppression` authoritative for the organization.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "feedback_log")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub org_id: i32,
    #[sea_orm(unique)]
    pub feedback_id: String,
    pub email_log_id: Option<i32>,

    pub kind: String,
    pub email: String,
    pub timestamp: DateTime<Utc>,

    #[sea_orm(column_type = "JsonBinary")]
    pub details: Json,

    /// Set once the analytics reducer has applied this event's counter
    /// updates; the reducer checks this (not just its own job's delivery
    /// count) so a redelivered `process-event` job is a no-op rather than a
    /// double count.
    pub processed_at: Option<DateTime<Utc>>,
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
}

impl Related<super::organization::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Organization.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
