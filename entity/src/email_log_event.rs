use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// One tagged entry in an `EmailLog`'s append-only events log
/// (`processing`, `sent`, `failed`, `delivered`, `open`, `click`,
/// `bounce`, `complaint`, `unsubscribe`). `details` carries event-specific
/// fields (attempt number, click url, bounce reason, request metadata).
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "email_log_event")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub email_log_id: i32,
    pub kind: String,
    pub occurred_at: DateTime<Utc>,

    #[sea_orm(column_type = "JsonBinary")]
    pub details: Json,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::email_log::Entity",
        from = "Column::EmailLogId",
        to = "super::email_log::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    EmailLog,
}

impl Related<super::email_log::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EmailLog.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
