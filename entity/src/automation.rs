use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// A workflow object. `steps` is always read/written as the whole ordered
/// list the engine walks by index, so it's `jsonb` rather than a child
/// table; `stats` are denormalized counters bumped as enrollments
/// complete/exit.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "automation")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub created_at: DateTime<Utc>,
    pub org_id: i32,
    pub name: String,

    pub active: bool,

    /// `{ kind: "subscription"|"tag_change"|"contact_event"|"date_field"|"manual", ... }`
    #[sea_orm(column_type = "JsonBinary")]
    pub trigger: Json,

    /// ordered steps, each `{ kind, condition?, policy, ... }`
    #[sea_orm(column_type = "JsonBinary")]
    pub steps: Json,

    /// `{ goal?, exitConditions: [...], sendWindow?, allowReentry, reentryWaitDays }`
    #[sea_orm(column_type = "JsonBinary")]
    pub settings: Json,

    pub stats_active: i32,
    pub stats_completed: i32,
    pub stats_exited: i32,
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
    #[sea_orm(has_many = "super::automation_enrollment::Entity")]
    AutomationEnrollment,
}

impl Related<super::organization::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Organization.def()
    }
}

impl Related<super::automation_enrollment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AutomationEnrollment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
