use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// `stats` is denormalized (count of active/unsubscribed/removed members)
/// and refreshed periodically by the scheduler rather than computed on
/// every read; see `core::scheduler`'s list-stats refresh sweep.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "list")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub created_at: DateTime<Utc>,
    pub org_id: i32,
    pub name: String,

    pub stats_active_count: i32,
    pub stats_unsubscribed_count: i32,
    pub stats_removed_count: i32,
    pub stats_refreshed_at: Option<DateTime<Utc>>,
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

impl ActiveModelBehavior for ActiveModel {}
