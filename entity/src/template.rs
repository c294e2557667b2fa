use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// The template's current content lives on the row itself (what the
/// renderer and editor read/write most often); `template_version` holds the
/// append-only, capped history.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "template")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub created_at: DateTime<Utc>,
    pub org_id: i32,
    pub name: String,

    pub subject: String,
    #[sea_orm(column_type = "Text")]
    pub html: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub text: Option<String>,

    /// `{path, defaultValue}` pairs: paths auto-extracted from `{{ path.expr }}`
    /// tokens in `subject`/`html` on save, each carrying whatever default the
    /// caller declared for it (empty if none), used by the renderer before it
    /// falls back to an empty string.
    #[sea_orm(column_type = "JsonBinary")]
    pub variables: Json,

    pub current_version: i32,
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
    #[sea_orm(has_many = "super::template_version::Entity")]
    TemplateVersion,
}

impl Related<super::organization::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Organization.def()
    }
}

impl Related<super::template_version::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TemplateVersion.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
