use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::enums::AutomationEnrollmentStatus;

/// Per-contact automation state. The engine's per-minute tick queries
/// `status = active AND next_action_at <= now`, so this needs to be its own
/// indexed table rather than a JSON array nested on `Contact`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "automation_enrollment")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub automation_id: i32,
    pub contact_id: i32,

    pub current_step_index: i32,
    pub status: AutomationEnrollmentStatus,
    pub next_action_at: Option<DateTime<Utc>>,

    pub enrolled_at: DateTime<Utc>,
    pub terminated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::automation::Entity",
        from = "Column::AutomationId",
        to = "super::automation::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Automation,
    #[sea_orm(
        belongs_to = "super::contact::Entity",
        from = "Column::ContactId",
        to = "super::contact::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Contact,
}

impl Related<super::automation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Automation.def()
    }
}

impl Related<super::contact::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Contact.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether a contact whose prior enrollment terminated at
    /// `terminated_at` may be enrolled again, given the automation's
    /// re-entry policy.
    pub fn can_reenter(terminated_at: DateTime<Utc>, allow_reentry: bool, reentry_wait_days: i64, now: DateTime<Utc>) -> bool {
        allow_reentry && now >= terminated_at + chrono::Duration::days(reentry_wait_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn reentry_blocked_before_wait_elapses() {
        let terminated_at = Utc::now() - Duration::days(1);
        assert!(!Model::can_reenter(terminated_at, true, 7, Utc::now()));
    }

    #[test]
    fn reentry_allowed_after_wait_elapses() {
        let terminated_at = Utc::now() - Duration::days(8);
        assert!(Model::can_reenter(terminated_at, true, 7, Utc::now()));
    }

    #[test]
    fn reentry_disabled_never_allowed() {
        let terminated_at = Utc::now() - Duration::days(365);
        assert!(!Model::can_reenter(terminated_at, false, 7, Utc::now()));
    }
}
