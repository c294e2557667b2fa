//! Postgres-native enum types shared across entities.
//!
//! Each follows the teacher's `TrackerModel` pattern: `DeriveActiveEnum`
//! with an explicit `string_value` per variant, so the database column is a
//! real `ENUM` type rather than a checked-nowhere text column.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};
use utoipa::ToSchema;

#[derive(
    Eq, Clone, Debug, Display, EnumIter, ToSchema, Serialize, PartialEq, Deserialize, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "contact_status")]
pub enum ContactStatus {
    #[sea_orm(string_value = "subscribed")]
    Subscribed,
    #[sea_orm(string_value = "unsubscribed")]
    Unsubscribed,
    #[sea_orm(string_value = "cleaned")]
    Cleaned,
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "bounced")]
    Bounced,
    #[sea_orm(string_value = "complained")]
    Complained,
}

#[derive(
    Eq, Clone, Debug, Display, EnumIter, ToSchema, Serialize, PartialEq, Deserialize, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "engagement_level")]
pub enum EngagementLevel {
    #[sea_orm(string_value = "new")]
    New,
    #[sea_orm(string_value = "cold")]
    Cold,
    #[sea_orm(string_value = "cooling")]
    Cooling,
    #[sea_orm(string_value = "warm")]
    Warm,
    #[sea_orm(string_value = "hot")]
    Hot,
}

#[derive(
    Eq, Clone, Debug, Display, EnumIter, ToSchema, Serialize, PartialEq, Deserialize, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "bounce_type")]
pub enum BounceType {
    #[sea_orm(string_value = "soft")]
    Soft,
    #[sea_orm(string_value = "hard")]
    Hard,
}

#[derive(
    Eq, Clone, Debug, Display, EnumIter, ToSchema, Serialize, PartialEq, Deserialize, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "list_membership_status")]
pub enum ListMembershipStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "unsubscribed")]
    Unsubscribed,
    #[sea_orm(string_value = "removed")]
    Removed,
}

#[derive(
    Eq, Clone, Debug, Display, EnumIter, ToSchema, Serialize, PartialEq, Deserialize, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "campaign_schedule_kind")]
pub enum CampaignScheduleKind {
    #[sea_orm(string_value = "immediate")]
    Immediate,
    #[sea_orm(string_value = "scheduled")]
    Scheduled,
    #[sea_orm(string_value = "optimal")]
    Optimal,
}

#[derive(
    Eq, Clone, Debug, Display, EnumIter, ToSchema, Serialize, PartialEq, Deserialize, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "campaign_status")]
pub enum CampaignStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "scheduled")]
    Scheduled,
    #[sea_orm(string_value = "queued")]
    Queued,
    #[sea_orm(string_value = "sending")]
    Sending,
    #[sea_orm(string_value = "paused")]
    Paused,
    #[sea_orm(string_value = "sent")]
    Sent,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "failed")]
    Failed,
}

#[derive(
    Eq, Clone, Debug, Display, EnumIter, ToSchema, Serialize, PartialEq, Deserialize, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "email_log_status")]
pub enum EmailLogStatus {
    #[sea_orm(string_value = "queued")]
    Queued,
    #[sea_orm(string_value = "sent")]
    Sent,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "bounced")]
    Bounced,
    #[sea_orm(string_value = "dropped")]
    Dropped,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "complained")]
    Complained,
}

impl EmailLogStatus {
    /// The monotonic position of this status along the path
    /// `queued -> sent -> delivered -> {bounced|complained}`, used to
    /// silently discard regressing writes. Terminal statuses reachable from
    /// multiple points (`failed`, `dropped`) share the last rank since they
    /// can follow any prior status.
    pub fn rank(&self) -> u8 {
        match self {
            EmailLogStatus::Queued => 0,
            EmailLogStatus::Sent => 1,
            EmailLogStatus::Delivered => 2,
            EmailLogStatus::Bounced | EmailLogStatus::Complained => 3,
            EmailLogStatus::Failed | EmailLogStatus::Dropped => 3,
        }
    }
}

#[derive(
    Eq, Clone, Debug, Display, EnumIter, ToSchema, Serialize, PartialEq, Deserialize, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "automation_enrollment_status")]
pub enum AutomationEnrollmentStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "waiting")]
    Waiting,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "exited")]
    Exited,
    #[sea_orm(string_value = "error")]
    Error,
}

#[derive(
    Eq, Clone, Debug, Display, EnumIter, ToSchema, Serialize, PartialEq, Deserialize, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "job_status")]
pub enum JobStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "stalled")]
    Stalled,
}

#[derive(
    Eq, Clone, Debug, Display, EnumIter, ToSchema, Serialize, PartialEq, Deserialize, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "job_backoff_kind")]
pub enum JobBackoffKind {
    #[sea_orm(string_value = "fixed")]
    Fixed,
    #[sea_orm(string_value = "exponential")]
    Exponential,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_log_status_rank_is_monotonic_along_happy_path() {
        assert!(EmailLogStatus::Queued.rank() < EmailLogStatus::Sent.rank());
        assert!(EmailLogStatus::Sent.rank() < EmailLogStatus::Delivered.rank());
        assert!(EmailLogStatus::Delivered.rank() <= EmailLogStatus::Bounced.rank());
    }
}
