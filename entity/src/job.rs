use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::enums::{JobBackoffKind, JobStatus};

/// A durable job row. `queue` is one of `shared::constants`'s named queues;
/// `core::queue` claims rows via `SELECT ... FOR UPDATE SKIP LOCKED` rather
/// than a broker, so the lease fields (`locked_by`, `lease_expires_at`)
/// live directly on the row instead of in a separate channel/ack protocol.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "job")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub queue: String,
    pub status: JobStatus,

    #[sea_orm(column_type = "JsonBinary")]
    pub payload: Json,

    pub priority: i16,
    pub attempts: i32,
    pub max_attempts: i32,
    pub stalled_count: i32,

    pub backoff_kind: JobBackoffKind,
    pub backoff_base_millis: i32,

    pub not_before: DateTime<Utc>,
    pub created_at: DateTime<Utc>,

    pub locked_by: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,

    pub remove_on_complete: bool,
    pub remove_on_fail: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// `baseMillis * 2^(attempts-1)`, capped, per the exponential backoff
    /// rule; `attempts` is the count *before* this retry is scheduled.
    pub fn exponential_backoff_millis(base_millis: i64, attempts: i32, cap_millis: i64) -> i64 {
        let exponent = (attempts.max(1) - 1).min(20) as u32;
        let delay = base_millis.saturating_mul(2_i64.saturating_pow(exponent));
        delay.min(cap_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let cap = 3_600_000;
        assert_eq!(Model::exponential_backoff_millis(10_000, 1, cap), 10_000);
        assert_eq!(Model::exponential_backoff_millis(10_000, 2, cap), 20_000);
        assert_eq!(Model::exponential_backoff_millis(10_000, 3, cap), 40_000);
    }

    #[test]
    fn backoff_respects_cap() {
        let cap = 60_000;
        assert_eq!(Model::exponential_backoff_millis(10_000, 10, cap), cap);
    }
}
