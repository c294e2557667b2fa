//! In-process TTL cache in front of the `suppression` table.
//!
//! Suppression reads are the hottest path in the send worker — every single
//! job checks it before calling out to a provider — so a bare `HashMap`
//! behind a `RwLock`, refreshed on a short TTL, avoids a database round trip
//! per send. Shaped after the `RwLock<Option<...>>` fields the teacher keeps
//! on long-lived connection handles, just keyed instead of singular.
//! Invalidated synchronously whenever `core::feedback::ingest` writes a new
//! permanent-bounce/complaint suppression row, so a worker never sends to an
//! address it just suppressed within the same process.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use entity::suppression;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

pub struct SuppressionCache {
    ttl: Duration,
    entries: RwLock<HashMap<(i32, String), (bool, Instant)>>,
}

impl SuppressionCache {
    pub fn new(ttl_secs: u64) -> Self {
        SuppressionCache {
            ttl: Duration::from_secs(ttl_secs),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns whether `email` is suppressed for `org_id`, consulting the
    /// cache first and falling back to the database on a miss or expiry.
    pub async fn is_suppressed(
        &self,
        db: &DatabaseConnection,
        org_id: i32,
        email: &str,
    ) -> anyhow::Result<bool> {
        let key = (org_id, email.to_lowercase());

        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }

        let suppressed = suppression::Entity::find()
            .filter(suppression::Column::OrgId.eq(org_id))
            .filter(suppression::Column::Email.eq(key.1.clone()))
            .one(db)
            .await?
            .is_some();

        self.entries
            .write()
            .unwrap()
            .insert(key, (suppressed, Instant::now()));

        Ok(suppressed)
    }

    fn cached(&self, key: &(i32, String)) -> Option<bool> {
        let entries = self.entries.read().unwrap();
        let (value, written_at) = entries.get(key)?;
        if written_at.elapsed() > self.ttl {
            return None;
        }
        Some(*value)
    }

    /// Drops any cached entry for `(org_id, email)`, forcing the next
    /// lookup to hit the database. Called right after a new suppression row
    /// is written so the cache can't serve a stale "not suppressed" answer.
    pub fn invalidate(&self, org_id: i32, email: &str) {
        self.entries
            .write()
            .unwrap()
            .remove(&(org_id, email.to_lowercase()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_entry_is_treated_as_a_miss() {
        let cache = SuppressionCache::new(0);
        cache
            .entries
            .write()
            .unwrap()
            .insert((1, "a@example.com".into()), (true, Instant::now()));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.cached(&(1, "a@example.com".into())), None);
    }

    #[test]
    fn fresh_entry_is_a_hit() {
        let cache = SuppressionCache::new(60);
        cache
            .entries
            .write()
            .unwrap()
            .insert((1, "a@example.com".into()), (false, Instant::now()));
        assert_eq!(cache.cached(&(1, "a@example.com".into())), Some(false));
    }

    #[test]
    fn invalidate_removes_the_entry() {
        let cache = SuppressionCache::new(60);
        cache
            .entries
            .write()
            .unwrap()
            .insert((1, "a@example.com".into()), (false, Instant::now()));
        cache.invalidate(1, "A@Example.com");
        assert_eq!(cache.cached(&(1, "a@example.com".into())), None);
    }
}
