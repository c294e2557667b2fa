//! Postgres connection setup, shared by `services/api` and `services/worker`
//! so both binaries open the pool with the same tuning.

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;

/// Opens the connection pool for `db_url`. Panics on failure, matching the
/// teacher's `database::db::connect` behavior — there's no sensible way to
/// run either binary without a database.
pub async fn connect(db_url: &str) -> DatabaseConnection {
    let mut opts = ConnectOptions::new(db_url.to_owned());
    opts.max_connections(20)
        .min_connections(2)
        .connect_timeout(Duration::from_secs(10))
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(300));

    Database::connect(opts)
        .await
        .unwrap_or_else(|err| panic!("[DB] failed to connect to postgres: {err}"))
}
