//! HTTP control-plane entry point: config, tracer, database pool, router,
//! graceful shutdown. Grounded on the teacher's own `main.rs` shape, with
//! the RabbitMQ/S3 wiring dropped since this binary owns no broker or
//! object storage of its own — `services/worker` carries the queue
//! consumers this process only enqueues into.

mod modules;
mod server;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use sea_orm::DatabaseConnection;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    shared::tracer::init();

    let cfg = shared::config::app_config();
    let db = shared::db::connect(&cfg.db_url).await;

    listen_for_shutdown_signals(db.clone());

    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), cfg.port);
    info!(%addr, "api starting");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|err| panic!("failed to bind {addr}: {err}"));

    let app = server::controller::new(db).into_make_service_with_connect_info::<SocketAddr>();

    axum::serve(listener, app)
        .await
        .unwrap_or_else(|err| panic!("failed to serve on {addr}: {err}"));
}

/// Listens for `SIGINT`/`SIGTERM`, closes the database pool and flushes
/// the tracer, then exits with the received signal — same shape as
/// `services/worker`'s `listen_for_shutdown_signals`.
#[allow(clippy::never_loop)]
fn listen_for_shutdown_signals(db: DatabaseConnection) {
    let mut signals = Signals::new([SIGINT, SIGTERM]).expect("failed to setup signals hook");

    tokio::spawn(async move {
        for sig in signals.forever() {
            info!(signal = sig, "received signal, shutting down");

            if let Err(err) = db.close().await {
                error!(%err, "failed to close db connection");
            }

            shared::tracer::shutdown().await;
            std::process::exit(sig)
        }
    });
}
