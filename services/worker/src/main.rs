//! Long-lived worker host: consumes the `campaign`, `email`, `analytics`
//! and `webhook` queues, plus a scheduler loop driving the due/stalled
//! campaign sweeps, list-stats refresh, cleanup, and the automation tick.
//!
//! Grounded on the teacher's `services/mailer` main — one process, one
//! `tokio::main`, a handful of spawned background loops and a
//! `signal_hook` SIGINT/SIGTERM listener that drains connections before
//! exit — generalized from "one RabbitMQ consumer" to "one poll loop per
//! Postgres-backed queue".

use std::sync::Arc;
use std::time::Duration;

use core_lib::dispatcher::DispatchJob;
use core_lib::feedback::{ProcessEventJob, WebhookJob};
use core_lib::provider::ses::SesProvider;
use core_lib::provider::smtp::SmtpProvider;
use core_lib::provider::EmailProvider;
use core_lib::queue::JobQueue;
use core_lib::rate_limit::RateLimitChain;
use core_lib::suppression_cache::SuppressionCache;
use entity::job;
use sea_orm::DatabaseConnection;
use shared::config::{app_config, EmailProviderKind};
use shared::constants::{QUEUE_ANALYTICS, QUEUE_CAMPAIGN, QUEUE_EMAIL, QUEUE_WEBHOOK};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// How long an empty queue poll sleeps before trying again.
const POLL_IDLE_DELAY: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() {
    shared::tracer::init();

    let cfg = app_config();
    let db = shared::db::connect(&cfg.db_url).await;

    let provider: Arc<dyn EmailProvider> = build_provider(cfg).await;
    let rate_limits = RateLimitChain::provider_and_tenant(
        cfg.email_rate_limit,
        cfg.email_rate_limit,
        cfg.email_rate_limit,
        cfg.email_rate_limit,
    );
    let suppression = Arc::new(SuppressionCache::new(cfg.suppression_cache_ttl_secs));

    info!(provider = provider.name(), "worker starting");

    let mut handles = Vec::new();

    handles.push(tokio::spawn(run_campaign_consumer(db.clone(), cfg.app_url.clone())));

    handles.push(tokio::spawn(run_email_consumer(
        db.clone(),
        provider.clone(),
        rate_limits.clone(),
        suppression.clone(),
        cfg.email_worker_concurrency as usize,
    )));

    handles.push(tokio::spawn(run_analytics_consumer(
        db.clone(),
        suppression.clone(),
        cfg.analytics_worker_concurrency as usize,
    )));

    handles.push(tokio::spawn(run_webhook_consumer(db.clone(), suppression.clone())));

    handles.push(tokio::spawn(run_stalled_reaper(db.clone())));

    handles.push(tokio::spawn(run_scheduler_loop(db.clone(), cfg.app_url.clone())));

    listen_for_shutdown_signals(db.clone());

    for handle in handles {
        let _ = handle.await;
    }
}

async fn build_provider(cfg: &shared::config::AppConfig) -> Arc<dyn EmailProvider> {
    match cfg.email_provider {
        EmailProviderKind::Ses => {
            let provider = SesProvider::new(
                cfg.aws_region.clone(),
                format!("no-reply@{}", cfg.app_url),
                cfg.ses_configuration_set.clone(),
            )
            .await
            .expect("failed to initialize SES provider");
            Arc::new(provider)
        }
        EmailProviderKind::Smtp => {
            let host = cfg.smtp_host.clone().expect("SMTP_HOST required when EMAIL_PROVIDER=smtp");
            let port = cfg.smtp_port.unwrap_or(587);
            let provider = SmtpProvider::new(
                &host,
                port,
                cfg.smtp_user.clone(),
                cfg.smtp_pass.clone(),
                cfg.smtp_user.clone().unwrap_or_else(|| format!("no-reply@{}", cfg.app_url)),
                cfg.smtp_secure,
            )
            .expect("failed to initialize SMTP provider");
            Arc::new(provider)
        }
    }
}

/// Single-flight campaign dispatcher consumer: the dispatcher streams and
/// batches recipients itself, so running more than one job at a time per
/// process buys nothing and risks two workers racing the same campaign.
async fn run_campaign_consumer(db: DatabaseConnection, base_url: String) {
    let queue = JobQueue::new(&db, QUEUE_CAMPAIGN);
    let worker_id = worker_id("campaign");

    loop {
        match queue.reserve(&worker_id).await {
            Ok(Some(job)) => {
                let outcome = run_one_campaign_job(&db, &base_url, &job).await;
                finish_job(&queue, job, outcome).await;
            }
            Ok(None) => tokio::time::sleep(POLL_IDLE_DELAY).await,
            Err(err) => {
                error!(%err, "campaign queue reserve failed");
                tokio::time::sleep(POLL_IDLE_DELAY).await;
            }
        }
    }
}

async fn run_one_campaign_job(db: &DatabaseConnection, base_url: &str, job: &job::Model) -> anyhow::Result<()> {
    let payload: DispatchJob = serde_json::from_value(job.payload.clone())?;
    core_lib::dispatcher::dispatch_campaign(db, base_url, payload.campaign_id).await?;
    Ok(())
}

/// Runs up to `concurrency` email-send jobs at once, bounded by a
/// semaphore so a burst of reservations can't outrun the rate limiter.
async fn run_email_consumer(
    db: DatabaseConnection,
    provider: Arc<dyn EmailProvider>,
    rate_limits: RateLimitChain,
    suppression: Arc<SuppressionCache>,
    concurrency: usize,
) {
    let queue = JobQueue::new(&db, QUEUE_EMAIL);
    let worker_id = worker_id("email");
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

    loop {
        match queue.reserve(&worker_id).await {
            Ok(Some(job)) => {
                let permit = semaphore.clone().acquire_owned().await.expect("semaphore closed");
                let db = db.clone();
                let provider = provider.clone();
                let rate_limits = rate_limits.clone();
                let suppression = suppression.clone();
                let queue_handle_db = db.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    let queue = JobQueue::new(&queue_handle_db, QUEUE_EMAIL);
                    let outcome = run_one_email_job(&db, provider.as_ref(), &rate_limits, &suppression, &job).await;
                    finish_job(&queue, job, outcome).await;
                });
            }
            Ok(None) => tokio::time::sleep(POLL_IDLE_DELAY).await,
            Err(err) => {
                error!(%err, "email queue reserve failed");
                tokio::time::sleep(POLL_IDLE_DELAY).await;
            }
        }
    }
}

async fn run_one_email_job(
    db: &DatabaseConnection,
    provider: &dyn EmailProvider,
    rate_limits: &RateLimitChain,
    suppression: &SuppressionCache,
    job: &job::Model,
) -> anyhow::Result<()> {
    let payload: core_lib::dispatcher::SendJob = serde_json::from_value(job.payload.clone())?;

    match core_lib::send_worker::process_send_job(db, provider, rate_limits, suppression, &payload, job.id).await? {
        core_lib::send_worker::SendJobOutcome::Sent
        | core_lib::send_worker::SendJobOutcome::Dropped
        | core_lib::send_worker::SendJobOutcome::FailedPermanently => Ok(()),
        core_lib::send_worker::SendJobOutcome::RetryNeeded(message) => anyhow::bail!(message),
    }
}

async fn run_analytics_consumer(db: DatabaseConnection, suppression: Arc<SuppressionCache>, concurrency: usize) {
    let queue = JobQueue::new(&db, QUEUE_ANALYTICS);
    let worker_id = worker_id("analytics");
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

    loop {
        match queue.reserve(&worker_id).await {
            Ok(Some(job)) => {
                let permit = semaphore.clone().acquire_owned().await.expect("semaphore closed");
                let db = db.clone();
                let suppression = suppression.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    let queue = JobQueue::new(&db, QUEUE_ANALYTICS);
                    let outcome = run_one_analytics_job(&db, &suppression, &job).await;
                    finish_job(&queue, job, outcome).await;
                });
            }
            Ok(None) => tokio::time::sleep(POLL_IDLE_DELAY).await,
            Err(err) => {
                error!(%err, "analytics queue reserve failed");
                tokio::time::sleep(POLL_IDLE_DELAY).await;
            }
        }
    }
}

async fn run_one_analytics_job(
    db: &DatabaseConnection,
    suppression: &SuppressionCache,
    job: &job::Model,
) -> anyhow::Result<()> {
    let payload: ProcessEventJob = serde_json::from_value(job.payload.clone())?;
    core_lib::analytics::process_event(db, suppression, payload.feedback_log_id).await
}

async fn run_webhook_consumer(db: DatabaseConnection, suppression: Arc<SuppressionCache>) {
    let queue = JobQueue::new(&db, QUEUE_WEBHOOK);
    let worker_id = worker_id("webhook");

    loop {
        match queue.reserve(&worker_id).await {
            Ok(Some(job)) => {
                let outcome = run_one_webhook_job(&db, &suppression, &job).await;
                finish_job(&queue, job, outcome).await;
            }
            Ok(None) => tokio::time::sleep(POLL_IDLE_DELAY).await,
            Err(err) => {
                error!(%err, "webhook queue reserve failed");
                tokio::time::sleep(POLL_IDLE_DELAY).await;
            }
        }
    }
}

async fn run_one_webhook_job(
    db: &DatabaseConnection,
    suppression: &SuppressionCache,
    job: &job::Model,
) -> anyhow::Result<()> {
    let payload: WebhookJob = serde_json::from_value(job.payload.clone())?;
    core_lib::feedback::process_webhook_job(db, suppression, &payload).await
}

/// Acks or fails a job against its own originating queue, logging either
/// way so a string of retries is visible without a debugger attached.
async fn finish_job(queue: &JobQueue<'_>, job: job::Model, outcome: anyhow::Result<()>) {
    match outcome {
        Ok(()) => {
            if let Err(err) = queue.ack(job).await {
                error!(%err, "failed to ack job");
            }
        }
        Err(err) => {
            warn!(%err, "job failed");
            if let Err(ack_err) = queue.fail(job, &err.to_string()).await {
                error!(%ack_err, "failed to mark job failed");
            }
        }
    }
}

/// Reaps stalled jobs on every queue once a minute; a job whose lease
/// expired without an ack/fail goes back to `pending` (or permanently
/// fails past `MAX_STALLED_COUNT`).
async fn run_stalled_reaper(db: DatabaseConnection) {
    let mut ticker = tokio::time::interval(Duration::from_secs(60));
    loop {
        ticker.tick().await;
        for queue_name in shared::constants::ALL_QUEUES {
            let queue = JobQueue::new(&db, queue_name);
            match queue.reap_stalled().await {
                Ok(count) if count > 0 => info!(queue = queue_name, count, "reaped stalled jobs"),
                Ok(_) => {}
                Err(err) => error!(%err, queue = queue_name, "stalled reap failed"),
            }
        }
    }
}

/// Drives the due/stalled campaign sweeps, the automation tick, the
/// list-stats refresh, and the TTL cleanup sweep, each on its own cadence.
async fn run_scheduler_loop(db: DatabaseConnection, base_url: String) {
    let mut due_ticker = tokio::time::interval(Duration::from_secs(10));
    let mut stalled_ticker = tokio::time::interval(Duration::from_secs(5 * 60));
    let mut automation_ticker = tokio::time::interval(Duration::from_secs(30));
    let mut list_stats_ticker = tokio::time::interval(Duration::from_secs(15 * 60));
    let mut cleanup_ticker = tokio::time::interval(Duration::from_secs(60 * 60));

    loop {
        tokio::select! {
            _ = due_ticker.tick() => {
                if let Err(err) = core_lib::scheduler::run_due_campaign_sweep(&db).await {
                    error!(%err, "due-campaign sweep failed");
                }
            }
            _ = stalled_ticker.tick() => {
                if let Err(err) = core_lib::scheduler::run_stalled_campaign_sweep(&db).await {
                    error!(%err, "stalled-campaign sweep failed");
                }
            }
            _ = automation_ticker.tick() => {
                if let Err(err) = core_lib::automation::run_tick(&db, &base_url).await {
                    error!(%err, "automation tick failed");
                }
            }
            _ = list_stats_ticker.tick() => {
                if let Err(err) = core_lib::scheduler::run_list_stats_sweep(&db).await {
                    error!(%err, "list-stats sweep failed");
                }
            }
            _ = cleanup_ticker.tick() => {
                if let Err(err) = core_lib::scheduler::run_cleanup_sweep(&db).await {
                    error!(%err, "cleanup sweep failed");
                }
            }
        }
    }
}

fn worker_id(queue: &str) -> String {
    format!("{}-{}-{}", queue, std::process::id(), uuid::Uuid::new_v4())
}

/// Listens for `SIGINT`/`SIGTERM`, closes the database pool and flushes
/// the tracer, then exits with the received signal — same shape as the
/// teacher's `listen_to_shutdown_signals` in `services/mailer/src/main.rs`.
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
