//! Tracing/telemetry init, shared by both the API server and worker host.
//!
//! Follows the teacher's `services/mailer/src/tracer.rs` almost verbatim:
//! Jaeger export gated by `OTEL_EXPORTER_OTLP_ENDPOINT`, `EnvFilter` for
//! local log level control. The AMQP header carrier the teacher uses to
//! thread trace context through RabbitMQ deliveries has no counterpart here
//! since the queue backend is Postgres rows, not broker messages.

use crate::config::app_config;
use opentelemetry::sdk::trace::BatchConfig;
use tokio::time;
use tracing_subscriber::{prelude::*, EnvFilter, Registry};

/// Initializes the global tracing subscriber.
///
/// When `OTEL_EXPORTER_OTLP_ENDPOINT` is unset, spans are still emitted
/// through `tracing-subscriber`'s fmt layer with `EnvFilter`, just without
/// the Jaeger exporter — local development never needs a collector running.
pub fn init() {
    let service_name = &app_config().tracer_service_name;

    let env_filter = EnvFilter::from_default_env();
    let fmt_layer = tracing_subscriber::fmt::layer();

    match &app_config().otel_exporter_otlp_endpoint {
        Some(_endpoint) => {
            opentelemetry::global::set_text_map_propagator(
                opentelemetry_jaeger::Propagator::new(),
            );

            let tracer = opentelemetry_jaeger::new_agent_pipeline()
                .with_service_name(service_name)
                .with_auto_split_batch(true)
                .with_batch_processor_config(
                    BatchConfig::default().with_max_export_batch_size(256),
                )
                .install_batch(opentelemetry::runtime::Tokio)
                .expect("failed to initialize jaeger tracer");

            let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

            let subscriber = Registry::default()
                .with(env_filter)
                .with(fmt_layer)
                .with(otel_layer);

            tracing::subscriber::set_global_default(subscriber)
                .expect("failed to set tracing subscriber");
        }
        None => {
            let subscriber = Registry::default().with(env_filter).with(fmt_layer);

            tracing::subscriber::set_global_default(subscriber)
                .expect("failed to set tracing subscriber");
        }
    }

    tracing::info!(service = %service_name, "tracing initialized");
}

/// Async wrapper around `opentelemetry::global::shutdown_tracer_provider()`
/// because it might hang forever; see the upstream issue the teacher's
/// comment links to (open-telemetry/opentelemetry-rust#868).
async fn shutdown_trace_provider() {
    tracing::info!("shutting down tracer");
    opentelemetry::global::shutdown_tracer_provider();
}

/// Shuts down tracing, flushing all non-exported spans, with a hard
/// deadline so a stuck exporter can't block process shutdown.
pub async fn shutdown() {
    tokio::select! {
        _ = time::sleep(time::Duration::from_millis(500)) => {
            tracing::warn!("tracer graceful shutdown timed out");
        },
        _ = tokio::task::spawn_blocking(shutdown_trace_provider) => {
            tracing::info!("tracer shutdown complete");
        }
    }
}
