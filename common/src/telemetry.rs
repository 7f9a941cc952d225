// Telemetry: JSON logs, optional OTLP traces and Prometheus metrics for the scheduler

use anyhow::Result;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    trace::{RandomIdGenerator, Sampler, TracerProvider},
    Resource,
};
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// JSON log subscriber; `RUST_LOG` wins over the configured level.
/// Passing an OTLP endpoint also exports spans.
#[tracing::instrument(skip_all)]
pub fn init_logging(log_level: &str, tracing_endpoint: Option<&str>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(env_filter);

    let registry = tracing_subscriber::registry().with(json_layer);

    if let Some(endpoint) = tracing_endpoint {
        let tracer = init_tracer(endpoint)?;
        let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        registry
            .with(telemetry_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    } else {
        registry
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    }

    tracing::info!(
        log_level = log_level,
        tracing_endpoint = tracing_endpoint,
        "Scheduler logging initialized"
    );

    Ok(())
}

/// OTLP batch exporter tagged with the service name and version
#[tracing::instrument(skip_all)]
fn init_tracer(endpoint: &str) -> Result<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry_sdk::runtime::Tokio;

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint)
        .build_span_exporter()
        .map_err(|e| anyhow::anyhow!("Failed to build span exporter: {}", e))?;

    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(exporter, Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", "content-scheduler"),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])),
        )
        .build();

    global::set_tracer_provider(tracer_provider.clone());

    let tracer = tracer_provider.tracer("content-scheduler");

    tracing::info!(
        endpoint = endpoint,
        "OTLP span export enabled"
    );

    Ok(tracer)
}

/// Flush pending spans on shutdown
pub fn shutdown_tracer() {
    global::shutdown_tracer_provider();
}

/// Prometheus exporter on `0.0.0.0:<metrics_port>`
///
/// - scheduler_transitions_total: items per process and outcome
/// - scheduler_pass_duration_seconds: duration of one publish/unpublish pass
/// - scheduler_cron_runs_total: lightweight cron runs per trigger
#[tracing::instrument(skip_all)]
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!(
        "scheduler_transitions_total",
        "Scheduled transitions by process and outcome"
    );
    describe_histogram!(
        "scheduler_pass_duration_seconds",
        "Duration of a publish or unpublish pass in seconds"
    );
    describe_counter!(
        "scheduler_cron_runs_total",
        "Lightweight cron runs by trigger"
    );

    tracing::info!(
        metrics_port = metrics_port,
        metrics_endpoint = format!("http://0.0.0.0:{}/metrics", metrics_port),
        "Prometheus metrics exporter initialized"
    );

    Ok(())
}

/// Count one item outcome
#[inline]
pub fn record_transition(entity_type: &str, process: &str, outcome: &str) {
    counter!(
        "scheduler_transitions_total",
        "entity_type" => entity_type.to_string(),
        "process" => process.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record the duration of one pass
#[inline]
pub fn record_pass(process: &str, duration_seconds: f64) {
    histogram!("scheduler_pass_duration_seconds", "process" => process.to_string())
        .record(duration_seconds);
}

/// Count one lightweight cron run
#[inline]
pub fn record_cron_run(trigger: &str, outcome: &str) {
    counter!(
        "scheduler_cron_runs_total",
        "trigger" => trigger.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        // No recorder installed: must not panic
        record_transition("node", "publish", "committed");
        record_pass("unpublish", 0.25);
        record_cron_run("url", "ok");
    }
}
