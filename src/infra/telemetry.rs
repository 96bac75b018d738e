//! Tracing subscriber installation and metric descriptions.

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install the process-global tracing subscriber and register metric
/// descriptions. The configured level is the default directive; `RUST_LOG`
/// refines it per target.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();
    let base = tracing_subscriber::registry()
        .with(filter)
        .with(ErrorLayer::default());

    let installed = match logging.format {
        LogFormat::Json => base
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Compact => base.with(fmt::layer().compact().with_target(true)).try_init(),
    };

    installed.map_err(|err| InfraError::telemetry(format!("subscriber already installed: {err}")))
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "fucina_jobs_submitted_total",
            Unit::Count,
            "Total number of render jobs accepted for dispatch."
        );
        describe_counter!(
            "fucina_jobs_completed_total",
            Unit::Count,
            "Total number of render jobs that reached the completed state."
        );
        describe_counter!(
            "fucina_jobs_failed_total",
            Unit::Count,
            "Total number of render jobs that reached the failed state."
        );
        describe_counter!(
            "fucina_callbacks_failed_total",
            Unit::Count,
            "Total number of progress callbacks that could not be delivered."
        );
        describe_gauge!(
            "fucina_jobs_in_flight",
            Unit::Count,
            "Current number of render jobs holding an execution slot."
        );
        describe_histogram!(
            "fucina_render_seconds",
            Unit::Seconds,
            "Wall-clock duration of the render pipeline per job."
        );
        describe_histogram!(
            "fucina_artifact_bytes",
            Unit::Bytes,
            "Size of persisted render artifacts."
        );
    });
}
