use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

pub const REQUEST_CACHE_FETCH_TOTAL: &str = "mixboard_request_cache_fetch_total";
pub const REQUEST_CACHE_DEDUP_TOTAL: &str = "mixboard_request_cache_dedup_total";
pub const PAGE_REBUILD_TOTAL: &str = "mixboard_page_rebuild_total";
pub const PAGE_REBUILD_MS: &str = "mixboard_page_rebuild_ms";
pub const PROVIDER_REQUEST_TOTAL: &str = "mixboard_provider_request_total";

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            REQUEST_CACHE_FETCH_TOTAL,
            Unit::Count,
            "Request cache fetch completions, labelled by outcome."
        );
        describe_counter!(
            REQUEST_CACHE_DEDUP_TOTAL,
            Unit::Count,
            "Fetch triggers absorbed by an in-flight fetch for the same key."
        );
        describe_counter!(
            PAGE_REBUILD_TOTAL,
            Unit::Count,
            "Page rebuilds, labelled by page kind and outcome."
        );
        describe_histogram!(
            PAGE_REBUILD_MS,
            Unit::Milliseconds,
            "Page rebuild latency in milliseconds."
        );
        describe_counter!(
            PROVIDER_REQUEST_TOTAL,
            Unit::Count,
            "Calls to the music provider, labelled by operation and outcome."
        );
    });
}
