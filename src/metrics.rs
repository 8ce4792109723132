//! Run metrics
//!
//! Thin wrappers around the `metrics` facade. Without an installed recorder
//! every call is a no-op; `--metrics-addr` installs the Prometheus exporter.

use crate::ScreenshotError;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

pub const SCREENSHOTS_CAPTURED: &str = "screenshots_captured_total";
pub const SCREENSHOTS_FAILED: &str = "screenshots_failed_total";
pub const SCREENSHOT_DURATION: &str = "screenshot_duration_seconds";
pub const SITEMAPS_FETCHED: &str = "sitemaps_fetched_total";

/// Records one finished capture task; failures are labelled by error kind.
pub fn record_screenshot(duration: Duration, error: Option<&ScreenshotError>) {
    if let Some(e) = error {
        ::metrics::increment_counter!(SCREENSHOTS_FAILED, "kind" => e.kind());
    } else {
        ::metrics::increment_counter!(SCREENSHOTS_CAPTURED);
    }
    ::metrics::histogram!(SCREENSHOT_DURATION, duration.as_secs_f64());
}

pub fn record_sitemap_fetch() {
    ::metrics::increment_counter!(SITEMAPS_FETCHED);
}

/// Serves `/metrics` in Prometheus text format on `addr` for the rest of the run.
///
/// Must be called from within the tokio runtime.
pub fn install_prometheus_exporter(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    ::metrics::describe_counter!(SCREENSHOTS_CAPTURED, "Screenshots written to disk");
    ::metrics::describe_counter!(SCREENSHOTS_FAILED, "Capture tasks that failed");
    ::metrics::describe_histogram!(SCREENSHOT_DURATION, "End-to-end capture task duration");
    ::metrics::describe_counter!(SITEMAPS_FETCHED, "Sitemap documents fetched");

    info!("Serving Prometheus metrics on http://{}/metrics", addr);
    Ok(())
}
