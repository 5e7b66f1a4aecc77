//! Prometheus exporter for store and domain metrics.
//!
//! The exporter installs a global recorder and hands back a handle that renders
//! the scrape payload; the HTTP layer serves it on `/metrics`.
//!
//! ```rust,no_run
//! use pgstay_runtime::metrics::MetricsExporter;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let exporter = MetricsExporter::install()?;
//! let payload = exporter.render();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

pub use metrics::{counter, gauge, histogram};

/// Latency buckets shared by every `*_duration_seconds` histogram.
const DURATION_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Errors from installing the exporter.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// The exporter configuration was rejected
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// A global recorder is already installed
    #[error("Failed to install metrics recorder: {0}")]
    Install(String),
}

/// Installed Prometheus recorder.
#[derive(Clone)]
pub struct MetricsExporter {
    handle: PrometheusHandle,
}

impl MetricsExporter {
    /// Install the global recorder and describe the store metrics.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Install`] if another recorder is already
    /// installed in this process.
    pub fn install() -> Result<Self, MetricsError> {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                DURATION_BUCKETS,
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .install_recorder()
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        describe_store_metrics();
        tracing::info!("Prometheus recorder installed");

        Ok(Self { handle })
    }

    /// Wrap an existing handle (for callers that build their own recorder).
    #[must_use]
    pub const fn from_handle(handle: PrometheusHandle) -> Self {
        Self { handle }
    }

    /// Render the current metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

impl std::fmt::Debug for MetricsExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsExporter").finish_non_exhaustive()
    }
}

fn describe_store_metrics() {
    describe_counter!("store.commands.total", "Actions reduced by the store");
    describe_histogram!(
        "store.reducer.duration_seconds",
        "Time spent inside the reducer per action"
    );
    describe_counter!("store.effects.executed", "Effects executed, labelled by type");
    describe_counter!(
        "store.broadcast.lagged",
        "Broadcast actions skipped by lagging observers"
    );
    describe_counter!("store.shutdown.initiated", "Graceful shutdowns started");
    describe_counter!("store.shutdown.completed", "Graceful shutdowns that drained in time");
    describe_counter!("store.shutdown.timeout", "Graceful shutdowns that timed out");
    describe_counter!(
        "store.shutdown.rejected_actions",
        "Actions rejected because the store was shutting down"
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn rendered_payload_contains_recorded_counter() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let exporter = MetricsExporter::from_handle(recorder.handle());

        metrics::with_local_recorder(&recorder, || {
            counter!("store.commands.total").increment(3);
        });

        let rendered = exporter.render();
        assert!(rendered.contains("store_commands_total 3"));
    }
}
