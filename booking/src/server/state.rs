//! Application state for the HTTP server.

use crate::service::BookingService;
use pgstay_runtime::metrics::MetricsExporter;

/// Shared by every handler; cloned per request.
#[derive(Clone)]
pub struct AppState {
    /// The booking workflow
    pub service: BookingService,
    /// Prometheus exporter, when metrics are enabled
    pub metrics: Option<MetricsExporter>,
}

impl AppState {
    /// State without a metrics endpoint.
    #[must_use]
    pub const fn new(service: BookingService) -> Self {
        Self {
            service,
            metrics: None,
        }
    }

    /// Serve `/metrics` from `exporter`.
    #[must_use]
    pub fn with_metrics(mut self, exporter: MetricsExporter) -> Self {
        self.metrics = Some(exporter);
        self
    }
}
