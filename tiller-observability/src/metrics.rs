use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use tracing::warn;

/// Metrics collector for the admin API and the reconciler.
///
/// When `enabled = false` nothing is registered and every `record_*` call
/// returns immediately.
pub struct MetricsCollector {
    enabled: bool,
    registry: Option<Registry>,
    pub api_requests_total: Option<IntCounterVec>,
    pub api_request_duration: Option<HistogramVec>,
    pub sync_total: Option<IntCounterVec>,
    pub services: Option<IntGauge>,
}

impl MetricsCollector {
    pub fn new(enabled: bool) -> anyhow::Result<Self> {
        if !enabled {
            return Ok(Self {
                enabled: false,
                registry: None,
                api_requests_total: None,
                api_request_duration: None,
                sync_total: None,
                services: None,
            });
        }

        let registry = Registry::new();

        let api_requests_total = IntCounterVec::new(
            Opts::new("api_requests_total", "Registry API requests").namespace("tiller"),
            &["handler", "method", "status"],
        )?;

        let api_request_duration = HistogramVec::new(
            HistogramOpts::new("api_request_duration_seconds", "Registry API latency")
                .namespace("tiller")
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["handler"],
        )?;

        let sync_total = IntCounterVec::new(
            Opts::new("sync_total", "Reconciliation passes").namespace("tiller"),
            &["direction", "outcome"],
        )?;

        let services = IntGauge::with_opts(
            Opts::new("services", "Services in the stored registry").namespace("tiller"),
        )?;

        registry.register(Box::new(api_requests_total.clone()))?;
        registry.register(Box::new(api_request_duration.clone()))?;
        registry.register(Box::new(sync_total.clone()))?;
        registry.register(Box::new(services.clone()))?;

        Ok(Self {
            enabled: true,
            registry: Some(registry),
            api_requests_total: Some(api_requests_total),
            api_request_duration: Some(api_request_duration),
            sync_total: Some(sync_total),
            services: Some(services),
        })
    }

    #[inline]
    pub fn record_request(&self, handler: &str, method: &str, status: u16, duration_secs: f64) {
        if !self.enabled {
            return;
        }
        if let Some(ref counter) = self.api_requests_total {
            let status = status.to_string();
            counter.with_label_values(&[handler, method, &status]).inc();
        }
        if let Some(ref hist) = self.api_request_duration {
            hist.with_label_values(&[handler]).observe(duration_secs);
        }
    }

    /// Count one pull or push; `ok` selects the `success`/`failure` outcome.
    pub fn record_sync(&self, direction: &str, ok: bool) {
        if let Some(ref counter) = self.sync_total {
            let outcome = if ok { "success" } else { "failure" };
            counter.with_label_values(&[direction, outcome]).inc();
        }
    }

    pub fn set_services(&self, count: usize) {
        if let Some(ref gauge) = self.services {
            gauge.set(i64::try_from(count).unwrap_or(i64::MAX));
        }
    }

    /// Prometheus text exposition format.
    pub fn render(&self) -> String {
        let Some(ref registry) = self.registry else {
            return String::new();
        };
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&registry.gather(), &mut buffer) {
            warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
