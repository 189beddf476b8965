//! Prometheus metrics registry for the API server

use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

pub struct Metrics {
    registry: Registry,
    pub http_requests_total: IntCounter,
    pub http_request_duration_seconds: Histogram,
    pub http_requests_in_flight: IntGauge,
    /// Price queries by resolved mode (flat / companies / regions / snapshot).
    pub price_queries_total: IntCounterVec,
    pub admin_writes_total: IntCounter,
    pub admin_auth_failures_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total =
            IntCounter::new("http_requests_total", "Total HTTP requests handled")?;
        let http_request_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request latency in seconds",
        ))?;
        let http_requests_in_flight =
            IntGauge::new("http_requests_in_flight", "HTTP requests currently in flight")?;
        let price_queries_total = IntCounterVec::new(
            Opts::new("price_queries_total", "Price queries by response shape"),
            &["mode"],
        )?;
        let admin_writes_total =
            IntCounter::new("admin_writes_total", "Admin write operations accepted")?;
        let admin_auth_failures_total = IntCounter::new(
            "admin_auth_failures_total",
            "Rejected admin passcode attempts",
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(http_requests_in_flight.clone()))?;
        registry.register(Box::new(price_queries_total.clone()))?;
        registry.register(Box::new(admin_writes_total.clone()))?;
        registry.register(Box::new(admin_auth_failures_total.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            http_requests_in_flight,
            price_queries_total,
            admin_writes_total,
            admin_auth_failures_total,
        })
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let mut buffer = String::new();
        TextEncoder::new().encode_utf8(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}
