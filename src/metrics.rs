//! Metrics collection and export module

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Pipeline counters
    pub transactions_received: IntCounter,
    pub transactions_dispatched: IntCounter,
    pub backrun_failures: IntCounter,
    pub backrun_panics: IntCounter,
    pub backruns_submitted: IntCounter,

    // Relay counters
    pub relay_requests: IntCounter,
    pub relay_rejections: IntCounter,

    // Gauges
    pub dispatch_in_flight: IntGauge,

    // Histograms
    pub nonce_lease_lifetime: Histogram,
    pub submit_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let transactions_received = IntCounter::with_opts(Opts::new(
            "transactions_received_total",
            "Transactions received from the feed and the relay queue",
        ))?;

        let transactions_dispatched = IntCounter::with_opts(Opts::new(
            "transactions_dispatched_total",
            "Transactions handed to the backrunner",
        ))?;

        let backrun_failures = IntCounter::with_opts(Opts::new(
            "backrun_failures_total",
            "Backrunner invocations that returned an error",
        ))?;

        let backrun_panics = IntCounter::with_opts(Opts::new(
            "backrun_panics_total",
            "Backrunner invocations that panicked",
        ))?;

        let backruns_submitted = IntCounter::with_opts(Opts::new(
            "backruns_submitted_total",
            "Backrun transactions broadcast",
        ))?;

        let relay_requests = IntCounter::with_opts(Opts::new(
            "relay_requests_total",
            "Requests received on POST /transaction",
        ))?;

        let relay_rejections = IntCounter::with_opts(Opts::new(
            "relay_rejections_total",
            "Relay requests answered with an error envelope",
        ))?;

        let dispatch_in_flight = IntGauge::with_opts(Opts::new(
            "dispatch_in_flight",
            "Backrunner invocations currently executing",
        ))?;

        let nonce_lease_lifetime = Histogram::with_opts(
            HistogramOpts::new("nonce_lease_seconds", "Duration nonce leases are held")
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        )?;

        let submit_latency = Histogram::with_opts(
            HistogramOpts::new("submit_latency_seconds", "Build, sign and broadcast latency")
                .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0]),
        )?;

        registry.register(Box::new(transactions_received.clone()))?;
        registry.register(Box::new(transactions_dispatched.clone()))?;
        registry.register(Box::new(backrun_failures.clone()))?;
        registry.register(Box::new(backrun_panics.clone()))?;
        registry.register(Box::new(backruns_submitted.clone()))?;
        registry.register(Box::new(relay_requests.clone()))?;
        registry.register(Box::new(relay_rejections.clone()))?;
        registry.register(Box::new(dispatch_in_flight.clone()))?;
        registry.register(Box::new(nonce_lease_lifetime.clone()))?;
        registry.register(Box::new(submit_latency.clone()))?;

        Ok(Self {
            registry,
            transactions_received,
            transactions_dispatched,
            backrun_failures,
            backrun_panics,
            backruns_submitted,
            relay_requests,
            relay_rejections,
            dispatch_in_flight,
            nonce_lease_lifetime,
            submit_latency,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}
