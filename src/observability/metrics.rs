use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub position_reports_total: IntCounterVec,
    pub tracking_requests_total: IntCounterVec,
    pub position_log_failures_total: IntCounter,
    pub dropped_events_total: IntCounter,
    pub connected_sessions: IntGauge,
    pub live_couriers: IntGauge,
    pub report_latency_seconds: Histogram,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let position_reports_total = IntCounterVec::new(
            Opts::new("position_reports_total", "Position reports by outcome"),
            &["outcome"],
        )
        .expect("valid position_reports_total metric");

        let tracking_requests_total = IntCounterVec::new(
            Opts::new("tracking_requests_total", "Tracking requests by outcome code"),
            &["outcome"],
        )
        .expect("valid tracking_requests_total metric");

        let position_log_failures_total = IntCounter::new(
            "position_log_failures_total",
            "Position reports relayed without a durable history record",
        )
        .expect("valid position_log_failures_total metric");

        let dropped_events_total = IntCounter::new(
            "dropped_events_total",
            "Outbound events dropped because a session queue was full or closed",
        )
        .expect("valid dropped_events_total metric");

        let connected_sessions =
            IntGauge::new("connected_sessions", "Currently connected sessions")
                .expect("valid connected_sessions metric");

        let live_couriers = IntGauge::new(
            "live_couriers",
            "Couriers with an entry in the ephemeral position store",
        )
        .expect("valid live_couriers metric");

        let report_latency_seconds = Histogram::with_opts(HistogramOpts::new(
            "report_latency_seconds",
            "Latency of position report handling in seconds",
        ))
        .expect("valid report_latency_seconds metric");

        registry
            .register(Box::new(position_reports_total.clone()))
            .expect("register position_reports_total");
        registry
            .register(Box::new(tracking_requests_total.clone()))
            .expect("register tracking_requests_total");
        registry
            .register(Box::new(position_log_failures_total.clone()))
            .expect("register position_log_failures_total");
        registry
            .register(Box::new(dropped_events_total.clone()))
            .expect("register dropped_events_total");
        registry
            .register(Box::new(connected_sessions.clone()))
            .expect("register connected_sessions");
        registry
            .register(Box::new(live_couriers.clone()))
            .expect("register live_couriers");
        registry
            .register(Box::new(report_latency_seconds.clone()))
            .expect("register report_latency_seconds");

        Self {
            registry,
            position_reports_total,
            tracking_requests_total,
            position_log_failures_total,
            dropped_events_total,
            connected_sessions,
            live_couriers,
            report_latency_seconds,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
