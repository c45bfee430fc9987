use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use service_core::middleware::metrics::HttpMetrics;

/// Console-wide prometheus registry and the collectors registered in it.
#[derive(Clone)]
pub struct ConsoleMetrics {
    registry: Registry,
    pub http: HttpMetrics,
    pub guard_outcomes: IntCounterVec,
    pub role_lookups: IntCounterVec,
}

impl ConsoleMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let http = HttpMetrics::register(&registry)?;

        let guard_outcomes = IntCounterVec::new(
            Opts::new(
                "route_guard_outcomes_total",
                "Route guard decisions by outcome",
            ),
            &["outcome"],
        )?;
        let role_lookups = IntCounterVec::new(
            Opts::new("role_lookups_total", "Role store lookups by result"),
            &["result"],
        )?;

        registry.register(Box::new(guard_outcomes.clone()))?;
        registry.register(Box::new(role_lookups.clone()))?;

        Ok(Self {
            registry,
            http,
            guard_outcomes,
            role_lookups,
        })
    }

    /// Text exposition format for `GET /metrics`.
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
