use picker_models::FactorKind;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Prometheus counters for the analysis pipeline, on a private registry.
#[derive(Clone)]
pub struct AnalysisMetrics {
    registry: Registry,
    analyses: IntCounterVec,
    reasoning_calls: IntCounterVec,
    coalesced: IntCounter,
    dropped_factors: IntCounterVec,
    latency: Histogram,
}

impl AnalysisMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("picker".to_string()), None)?;

        let analyses = IntCounterVec::new(
            Opts::new("analyses_total", "Completed analyses by outcome"),
            &["outcome"],
        )?;
        let reasoning_calls = IntCounterVec::new(
            Opts::new("reasoning_calls_total", "Reasoning service invocations by result"),
            &["result"],
        )?;
        let coalesced = IntCounter::new(
            "coalesced_requests_total",
            "Requests served by an analysis already in flight",
        )?;
        let dropped_factors = IntCounterVec::new(
            Opts::new("dropped_factors_total", "Optional factors dropped after a provider failure"),
            &["factor"],
        )?;
        let latency = Histogram::with_opts(
            HistogramOpts::new("analysis_duration_seconds", "End-to-end analysis latency")
                .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 40.0, 80.0]),
        )?;

        registry.register(Box::new(analyses.clone()))?;
        registry.register(Box::new(reasoning_calls.clone()))?;
        registry.register(Box::new(coalesced.clone()))?;
        registry.register(Box::new(dropped_factors.clone()))?;
        registry.register(Box::new(latency.clone()))?;

        Ok(Self {
            registry,
            analyses,
            reasoning_calls,
            coalesced,
            dropped_factors,
            latency,
        })
    }

    pub fn record_analysis(&self, outcome: &str, elapsed: Duration) {
        self.analyses.with_label_values(&[outcome]).inc();
        self.latency.observe(elapsed.as_secs_f64());
    }

    pub fn record_reasoning_call(&self, ok: bool) {
        let result = if ok { "ok" } else { "error" };
        self.reasoning_calls.with_label_values(&[result]).inc();
    }

    pub fn record_coalesced(&self) {
        self.coalesced.inc();
    }

    pub fn record_dropped_factor(&self, kind: FactorKind) {
        self.dropped_factors.with_label_values(&[kind.as_str()]).inc();
    }

    pub fn reasoning_calls(&self) -> u64 {
        ["ok", "error"]
            .into_iter()
            .map(|result| self.reasoning_calls.with_label_values(&[result]).get())
            .sum()
    }

    pub fn coalesced(&self) -> u64 {
        self.coalesced.get()
    }

    /// Prometheus text exposition of every metric.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|err| prometheus::Error::Msg(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_recorded_metrics() {
        let metrics = AnalysisMetrics::new().unwrap();
        metrics.record_analysis("success", Duration::from_millis(1200));
        metrics.record_reasoning_call(true);
        metrics.record_reasoning_call(false);
        metrics.record_coalesced();
        metrics.record_dropped_factor(FactorKind::Coaching);

        assert_eq!(metrics.reasoning_calls(), 2);
        assert_eq!(metrics.coalesced(), 1);

        let text = metrics.render().unwrap();
        assert!(text.contains("picker_analyses_total{outcome=\"success\"} 1"));
        assert!(text.contains("picker_dropped_factors_total{factor=\"coaching\"} 1"));
        assert!(text.contains("picker_analysis_duration_seconds_count 1"));
    }

    #[test]
    fn test_registries_are_independent() {
        let first = AnalysisMetrics::new().unwrap();
        let second = AnalysisMetrics::new().unwrap();
        first.record_coalesced();
        assert_eq!(second.coalesced(), 0);
    }
}
