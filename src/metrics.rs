//! # Metrics Sinks
//!
//! Scalar metrics leave the core through a small sink trait; the runner never
//! talks to an experiment tracker directly. `LogSink` forwards to the `log`
//! facade, `MemorySink` buffers records for assertions in tests.

/// Accepts scalar metrics keyed by name. The only ordering requirement is
/// monotonically non-decreasing step values per key.
pub trait MetricsSink {
    fn record(&mut self, key: &str, value: f64, step: u64);
}

/// Emits every metric through `log::info!`.
#[derive(Debug, Default)]
pub struct LogSink;

impl MetricsSink for LogSink {
    fn record(&mut self, key: &str, value: f64, step: u64) {
        log::info!(target: "csgmcmc::metrics", "step={step} {key}={value:.6}");
    }
}

/// Buffers records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<(String, f64, u64)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded values for one key, in record order.
    pub fn values(&self, key: &str) -> Vec<f64> {
        self.records
            .iter()
            .filter(|(k, _, _)| k == key)
            .map(|(_, v, _)| *v)
            .collect()
    }
}

impl MetricsSink for MemorySink {
    fn record(&mut self, key: &str, value: f64, step: u64) {
        self.records.push((key.to_string(), value, step));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_filters_by_key() {
        let mut sink = MemorySink::new();
        sink.record("train/loss", 1.0, 0);
        sink.record("train/acc", 0.5, 0);
        sink.record("train/loss", 0.7, 10);
        assert_eq!(sink.values("train/loss"), vec![1.0, 0.7]);
        assert_eq!(sink.values("train/acc"), vec![0.5]);
    }
}
