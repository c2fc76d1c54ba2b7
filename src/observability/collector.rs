use super::ProcessMetrics;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub process: String,
    pub steps: u64,
    pub datums_pulled: u64,
    pub datums_pushed: u64,
    pub errors_count: u64,
    pub avg_step_latency_us: u64,
}

/// Registry of the metrics of every process in a pipeline.
#[derive(Clone, Default)]
pub struct MetricsCollector {
    metrics: BTreeMap<String, Arc<ProcessMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, process: impl Into<String>, metrics: Arc<ProcessMetrics>) {
        self.metrics.insert(process.into(), metrics);
    }

    pub fn snapshot(&self) -> BTreeMap<String, MetricsSnapshot> {
        self.metrics
            .iter()
            .map(|(name, metrics)| {
                (
                    name.clone(),
                    MetricsSnapshot {
                        process: metrics.process().to_string(),
                        steps: metrics.steps(),
                        datums_pulled: metrics.datums_pulled(),
                        datums_pushed: metrics.datums_pushed(),
                        errors_count: metrics.errors_count(),
                        avg_step_latency_us: metrics.avg_step_latency_us(),
                    },
                )
            })
            .collect()
    }

    pub fn get(&self, process: &str) -> Option<Arc<ProcessMetrics>> {
        self.metrics.get(process).cloned()
    }
}
