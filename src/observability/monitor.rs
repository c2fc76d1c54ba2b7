use super::MetricsCollector;

pub struct PipelineMonitor {
    collector: MetricsCollector,
}

impl PipelineMonitor {
    pub fn new(collector: MetricsCollector) -> Self {
        Self { collector }
    }

    /// Plain-text summary, one block per process in name order.
    pub fn generate_report(&self) -> String {
        let snapshot = self.collector.snapshot();

        if snapshot.is_empty() {
            return "No processes registered".to_string();
        }

        let mut report = String::from("=== Pipeline Metrics ===\n");

        for (name, metrics) in snapshot.iter() {
            let errors = match metrics.errors_count {
                0 => "0 errors".to_string(),
                1 => "1 error".to_string(),
                n => format!("{} errors", n),
            };
            report.push_str(&format!(
                "\n[{}]\n  Steps: {}\n  Datums: {} in, {} out\n  Errors: {}\n  Avg Step Latency: {}μs\n",
                name,
                metrics.steps,
                metrics.datums_pulled,
                metrics.datums_pushed,
                errors,
                metrics.avg_step_latency_us
            ));
        }

        report
    }

    pub fn collector(&self) -> &MetricsCollector {
        &self.collector
    }
}
