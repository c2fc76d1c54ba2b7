use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Per-process counters, updated from the process task and read from anywhere.
pub struct ProcessMetrics {
    process: String,
    steps: AtomicU64,
    datums_pulled: AtomicU64,
    datums_pushed: AtomicU64,
    errors_count: AtomicU64,
    total_latency_us: AtomicU64,
    latency_samples: AtomicU64,
}

impl ProcessMetrics {
    pub fn new(process: impl Into<String>) -> Self {
        Self {
            process: process.into(),
            steps: AtomicU64::new(0),
            datums_pulled: AtomicU64::new(0),
            datums_pushed: AtomicU64::new(0),
            errors_count: AtomicU64::new(0),
            total_latency_us: AtomicU64::new(0),
            latency_samples: AtomicU64::new(0),
        }
    }

    pub fn process(&self) -> &str {
        &self.process
    }

    pub fn steps(&self) -> u64 {
        self.steps.load(Ordering::Relaxed)
    }

    pub fn datums_pulled(&self) -> u64 {
        self.datums_pulled.load(Ordering::Relaxed)
    }

    /// Non-EOS datums delivered to at least one edge
    pub fn datums_pushed(&self) -> u64 {
        self.datums_pushed.load(Ordering::Relaxed)
    }

    pub fn errors_count(&self) -> u64 {
        self.errors_count.load(Ordering::Relaxed)
    }

    pub fn record_pulled(&self) {
        self.datums_pulled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pushed(&self) {
        self.datums_pushed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn start_step(&self) -> Instant {
        Instant::now()
    }

    pub fn finish_step(&self, start: Instant) {
        let latency_us = start.elapsed().as_micros() as u64;
        self.steps.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_step_latency_us(&self) -> u64 {
        let samples = self.latency_samples.load(Ordering::Relaxed);
        if samples == 0 {
            return 0;
        }
        self.total_latency_us.load(Ordering::Relaxed) / samples
    }
}

impl std::fmt::Debug for ProcessMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessMetrics")
            .field("process", &self.process)
            .field("steps", &self.steps())
            .field("datums_pulled", &self.datums_pulled())
            .field("datums_pushed", &self.datums_pushed())
            .field("errors_count", &self.errors_count())
            .finish()
    }
}
