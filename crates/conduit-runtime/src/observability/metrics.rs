//! Executor metrics

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Monotonic counter
#[derive(Debug, Clone)]
pub struct Counter {
    name: &'static str,
    value: Arc<AtomicU64>,
}

impl Counter {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            value: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn inc(&self) {
        self.add(1);
    }

    pub fn add(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Summary {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

/// Running summary of observed values, in seconds for durations
#[derive(Debug, Clone)]
pub struct Histogram {
    name: &'static str,
    summary: Arc<Mutex<Summary>>,
}

impl Histogram {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            summary: Arc::new(Mutex::new(Summary::default())),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn observe(&self, value: f64) {
        let mut summary = self.summary.lock().unwrap_or_else(PoisonError::into_inner);
        if summary.count == 0 {
            summary.min = value;
            summary.max = value;
        } else {
            summary.min = summary.min.min(value);
            summary.max = summary.max.max(value);
        }
        summary.count += 1;
        summary.sum += value;
    }

    pub fn observe_duration(&self, duration: Duration) {
        self.observe(duration.as_secs_f64());
    }

    fn snapshot(&self) -> Summary {
        *self.summary.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn count(&self) -> u64 {
        self.snapshot().count
    }

    pub fn sum(&self) -> f64 {
        self.snapshot().sum
    }

    /// Smallest observation; 0.0 when empty
    pub fn min(&self) -> f64 {
        self.snapshot().min
    }

    /// Largest observation; 0.0 when empty
    pub fn max(&self) -> f64 {
        self.snapshot().max
    }

    pub fn mean(&self) -> f64 {
        let summary = self.snapshot();
        if summary.count == 0 {
            0.0
        } else {
            summary.sum / summary.count as f64
        }
    }
}

/// Metrics shared by the executor and the evaluation context
#[derive(Debug, Clone)]
pub struct ExecutorMetrics {
    pub bundles_committed: Counter,
    pub elements_committed: Counter,
    pub evaluation_failures: Counter,
    pub bundle_duration: Histogram,
}

impl ExecutorMetrics {
    pub fn new() -> Self {
        Self {
            bundles_committed: Counter::new("bundles_committed"),
            elements_committed: Counter::new("elements_committed"),
            evaluation_failures: Counter::new("evaluation_failures"),
            bundle_duration: Histogram::new("bundle_duration"),
        }
    }
}

impl Default for ExecutorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_shared_between_clones() {
        let counter = Counter::new("bundles_committed");
        let clone = counter.clone();
        counter.inc();
        clone.add(4);
        assert_eq!(counter.get(), 5);
    }

    #[test]
    fn test_histogram() {
        let histogram = Histogram::new("bundle_duration");
        assert_eq!(histogram.min(), 0.0);
        assert_eq!(histogram.mean(), 0.0);

        histogram.observe(2.0);
        histogram.observe(1.0);
        histogram.observe(3.0);
        histogram.observe_duration(Duration::from_secs(4));

        assert_eq!(histogram.count(), 4);
        assert_eq!(histogram.sum(), 10.0);
        assert_eq!(histogram.min(), 1.0);
        assert_eq!(histogram.max(), 4.0);
        assert_eq!(histogram.mean(), 2.5);
    }

    #[test]
    fn test_histogram_shared_between_clones() {
        let histogram = Histogram::new("bundle_duration");
        let clone = histogram.clone();
        for _ in 0..1000 {
            clone.observe(0.5);
        }
        assert_eq!(histogram.count(), 1000);
        assert_eq!(histogram.max(), 0.5);
    }
}
