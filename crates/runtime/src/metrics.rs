use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::Serialize;

/// Deterministic measurement store fed by instrumentation hooks.
///
/// Sorted maps keep snapshots stable regardless of recording order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Metrics {
    counters: BTreeMap<String, u64>,
    histograms: BTreeMap<String, Histogram>,
}

/// Shared handle used by hooks that outlive a single call.
pub type SharedMetrics = Rc<RefCell<Metrics>>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Histogram {
    pub count: u64,
    pub sum: i64,
    pub min: i64,
    pub max: i64,
}

impl Histogram {
    pub fn record(&mut self, value: i64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum = self.sum.saturating_add(value);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub counters: Vec<(String, u64)>,
    pub histograms: Vec<(String, Histogram)>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedMetrics {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn clear(&mut self) {
        self.counters.clear();
        self.histograms.clear();
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn inc_counter(&mut self, name: impl Into<String>, by: u64) {
        *self.counters.entry(name.into()).or_insert(0) += by;
    }

    pub fn record_histogram(&mut self, name: impl Into<String>, value: i64) {
        self.histograms
            .entry(name.into())
            .or_default()
            .record(value);
    }

    pub fn histogram(&self, name: &str) -> Option<Histogram> {
        self.histograms.get(name).copied()
    }

    /// Sorted snapshot restricted to names starting with `prefix`.
    pub fn snapshot_prefixed(&self, prefix: &str) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self
                .counters
                .iter()
                .filter(|(k, _)| k.starts_with(prefix))
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            histograms: self
                .histograms
                .iter()
                .filter(|(k, _)| k.starts_with(prefix))
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.snapshot_prefixed("")
    }
}

#[cfg(test)]
mod tests {
    use super::{Histogram, Metrics};
    use pretty_assertions::assert_eq;

    #[test]
    fn counters_accumulate() {
        let mut m = Metrics::new();
        m.inc_counter("instrument.webgl.frames", 1);
        m.inc_counter("instrument.webgl.frames", 2);
        assert_eq!(m.counter("instrument.webgl.frames"), 3);
        assert_eq!(m.counter("missing"), 0);
    }

    #[test]
    fn histogram_tracks_min_max_sum_count() {
        let mut h = Histogram::default();
        assert_eq!(h.count, 0);
        h.record(5);
        h.record(-2);
        h.record(7);
        assert_eq!(h.count, 3);
        assert_eq!(h.sum, 10);
        assert_eq!(h.min, -2);
        assert_eq!(h.max, 7);
    }

    #[test]
    fn snapshot_is_sorted_and_filterable() {
        let shared = Metrics::shared();
        {
            let mut m = shared.borrow_mut();
            m.inc_counter("instrument.webgpu.frames", 1);
            m.inc_counter("instrument.canvas.frames", 1);
            m.inc_counter("other", 4);
            m.record_histogram("instrument.canvas.frame_us", 10);
        }
        let m = shared.borrow();
        let snap = m.snapshot_prefixed("instrument.");
        assert_eq!(
            snap.counters,
            vec![
                ("instrument.canvas.frames".to_string(), 1),
                ("instrument.webgpu.frames".to_string(), 1)
            ]
        );
        assert_eq!(snap.histograms.len(), 1);
        assert_eq!(m.snapshot().counters.len(), 3);
    }
}
