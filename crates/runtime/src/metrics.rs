use std::collections::BTreeMap;

/// Render-state counters and gauges.
///
/// Backed by sorted maps so snapshots come out in a stable order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Metrics {
    counters: BTreeMap<&'static str, u64>,
    gauges: BTreeMap<&'static str, i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub counters: Vec<(&'static str, u64)>,
    pub gauges: Vec<(&'static str, i64)>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.counters.clear();
        self.gauges.clear();
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn inc(&mut self, name: &'static str) {
        self.inc_by(name, 1);
    }

    pub fn inc_by(&mut self, name: &'static str, by: u64) {
        let value = self.counters.entry(name).or_insert(0);
        *value += by;
        tracing::trace!(counter = name, value = *value, "counter updated");
    }

    pub fn gauge(&self, name: &str) -> Option<i64> {
        self.gauges.get(name).copied()
    }

    pub fn set_gauge(&mut self, name: &'static str, value: i64) {
        self.gauges.insert(name, value);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self.counters.iter().map(|(k, v)| (*k, *v)).collect(),
            gauges: self.gauges.iter().map(|(k, v)| (*k, *v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Metrics;

    #[test]
    fn counters_accumulate() {
        let mut m = Metrics::new();
        m.inc("rebuilds");
        m.inc_by("rebuilds", 2);
        assert_eq!(m.counter("rebuilds"), 3);
        assert_eq!(m.counter("missing"), 0);
    }

    #[test]
    fn gauges_overwrite() {
        let mut m = Metrics::new();
        assert_eq!(m.gauge("markers"), None);
        m.set_gauge("markers", 10);
        m.set_gauge("markers", 4);
        assert_eq!(m.gauge("markers"), Some(4));
    }

    #[test]
    fn snapshot_is_sorted() {
        let mut m = Metrics::new();
        m.inc("b");
        m.inc("a");
        m.set_gauge("z", 1);
        m.set_gauge("m", 2);
        let snap = m.snapshot();
        assert_eq!(snap.counters, vec![("a", 1), ("b", 1)]);
        assert_eq!(snap.gauges, vec![("m", 2), ("z", 1)]);
    }
}
