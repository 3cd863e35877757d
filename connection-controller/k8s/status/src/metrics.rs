use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

#[derive(Clone, Debug)]
pub struct ControllerMetrics {
    reconciles: Family<ReconcileLabels, Counter>,
    status_writes: Counter,
    conflicts: Counter,
    dropped: Counter,
    queue_depth: Gauge,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ReconcileLabels {
    result: String,
}

// === impl ControllerMetrics ===

impl ControllerMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let reconciles = Family::default();
        prom.register(
            "reconciles",
            "Count of ConnectionBinding reconciliations by result",
            reconciles.clone(),
        );

        let status_writes = Counter::default();
        prom.register(
            "status_writes",
            "Count of ConnectionBinding status writes",
            status_writes.clone(),
        );

        let conflicts = Counter::default();
        prom.register(
            "status_conflicts",
            "Count of status writes rejected because the binding was modified",
            conflicts.clone(),
        );

        let dropped = Counter::default();
        prom.register(
            "dropped_keys",
            "Count of keys discarded because the work queue was full",
            dropped.clone(),
        );

        let queue_depth = Gauge::default();
        prom.register(
            "queue_depth",
            "Number of keys waiting to be reconciled",
            queue_depth.clone(),
        );

        Self {
            reconciles,
            status_writes,
            conflicts,
            dropped,
            queue_depth,
        }
    }

    pub(crate) fn reconciled(&self, result: &str) {
        self.reconciles
            .get_or_create(&ReconcileLabels {
                result: result.to_string(),
            })
            .inc();
    }

    pub(crate) fn status_written(&self) {
        self.status_writes.inc();
    }

    pub(crate) fn conflicted(&self) {
        self.conflicts.inc();
    }

    /// The counter shared with the work queue, which increments it for every
    /// key it discards.
    pub(crate) fn dropped_keys(&self) -> Counter {
        self.dropped.clone()
    }

    pub(crate) fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.set(depth as i64);
    }
}
