use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

/// Describes the contents of the binding index and the updates it publishes.
#[derive(Clone, Debug)]
pub struct IndexMetrics {
    bindings: Family<BindingLabels, Gauge>,
    target_keys: Gauge,
    dependency_keys: Gauge,
    dependents: Gauge,
    release_binding_updates: Family<UpdateLabels, Counter>,
    dropped_updates: Counter,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct BindingLabels {
    namespace: String,
    kind: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct UpdateLabels {
    admitted: String,
}

// === impl IndexMetrics ===

impl IndexMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let bindings = Family::default();
        prom.register(
            "bindings",
            "Number of indexed bindings by namespace and kind",
            bindings.clone(),
        );

        let target_keys = Gauge::default();
        prom.register(
            "target_keys",
            "Number of component/environment keys with at least one ReleaseBinding",
            target_keys.clone(),
        );

        let dependency_keys = Gauge::default();
        prom.register(
            "dependency_keys",
            "Number of component/environment keys referenced by a ConnectionBinding",
            dependency_keys.clone(),
        );

        let dependents = Gauge::default();
        prom.register(
            "dependents",
            "Number of ConnectionBinding references across all dependency keys",
            dependents.clone(),
        );

        let release_binding_updates = Family::default();
        prom.register(
            "release_binding_updates",
            "Count of observed ReleaseBinding updates by whether they may affect resolution",
            release_binding_updates.clone(),
        );

        let dropped_updates = Counter::default();
        prom.register(
            "dropped_updates",
            "Count of bindings not published because the update channel was full",
            dropped_updates.clone(),
        );

        Self {
            bindings,
            target_keys,
            dependency_keys,
            dependents,
            release_binding_updates,
            dropped_updates,
        }
    }

    pub(crate) fn set_bindings(&self, namespace: &str, kind: &str, count: usize) {
        self.bindings
            .get_or_create(&BindingLabels {
                namespace: namespace.to_string(),
                kind: kind.to_string(),
            })
            .set(count as i64);
    }

    pub(crate) fn set_target_keys(&self, count: usize) {
        self.target_keys.set(count as i64);
    }

    pub(crate) fn set_dependencies(&self, keys: usize, dependents: usize) {
        self.dependency_keys.set(keys as i64);
        self.dependents.set(dependents as i64);
    }

    pub(crate) fn release_binding_update(&self, admitted: bool) {
        self.release_binding_updates
            .get_or_create(&UpdateLabels {
                admitted: admitted.to_string(),
            })
            .inc();
    }

    pub(crate) fn dropped_update(&self) {
        self.dropped_updates.inc();
    }

    pub fn dropped_updates(&self) -> u64 {
        self.dropped_updates.get()
    }

    pub fn release_binding_updates(&self, admitted: bool) -> u64 {
        self.release_binding_updates
            .get_or_create(&UpdateLabels {
                admitted: admitted.to_string(),
            })
            .get()
    }

    pub fn target_keys(&self) -> i64 {
        self.target_keys.get()
    }

    pub fn dependency_keys(&self) -> i64 {
        self.dependency_keys.get()
    }

    pub fn dependents(&self) -> i64 {
        self.dependents.get()
    }
}
