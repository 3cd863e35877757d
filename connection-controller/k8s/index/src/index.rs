use crate::{filter, metrics::IndexMetrics};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use openchoreo_connection_controller_core::{
    ConnectionBindingStore, OwnerEnvKey, ReleaseBindingStore, ResourceId, StoreError,
};
use openchoreo_connection_controller_k8s_api::{
    ConnectionBinding, ConnectionBindingSpec, ReleaseBinding, Resource, ResourceExt,
};
use parking_lot::RwLock;
use std::{collections::hash_map::Entry, sync::Arc};
use tokio::{
    sync::mpsc::{error::TrySendError, Sender},
    time,
};
use tracing::{debug, trace, warn};

pub type SharedIndex = Arc<RwLock<Index>>;

/// Holds all indexing state. Updated by the watch tasks and read by the
/// reconciliation workers.
#[derive(Debug)]
pub struct Index {
    /// ReleaseBindings by namespace and name.
    release_bindings: HashMap<String, HashMap<String, ReleaseBinding>>,

    /// Names ReleaseBindings by the component and environment they bind.
    by_owner_env: HashMap<OwnerEnvKey, HashSet<ResourceId>>,

    /// ConnectionBindings by namespace and name.
    connection_bindings: HashMap<String, HashMap<String, Consumer>>,

    /// Names the ConnectionBindings that depend on each target key.
    dependents: HashMap<OwnerEnvKey, HashSet<ResourceId>>,

    /// Publishes the ConnectionBindings that need to be reconciled.
    updates: Sender<ResourceId>,

    metrics: IndexMetrics,
}

#[derive(Debug)]
struct Consumer {
    binding: ConnectionBinding,
    targets: HashSet<OwnerEnvKey>,
}

/// Returns the distinct target keys a binding's connections are resolved
/// against.
pub fn dependency_keys(spec: &ConnectionBindingSpec) -> HashSet<OwnerEnvKey> {
    spec.connections
        .iter()
        .map(|target| OwnerEnvKey::for_target(target, &spec.environment))
        .collect()
}

// === impl Index ===

impl Index {
    pub fn shared(updates: Sender<ResourceId>, metrics: IndexMetrics) -> SharedIndex {
        Arc::new(RwLock::new(Self {
            release_bindings: HashMap::new(),
            by_owner_env: HashMap::new(),
            connection_bindings: HashMap::new(),
            dependents: HashMap::new(),
            updates,
            metrics,
        }))
    }

    /// Publishes every known ConnectionBinding at a fixed interval so that
    /// missed or dropped updates are eventually reconciled.
    pub async fn run(index: SharedIndex, period: time::Duration) {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if !Self::resync(&index).await {
                debug!("Update channel closed");
                return;
            }
        }
    }

    /// Publishes every known ConnectionBinding, waiting for room in the update
    /// channel rather than dropping keys.
    ///
    /// Returns false if the update channel is closed.
    pub async fn resync(index: &SharedIndex) -> bool {
        let (ids, updates) = {
            let index = index.read();
            (index.connection_binding_ids(), index.updates.clone())
        };
        debug!(bindings = ids.len(), "Resyncing");
        for id in ids {
            if updates.send(id).await.is_err() {
                return false;
            }
        }
        true
    }

    /// Lists the IDs of every known ConnectionBinding.
    pub fn connection_binding_ids(&self) -> Vec<ResourceId> {
        self.connection_bindings
            .iter()
            .flat_map(|(ns, bindings)| {
                bindings
                    .keys()
                    .map(move |name| ResourceId::new(ns.clone(), name.clone()))
            })
            .collect()
    }

    /// Iterates over the ConnectionBindings that declare a connection to `key`.
    pub fn dependents(&self, key: &OwnerEnvKey) -> impl Iterator<Item = &ResourceId> {
        self.dependents.get(key).into_iter().flatten()
    }

    fn enqueue(&self, id: ResourceId) {
        match self.updates.try_send(id) {
            Ok(()) => {}
            Err(TrySendError::Full(id)) => {
                warn!(%id, "Update queue is full; the binding will be reconciled on resync");
                self.metrics.dropped_update();
            }
            Err(TrySendError::Closed(id)) => {
                debug!(%id, "Update queue is closed");
            }
        }
    }

    fn enqueue_dependents(&self, key: &OwnerEnvKey) {
        for id in self.dependents(key) {
            trace!(%key, %id, "Enqueueing dependent");
            self.enqueue(id.clone());
        }
    }

    fn link_release_binding(&mut self, key: OwnerEnvKey, id: ResourceId) {
        self.by_owner_env.entry(key).or_default().insert(id);
    }

    fn unlink_release_binding(&mut self, key: &OwnerEnvKey, id: &ResourceId) {
        if let Some(ids) = self.by_owner_env.get_mut(key) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_owner_env.remove(key);
            }
        }
    }

    fn unlink_dependent(&mut self, key: &OwnerEnvKey, id: &ResourceId) {
        if let Some(ids) = self.dependents.get_mut(key) {
            ids.remove(id);
            if ids.is_empty() {
                self.dependents.remove(key);
            }
        }
    }

    fn observe_release_bindings(&self, namespace: &str) {
        let count = self
            .release_bindings
            .get(namespace)
            .map_or(0, |bindings| bindings.len());
        self.metrics
            .set_bindings(namespace, &ReleaseBinding::kind(&()), count);
        self.metrics.set_target_keys(self.by_owner_env.len());
    }

    fn observe_connection_bindings(&self, namespace: &str) {
        let count = self
            .connection_bindings
            .get(namespace)
            .map_or(0, |bindings| bindings.len());
        self.metrics
            .set_bindings(namespace, &ConnectionBinding::kind(&()), count);
        let dependents = self.dependents.values().map(|ids| ids.len()).sum();
        self.metrics
            .set_dependencies(self.dependents.len(), dependents);
    }
}

impl kubert::index::IndexNamespacedResource<ReleaseBinding> for Index {
    fn apply(&mut self, rb: ReleaseBinding) {
        let namespace = rb
            .namespace()
            .expect("ReleaseBinding must have a namespace");
        let name = rb.name_unchecked();
        let id = ResourceId::new(namespace.clone(), name.clone());
        let key = OwnerEnvKey::for_release_binding(namespace.clone(), &rb.spec);

        let old = self
            .release_bindings
            .get(&namespace)
            .and_then(|bindings| bindings.get(&name));
        let admitted = filter::admits_update(old, &rb);
        let old_key = old
            .map(|old| OwnerEnvKey::for_release_binding(namespace.clone(), &old.spec))
            .filter(|old_key| *old_key != key);

        self.release_bindings
            .entry(namespace.clone())
            .or_default()
            .insert(name, rb);

        if let Some(old_key) = old_key.as_ref() {
            debug!(%id, from = %old_key, to = %key, "ReleaseBinding moved");
            self.unlink_release_binding(old_key, &id);
        }
        self.link_release_binding(key.clone(), id.clone());
        self.observe_release_bindings(&namespace);
        self.metrics.release_binding_update(admitted);

        if !admitted {
            trace!(%id, "Ignoring ReleaseBinding update");
            return;
        }
        self.enqueue_dependents(&key);
        if let Some(old_key) = old_key {
            self.enqueue_dependents(&old_key);
        }
    }

    fn delete(&mut self, namespace: String, name: String) {
        let Entry::Occupied(mut bindings) = self.release_bindings.entry(namespace.clone()) else {
            return;
        };
        let Some(rb) = bindings.get_mut().remove(&name) else {
            return;
        };
        if bindings.get().is_empty() {
            bindings.remove();
        }

        let id = ResourceId::new(namespace.clone(), name);
        let key = OwnerEnvKey::for_release_binding(namespace.clone(), &rb.spec);
        self.unlink_release_binding(&key, &id);
        self.observe_release_bindings(&namespace);
        self.enqueue_dependents(&key);
    }

    // Since apply only reindexes a single ReleaseBinding at a time, there's no
    // need to handle resets specially.
}

impl kubert::index::IndexNamespacedResource<ConnectionBinding> for Index {
    fn apply(&mut self, cb: ConnectionBinding) {
        let namespace = cb
            .namespace()
            .expect("ConnectionBinding must have a namespace");
        let name = cb.name_unchecked();
        let id = ResourceId::new(namespace.clone(), name.clone());
        let targets = dependency_keys(&cb.spec);

        let (changed, stale) = match self
            .connection_bindings
            .entry(namespace.clone())
            .or_default()
            .entry(name)
        {
            Entry::Vacant(entry) => {
                entry.insert(Consumer {
                    binding: cb,
                    targets: targets.clone(),
                });
                (true, HashSet::new())
            }
            Entry::Occupied(mut entry) => {
                let consumer = entry.get_mut();
                let changed = consumer.binding != cb;
                let stale = consumer
                    .targets
                    .difference(&targets)
                    .cloned()
                    .collect::<HashSet<_>>();
                consumer.binding = cb;
                consumer.targets = targets.clone();
                (changed, stale)
            }
        };

        for key in &stale {
            self.unlink_dependent(key, &id);
        }
        for key in targets {
            self.dependents.entry(key).or_default().insert(id.clone());
        }
        self.observe_connection_bindings(&namespace);

        if changed {
            self.enqueue(id);
        }
    }

    fn delete(&mut self, namespace: String, name: String) {
        let Entry::Occupied(mut bindings) = self.connection_bindings.entry(namespace.clone())
        else {
            return;
        };
        let Some(consumer) = bindings.get_mut().remove(&name) else {
            return;
        };
        if bindings.get().is_empty() {
            bindings.remove();
        }

        let id = ResourceId::new(namespace.clone(), name);
        for key in &consumer.targets {
            self.unlink_dependent(key, &id);
        }
        self.observe_connection_bindings(&namespace);
    }
}

impl ReleaseBindingStore for Index {
    fn list_release_bindings(&self, key: &OwnerEnvKey) -> Result<Vec<ReleaseBinding>, StoreError> {
        let bindings = self
            .by_owner_env
            .get(key)
            .into_iter()
            .flatten()
            .filter_map(|id| {
                self.release_bindings
                    .get(&id.namespace)
                    .and_then(|bindings| bindings.get(&id.name))
            })
            .cloned()
            .collect();
        Ok(bindings)
    }
}

impl ConnectionBindingStore for Index {
    fn get_connection_binding(&self, id: &ResourceId) -> Result<ConnectionBinding, StoreError> {
        self.connection_bindings
            .get(&id.namespace)
            .and_then(|bindings| bindings.get(&id.name))
            .map(|consumer| consumer.binding.clone())
            .ok_or(StoreError::NotFound)
    }
}
