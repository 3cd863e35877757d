use crate::{
    queue::{Backoff, Enqueued, WorkQueue},
    ControllerMetrics,
};
use chrono::Utc;
use kubert::lease::Claim;
use openchoreo_connection_controller_core::{
    resolve_status, ConnectionBindingStore, ReleaseBindingStore, ResourceId, StatusStore,
    StoreError,
};
use openchoreo_connection_controller_k8s_api::Time;
use std::sync::Arc;
use tokio::{
    sync::{mpsc, watch},
    time,
};
use tracing::{debug, info, info_span, warn, Instrument};

#[derive(Copy, Clone, Debug)]
pub struct Config {
    pub workers: usize,
    pub queue_capacity: usize,
    pub reconcile_timeout: time::Duration,
    pub backoff: Backoff,
}

/// Drains published keys into a work queue and runs a pool of workers that
/// reconcile the status of each `ConnectionBinding`.
pub struct Controller<S, W> {
    store: Arc<S>,
    writer: Arc<W>,
    updates: mpsc::Receiver<ResourceId>,
    queue: Arc<WorkQueue>,
    claims: watch::Receiver<Arc<Claim>>,
    name: String,
    workers: usize,
    reconcile_timeout: time::Duration,
    metrics: ControllerMetrics,
}

struct Worker<S, W> {
    store: Arc<S>,
    writer: Arc<W>,
    queue: Arc<WorkQueue>,
    claims: watch::Receiver<Arc<Claim>>,
    name: String,
    reconcile_timeout: time::Duration,
    metrics: ControllerMetrics,
}

/// The outcome of a successful reconciliation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Reconciled {
    /// The binding no longer exists.
    Deleted,
    /// The computed status equals the stored status; nothing was written.
    Unchanged,
    /// A new status was written.
    Updated,
}

/// Recomputes the status of a binding and writes it if it changed.
///
/// Any failure, including a write conflict, leaves the stored status as it
/// was.
pub async fn reconcile<S, W>(
    id: &ResourceId,
    store: &S,
    writer: &W,
    now: Time,
) -> Result<Reconciled, StoreError>
where
    S: ConnectionBindingStore + ReleaseBindingStore + ?Sized,
    W: StatusStore + ?Sized,
{
    let binding = match store.get_connection_binding(id) {
        Ok(binding) => binding,
        Err(StoreError::NotFound) => return Ok(Reconciled::Deleted),
        Err(error) => return Err(error),
    };

    let status = resolve_status(&binding, store, now)?;
    if binding.status.as_ref() == Some(&status) {
        return Ok(Reconciled::Unchanged);
    }

    debug!(
        %id,
        resolved = status.resolved.len(),
        pending = status.pending.len(),
        "Updating status"
    );
    writer
        .update_status(id, binding.metadata.resource_version.clone(), status)
        .await?;
    Ok(Reconciled::Updated)
}

// === impl Reconciled ===

impl Reconciled {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deleted => "deleted",
            Self::Unchanged => "unchanged",
            Self::Updated => "updated",
        }
    }
}

// === impl Controller ===

impl<S, W> Controller<S, W>
where
    S: ConnectionBindingStore + ReleaseBindingStore + Send + Sync + 'static,
    W: StatusStore + Send + Sync + 'static,
{
    pub fn new(
        store: S,
        writer: W,
        updates: mpsc::Receiver<ResourceId>,
        claims: watch::Receiver<Arc<Claim>>,
        name: impl ToString,
        config: Config,
        metrics: ControllerMetrics,
    ) -> Self {
        Self {
            store: Arc::new(store),
            writer: Arc::new(writer),
            updates,
            queue: WorkQueue::new(config.queue_capacity, config.backoff, metrics.dropped_keys()),
            claims,
            name: name.to_string(),
            workers: config.workers.max(1),
            reconcile_timeout: config.reconcile_timeout,
            metrics,
        }
    }

    /// Runs until the update channel is closed.
    ///
    /// Keys are accepted regardless of leadership so that a replica that
    /// acquires the lease starts with every pending key.
    pub async fn run(self) {
        let Self {
            store,
            writer,
            mut updates,
            queue,
            claims,
            name,
            workers,
            reconcile_timeout,
            metrics,
        } = self;

        for worker in 0..workers {
            let worker_task = Worker {
                store: store.clone(),
                writer: writer.clone(),
                queue: queue.clone(),
                claims: claims.clone(),
                name: name.clone(),
                reconcile_timeout,
                metrics: metrics.clone(),
            };
            tokio::spawn(worker_task.run().instrument(info_span!("worker", worker)));
        }

        while let Some(id) = updates.recv().await {
            if queue.add(id.clone()) == Enqueued::Dropped {
                warn!(%id, "Work queue is full; the binding will be reconciled on resync");
            }
            metrics.set_queue_depth(queue.len());
        }
        debug!("Update channel closed");
    }
}

// === impl Worker ===

impl<S, W> Worker<S, W>
where
    S: ConnectionBindingStore + ReleaseBindingStore + Send + Sync + 'static,
    W: StatusStore + Send + Sync + 'static,
{
    async fn run(mut self) {
        loop {
            if !self.is_leader() {
                debug!("Waiting for the write lease");
                let claimed = self
                    .claims
                    .wait_for(|claim| claim.is_current_for(&self.name))
                    .await
                    .is_ok();
                if !claimed {
                    debug!("Lease claims closed");
                    return;
                }
                info!("Acquired the write lease");
            }

            let id = self.queue.next().await;
            self.metrics.set_queue_depth(self.queue.len());

            // Leadership may have been lost while waiting for a key.
            if !self.is_leader() {
                self.queue.done(&id);
                self.queue.add(id);
                continue;
            }

            self.process(&id).await;
            self.queue.done(&id);
        }
    }

    async fn process(&self, id: &ResourceId) {
        let now = Time(Utc::now());
        let attempt = reconcile(id, &*self.store, &*self.writer, now);
        let error = match time::timeout(self.reconcile_timeout, attempt).await {
            Ok(Ok(reconciled)) => {
                debug!(%id, result = reconciled.as_str(), "Reconciled");
                if reconciled == Reconciled::Updated {
                    self.metrics.status_written();
                }
                self.metrics.reconciled(reconciled.as_str());
                self.queue.forget(id);
                return;
            }
            Ok(Err(error)) => error,
            Err(_) => {
                self.metrics.reconciled("timeout");
                let delay = self.queue.requeue_with_backoff(id.clone());
                warn!(%id, ?delay, "Reconciliation timed out");
                return;
            }
        };

        self.metrics.reconciled("error");
        if let StoreError::Conflict = error {
            self.metrics.conflicted();
        }
        if !error.is_retryable() {
            debug!(%id, %error, "Dropping binding");
            self.queue.forget(id);
            return;
        }
        let delay = self.queue.requeue_with_backoff(id.clone());
        warn!(%id, %error, ?delay, "Failed to reconcile binding");
    }

    fn is_leader(&self) -> bool {
        self.claims.borrow().is_current_for(&self.name)
    }
}
