use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use openchoreo_connection_controller_core::ResourceId;
use parking_lot::Mutex;
use prometheus_client::metrics::counter::Counter;
use std::{collections::VecDeque, sync::Arc};
use tokio::{sync::Notify, time};
use tracing::{trace, warn};

/// Exponential retry delays for keys whose reconciliation failed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Backoff {
    pub base: time::Duration,
    pub max: time::Duration,
}

/// A bounded queue of keys awaiting reconciliation.
///
/// A key is held at most once: adding a key that is already queued is a
/// no-op, and adding a key that a worker is currently processing marks it to
/// be queued again once that worker is done. No key is ever processed by two
/// workers concurrently.
#[derive(Debug)]
pub struct WorkQueue {
    state: Mutex<State>,
    ready: Notify,
    capacity: usize,
    backoff: Backoff,
    dropped: Counter,
}

#[derive(Debug, Default)]
struct State {
    queue: VecDeque<ResourceId>,
    queued: HashSet<ResourceId>,
    processing: HashSet<ResourceId>,
    dirty: HashSet<ResourceId>,
    failures: HashMap<ResourceId, u32>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Enqueued {
    /// The key was appended to the queue.
    Added,
    /// The key was already pending and was coalesced.
    Merged,
    /// The queue is full and the key was discarded.
    Dropped,
}

// === impl Backoff ===

impl Backoff {
    /// Returns the delay before the next attempt after `failures` consecutive
    /// failures: `base * 2^(failures - 1)`, capped at `max`.
    pub fn delay(&self, failures: u32) -> time::Duration {
        let exp = failures.saturating_sub(1).min(31);
        self.base.saturating_mul(1 << exp).min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: time::Duration::from_millis(100),
            max: time::Duration::from_secs(30),
        }
    }
}

// === impl WorkQueue ===

impl WorkQueue {
    /// Creates a queue holding at most `capacity` pending keys. Every key
    /// discarded because the queue is full increments `dropped`.
    pub fn new(capacity: usize, backoff: Backoff, dropped: Counter) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
            ready: Notify::new(),
            capacity,
            backoff,
            dropped,
        })
    }

    pub fn add(&self, id: ResourceId) -> Enqueued {
        let mut state = self.state.lock();
        if state.queued.contains(&id) {
            return Enqueued::Merged;
        }
        if state.processing.contains(&id) {
            trace!(%id, "Marking in-flight key dirty");
            state.dirty.insert(id);
            return Enqueued::Merged;
        }
        if state.queue.len() >= self.capacity {
            self.dropped.inc();
            return Enqueued::Dropped;
        }

        state.queued.insert(id.clone());
        state.queue.push_back(id);
        drop(state);
        self.ready.notify_one();
        Enqueued::Added
    }

    /// Waits for the next key and marks it as being processed.
    ///
    /// Every key returned must be passed to [`WorkQueue::done`].
    pub async fn next(&self) -> ResourceId {
        loop {
            if let Some(id) = self.try_next() {
                return id;
            }
            self.ready.notified().await;
        }
    }

    fn try_next(&self) -> Option<ResourceId> {
        let mut state = self.state.lock();
        let id = state.queue.pop_front()?;
        state.queued.remove(&id);
        state.processing.insert(id.clone());
        let more = !state.queue.is_empty();
        drop(state);

        // A single stored permit may stand for several adds.
        if more {
            self.ready.notify_one();
        }
        Some(id)
    }

    /// Releases a key returned by [`WorkQueue::next`], queueing it again if it
    /// was added while it was being processed.
    pub fn done(&self, id: &ResourceId) {
        let mut state = self.state.lock();
        state.processing.remove(id);
        if state.dirty.remove(id) && state.queued.insert(id.clone()) {
            state.queue.push_back(id.clone());
            drop(state);
            self.ready.notify_one();
        }
    }

    /// Records a failed attempt and adds the key back after a delay that grows
    /// with the number of consecutive failures.
    pub fn requeue_with_backoff(self: &Arc<Self>, id: ResourceId) -> time::Duration {
        let failures = {
            let mut state = self.state.lock();
            let failures = state.failures.entry(id.clone()).or_default();
            *failures += 1;
            *failures
        };
        let delay = self.backoff.delay(failures);

        let queue = self.clone();
        tokio::spawn(async move {
            time::sleep(delay).await;
            if queue.add(id.clone()) == Enqueued::Dropped {
                warn!(%id, "Queue is full; the binding will be reconciled on resync");
            }
        });
        delay
    }

    /// Clears the failure count of a key.
    pub fn forget(&self, id: &ResourceId) {
        self.state.lock().failures.remove(id);
    }

    pub fn failures(&self, id: &ResourceId) -> u32 {
        self.state.lock().failures.get(id).copied().unwrap_or(0)
    }

    /// Returns the number of keys waiting to be processed.
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> ResourceId {
        ResourceId::new("default".to_string(), name.to_string())
    }

    fn backoff() -> Backoff {
        Backoff {
            base: time::Duration::from_millis(100),
            max: time::Duration::from_secs(1),
        }
    }

    #[test]
    fn backoff_doubles_up_to_max() {
        let backoff = backoff();
        let delays = (1..=6).map(|n| backoff.delay(n)).collect::<Vec<_>>();
        assert_eq!(
            delays,
            vec![
                time::Duration::from_millis(100),
                time::Duration::from_millis(200),
                time::Duration::from_millis(400),
                time::Duration::from_millis(800),
                time::Duration::from_secs(1),
                time::Duration::from_secs(1),
            ]
        );
        assert_eq!(backoff.delay(u32::MAX), time::Duration::from_secs(1));
    }

    #[tokio::test]
    async fn deduplicates_queued_keys() {
        let queue = WorkQueue::new(10, backoff(), Counter::default());
        assert_eq!(queue.add(id("a")), Enqueued::Added);
        assert_eq!(queue.add(id("b")), Enqueued::Added);
        assert_eq!(queue.add(id("a")), Enqueued::Merged);
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.next().await, id("a"));
        assert_eq!(queue.next().await, id("b"));
        assert!(queue.is_empty());
    }

    #[test]
    fn drops_keys_beyond_capacity() {
        let dropped = Counter::default();
        let queue = WorkQueue::new(1, backoff(), dropped.clone());
        assert_eq!(queue.add(id("a")), Enqueued::Added);
        assert_eq!(queue.add(id("b")), Enqueued::Dropped);
        assert_eq!(queue.len(), 1);
        assert_eq!(dropped.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn counts_keys_dropped_after_backoff() {
        let dropped = Counter::default();
        let queue = WorkQueue::new(1, backoff(), dropped.clone());
        queue.add(id("a"));

        queue.requeue_with_backoff(id("b"));
        time::sleep(time::Duration::from_millis(150)).await;
        assert_eq!(queue.len(), 1);
        assert_eq!(dropped.get(), 1);
    }

    #[tokio::test]
    async fn in_flight_keys_are_requeued_when_done() {
        let queue = WorkQueue::new(10, backoff(), Counter::default());
        queue.add(id("a"));
        let a = queue.next().await;

        // Not handed to another worker while in flight.
        assert_eq!(queue.add(id("a")), Enqueued::Merged);
        assert!(queue.is_empty());

        queue.done(&a);
        assert_eq!(queue.len(), 1);
        let a = queue.next().await;
        queue.done(&a);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn next_waits_for_add() {
        let queue = WorkQueue::new(10, backoff(), Counter::default());
        let next = tokio::spawn({
            let queue = queue.clone();
            async move { queue.next().await }
        });
        tokio::task::yield_now().await;
        assert!(!next.is_finished());

        queue.add(id("a"));
        assert_eq!(next.await.unwrap(), id("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn requeues_after_backoff() {
        let queue = WorkQueue::new(10, backoff(), Counter::default());
        let a = id("a");

        assert_eq!(
            queue.requeue_with_backoff(a.clone()),
            time::Duration::from_millis(100)
        );
        assert!(queue.is_empty());
        time::sleep(time::Duration::from_millis(150)).await;
        assert_eq!(queue.len(), 1);
        let next = queue.next().await;
        queue.done(&next);

        assert_eq!(
            queue.requeue_with_backoff(a.clone()),
            time::Duration::from_millis(200)
        );
        assert_eq!(queue.failures(&a), 2);

        queue.forget(&a);
        assert_eq!(queue.failures(&a), 0);
        assert_eq!(
            queue.requeue_with_backoff(a),
            time::Duration::from_millis(100)
        );
    }
}
