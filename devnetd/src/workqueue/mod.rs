//! A deduplicating FIFO work queue modeled on the Kubernetes client-go
//! workqueue.
//!
//! Three internal collections — `queue`, `dirty`, `processing` — guarded by
//! a single mutex, with a condition variable signaled on `add`, `done`, and
//! `shut_down`. This mirrors client-go's blocking-dequeue semantics exactly,
//! rather than an async channel: a worker calling `get()` genuinely parks
//! until work arrives or the queue shuts down.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Condvar, Mutex};

struct Inner<K> {
    queue: VecDeque<K>,
    dirty: HashSet<K>,
    processing: HashSet<K>,
    shutting_down: bool,
}

pub struct WorkQueue<K> {
    inner: Mutex<Inner<K>>,
    condvar: Condvar,
}

impl<K: Eq + Hash + Clone> WorkQueue<K> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                shutting_down: false,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Idempotent enqueue. If `item` is currently being processed, it is
    /// marked dirty but not re-appended to `queue` (see `done`'s
    /// re-enqueue step). If `item` is already dirty-but-not-processing,
    /// this is a no-op: it's already queued.
    pub fn add(&self, item: K) {
        let mut inner = self.inner.lock().expect("workqueue lock poisoned");
        if inner.shutting_down {
            return;
        }
        if inner.dirty.contains(&item) {
            return;
        }
        inner.dirty.insert(item.clone());
        if inner.processing.contains(&item) {
            // Will be re-queued by `done` once the in-flight reconcile finishes.
            return;
        }
        inner.queue.push_back(item);
        self.condvar.notify_one();
    }

    /// Blocks until an item is available or the queue is shut down.
    /// Returns `None` exactly once shutdown has been signaled and the
    /// queue has drained.
    pub fn get(&self) -> Option<K> {
        let mut inner = self.inner.lock().expect("workqueue lock poisoned");
        loop {
            if let Some(item) = inner.queue.pop_front() {
                inner.dirty.remove(&item);
                inner.processing.insert(item.clone());
                return Some(item);
            }
            if inner.shutting_down {
                return None;
            }
            inner = self.condvar.wait(inner).expect("workqueue lock poisoned");
        }
    }

    /// Async-friendly wrapper over the blocking `get`, for workers driven
    /// from a Tokio runtime. `self` must outlive the spawned blocking task,
    /// hence the `Arc` bound at the call site (see `manager::Manager`).
    pub async fn get_async(self: &std::sync::Arc<Self>) -> Option<K>
    where
        K: Send + 'static,
    {
        let this = std::sync::Arc::clone(self);
        tokio::task::spawn_blocking(move || this.get())
            .await
            .expect("workqueue get_async task panicked")
    }

    /// Removes `item` from `processing`. If it was marked dirty while
    /// being processed, re-appends it to `queue`.
    pub fn done(&self, item: &K) {
        let mut inner = self.inner.lock().expect("workqueue lock poisoned");
        inner.processing.remove(item);
        if inner.dirty.contains(item) {
            inner.queue.push_back(item.clone());
            self.condvar.notify_one();
        }
    }

    /// `Done(x); Add(x)` as a single atomic step, used on reconcile error.
    pub fn requeue(&self, item: K) {
        let mut inner = self.inner.lock().expect("workqueue lock poisoned");
        if inner.shutting_down {
            inner.processing.remove(&item);
            return;
        }
        inner.processing.remove(&item);
        if !inner.dirty.contains(&item) {
            inner.dirty.insert(item.clone());
        }
        if !inner.processing.contains(&item) {
            inner.queue.push_back(item);
            self.condvar.notify_one();
        }
    }

    /// Wakes all waiters; subsequent `get` returns `None`. Subsequent
    /// `add`/`requeue` become no-ops.
    pub fn shut_down(&self) {
        let mut inner = self.inner.lock().expect("workqueue lock poisoned");
        inner.shutting_down = true;
        self.condvar.notify_all();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.lock().expect("workqueue lock poisoned").shutting_down
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("workqueue lock poisoned").queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Clone> Default for WorkQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn add_get_done_single_invocation() {
        let q: WorkQueue<String> = WorkQueue::new();
        q.add("x".to_string());
        q.add("x".to_string());
        let item = q.get().unwrap();
        assert_eq!(item, "x");
        assert!(q.is_empty());
        q.done(&item);
        assert!(q.is_empty());
    }

    #[test]
    fn add_during_processing_requeues_after_done() {
        let q: WorkQueue<String> = WorkQueue::new();
        q.add("x".to_string());
        let item = q.get().unwrap();
        // Simulate another Add while "x" is in-flight.
        q.add("x".to_string());
        assert!(q.is_empty(), "dirty-while-processing must not appear in queue");
        q.done(&item);
        assert_eq!(q.len(), 1, "done() must re-queue the dirty item");
        let item2 = q.get().unwrap();
        assert_eq!(item2, "x");
        q.done(&item2);
        assert!(q.is_empty());
    }

    #[test]
    fn shutdown_wakes_waiters_and_disables_add() {
        let q = Arc::new(WorkQueue::<String>::new());
        let q2 = Arc::clone(&q);
        let handle = thread::spawn(move || q2.get());
        thread::sleep(Duration::from_millis(20));
        q.shut_down();
        let result = handle.join().unwrap();
        assert!(result.is_none());

        q.add("ignored".to_string());
        assert!(q.is_empty());
        assert!(q.get().is_none());
    }

    #[test]
    fn requeue_is_atomic_done_then_add() {
        let q: WorkQueue<String> = WorkQueue::new();
        q.add("x".to_string());
        let item = q.get().unwrap();
        q.requeue(item);
        assert_eq!(q.len(), 1);
        let item2 = q.get().unwrap();
        assert_eq!(item2, "x");
    }

    proptest::proptest! {
        // Any sequence of Add("x") calls followed by exactly one Get/Done
        // cycle invokes the handler exactly once; a further Add during
        // processing yields exactly one more Get.
        #[test]
        fn dedup_holds_for_any_add_count_before_and_during_processing(
            adds_before in 1usize..20,
            adds_during in 0usize..20,
        ) {
            let q: WorkQueue<String> = WorkQueue::new();
            for _ in 0..adds_before {
                q.add("x".to_string());
            }
            let item = q.get().expect("an item must be available");
            for _ in 0..adds_during {
                q.add("x".to_string());
            }
            let expected_requeues = if adds_during > 0 { 1 } else { 0 };
            prop_assert!(q.is_empty(), "dirty-while-processing must never appear in queue");
            q.done(&item);
            prop_assert_eq!(q.len(), expected_requeues);
            if expected_requeues == 1 {
                let item2 = q.get().expect("re-queued item must be available");
                prop_assert_eq!(item2, "x");
                q.done(&item2);
            }
            prop_assert!(q.is_empty());
        }
    }
}
