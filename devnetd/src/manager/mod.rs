//! Owns one `WorkQueue` per resource kind and a pool of workers that pull
//! keys off them and dispatch to the registered `Controller`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::error::ReconcileResult;
use crate::workqueue::WorkQueue;

/// The resource kinds the Manager dispatches work for. `Health` is its own
/// kind, keyed by devnet name, even though the HealthController also
/// writes into the Node store directly — the one permitted cross-controller
/// coupling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Devnet,
    Node,
    Upgrade,
    Transaction,
    Health,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Devnet,
        ResourceKind::Node,
        ResourceKind::Upgrade,
        ResourceKind::Transaction,
        ResourceKind::Health,
    ];

    fn label(self) -> &'static str {
        match self {
            ResourceKind::Devnet => "devnets",
            ResourceKind::Node => "nodes",
            ResourceKind::Upgrade => "upgrades",
            ResourceKind::Transaction => "transactions",
            ResourceKind::Health => "health",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Implemented once per resource kind. `reconcile` is a single pass over
/// one resource key: read current state, perform the transition implied by
/// its phase, write it back.
#[async_trait]
pub trait Controller: Send + Sync {
    async fn reconcile(&self, key: &str) -> ReconcileResult<()>;
}

pub struct Manager {
    queues: HashMap<ResourceKind, Arc<WorkQueue<String>>>,
    controllers: HashMap<ResourceKind, Arc<dyn Controller>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Manager {
    /// Builds one queue per resource kind, independent of `Manager`
    /// construction itself. Callers that need a queue handle before the
    /// controllers exist (`HealthController` needs the Node queue for its
    /// cross-controller enqueue) build these first and hand the same map
    /// to `Manager::new`.
    pub fn new_queues() -> HashMap<ResourceKind, Arc<WorkQueue<String>>> {
        ResourceKind::ALL.into_iter().map(|kind| (kind, Arc::new(WorkQueue::new()))).collect()
    }

    pub fn new(
        queues: HashMap<ResourceKind, Arc<WorkQueue<String>>>,
        controllers: HashMap<ResourceKind, Arc<dyn Controller>>,
    ) -> Self {
        Self { queues, controllers, workers: Mutex::new(Vec::new()) }
    }

    pub fn queue(&self, kind: ResourceKind) -> Arc<WorkQueue<String>> {
        self.queues
            .get(&kind)
            .cloned()
            .expect("every ResourceKind has a queue by construction")
    }

    /// Pushes `key` onto `kind`'s queue. Unknown kinds can't occur since
    /// `ResourceKind` is a closed enum.
    pub fn enqueue(&self, kind: ResourceKind, key: impl Into<String>) {
        self.queue(kind).add(key.into());
    }

    /// The sole permitted cross-controller coupling: HealthController
    /// enqueues directly onto the Node queue after writing to the Node
    /// store.
    pub fn enqueue_node(&self, key: impl Into<String>) {
        self.enqueue(ResourceKind::Node, key);
    }

    /// Spawns `workers_per_controller` long-lived workers for every kind
    /// that has a registered controller. Each worker loops: blocking
    /// dequeue, reconcile, `Done` on success or `Requeue` on error.
    pub fn start(self: &Arc<Self>, workers_per_controller: usize) {
        let mut handles = self.workers.lock().expect("manager lock poisoned");
        for (kind, controller) in &self.controllers {
            let queue = self.queue(*kind);
            for _ in 0..workers_per_controller {
                let queue = queue.clone();
                let controller = controller.clone();
                let kind = *kind;
                handles.push(tokio::spawn(async move {
                    loop {
                        let Some(key) = queue.get_async().await else {
                            break;
                        };
                        match controller.reconcile(&key).await {
                            Ok(()) => queue.done(&key),
                            Err(err) => {
                                tracing::warn!(%kind, %key, error = %err, "reconcile failed, requeueing");
                                queue.requeue(key);
                            }
                        }
                    }
                }));
            }
        }
    }

    /// Shuts down every queue and blocks until all workers have exited.
    pub async fn stop(&self) {
        for queue in self.queues.values() {
            queue.shut_down();
        }
        let handles = {
            let mut guard = self.workers.lock().expect("manager lock poisoned");
            std::mem::take(&mut *guard)
        };
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Like `stop`, but returns `false` instead of hanging forever if some
    /// worker doesn't exit within `d` (e.g. it's blocked in a
    /// non-cancellable external call).
    pub async fn stop_with_timeout(&self, d: Duration) -> bool {
        for queue in self.queues.values() {
            queue.shut_down();
        }
        let handles = {
            let mut guard = self.workers.lock().expect("manager lock poisoned");
            std::mem::take(&mut *guard)
        };
        tokio::time::timeout(d, async {
            for handle in handles {
                let _ = handle.await;
            }
        })
        .await
        .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingController {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Controller for CountingController {
        async fn reconcile(&self, _key: &str) -> ReconcileResult<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn worker_drains_queue_and_stops_cleanly() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut controllers: HashMap<ResourceKind, Arc<dyn Controller>> = HashMap::new();
        controllers.insert(ResourceKind::Devnet, Arc::new(CountingController { count: count.clone() }));

        let manager = Arc::new(Manager::new(Manager::new_queues(), controllers));
        manager.enqueue(ResourceKind::Devnet, "default/dev1");
        manager.enqueue(ResourceKind::Devnet, "default/dev2");
        manager.start(1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        let clean = manager.stop_with_timeout(Duration::from_secs(1)).await;
        assert!(clean);
    }

    #[tokio::test]
    async fn enqueue_node_targets_the_node_queue() {
        let manager = Arc::new(Manager::new(Manager::new_queues(), HashMap::new()));
        manager.enqueue_node("default/dev1/0");
        assert_eq!(manager.queue(ResourceKind::Node).len(), 1);
        assert_eq!(manager.queue(ResourceKind::Devnet).len(), 0);
    }
}
