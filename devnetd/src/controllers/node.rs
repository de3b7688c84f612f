//! `Reconcile(key)` for Node resources.

use std::sync::Arc;

use async_trait::async_trait;
use storage::StorageBackend;

use crate::adapters::{NodeRuntime, StartOptions};
use crate::error::ReconcileResult;
use crate::manager::Controller;
use crate::model::{Node, NodePhase};
use crate::store::Store;

use super::key::parse_devnet_node;

pub struct NodeController<B: StorageBackend> {
    store: Arc<Store<B>>,
    runtime: Option<Arc<dyn NodeRuntime>>,
}

impl<B: StorageBackend> NodeController<B> {
    pub fn new(store: Arc<Store<B>>, runtime: Option<Arc<dyn NodeRuntime>>) -> Self {
        Self { store, runtime }
    }

    fn node_id(node: &Node) -> String {
        format!("{}/{}/{}", node.metadata.namespace, node.spec.devnet_ref, node.spec.index)
    }

    async fn handle_pending(&self, mut node: Node) -> ReconcileResult<Node> {
        if node.wants_running() {
            node.status.phase = NodePhase::Starting;
            let node = self.store.update_node(node).await?;
            self.handle_starting(node).await
        } else {
            node.status.phase = NodePhase::Stopped;
            node.status.message = "Node stopped".to_string();
            let node = self.store.update_node(node).await?;
            Ok(node)
        }
    }

    async fn handle_starting(&self, mut node: Node) -> ReconcileResult<Node> {
        let result = match &self.runtime {
            Some(runtime) => runtime.start_node(&node, &StartOptions::default()).await,
            None => Ok(()),
        };
        match result {
            Ok(()) => {
                node.status.phase = NodePhase::Running;
                node.status.message = "node started".to_string();
            }
            Err(err) => {
                node.status.phase = NodePhase::Crashed;
                node.status.message = err.to_string();
            }
        }
        let node = self.store.update_node(node).await?;
        Ok(node)
    }

    async fn handle_running(&self, mut node: Node) -> ReconcileResult<Node> {
        if !node.wants_running() {
            node.status.phase = NodePhase::Stopping;
            let node = self.store.update_node(node).await?;
            return Ok(node);
        }

        let running = match &self.runtime {
            Some(runtime) => {
                let node_id = Self::node_id(&node);
                match runtime.get_node_status(&node_id).await {
                    Ok(status) => status.running,
                    Err(_) => false,
                }
            }
            None => true,
        };

        if !running {
            node.status.phase = NodePhase::Crashed;
            node.status.message = "runtime reports node is not running".to_string();
            let node = self.store.update_node(node).await?;
            return Ok(node);
        }

        Ok(node)
    }

    async fn handle_stopping(&self, mut node: Node) -> ReconcileResult<Node> {
        if let Some(runtime) = &self.runtime {
            let node_id = Self::node_id(&node);
            let _ = runtime.stop_node(&node_id, true).await;
        }
        node.status.pid = None;
        node.status.phase = NodePhase::Stopped;
        node.status.message = "Node stopped".to_string();
        let node = self.store.update_node(node).await?;
        Ok(node)
    }

    async fn handle_stopped(&self, mut node: Node) -> ReconcileResult<Node> {
        if node.wants_running() {
            node.status.phase = NodePhase::Pending;
            node.status.restart_count += 1;
            let node = self.store.update_node(node).await?;
            return Ok(node);
        }
        Ok(node)
    }

    async fn handle_crashed(&self, mut node: Node) -> ReconcileResult<Node> {
        node.status.phase = NodePhase::Stopped;
        let node = self.store.update_node(node).await?;
        Ok(node)
    }
}

#[async_trait]
impl<B: StorageBackend + Send + Sync + 'static> Controller for NodeController<B> {
    async fn reconcile(&self, key: &str) -> ReconcileResult<()> {
        let Some((namespace, devnet_name, index)) = parse_devnet_node(key) else {
            return Ok(());
        };
        let Some(node) = self.store.get_node(&namespace, &devnet_name, index).await? else {
            return Ok(());
        };

        match node.status.phase {
            NodePhase::Pending => {
                self.handle_pending(node).await?;
            }
            NodePhase::Starting => {
                self.handle_starting(node).await?;
            }
            NodePhase::Running => {
                self.handle_running(node).await?;
            }
            NodePhase::Stopping => {
                self.handle_stopping(node).await?;
            }
            NodePhase::Stopped => {
                self.handle_stopped(node).await?;
            }
            NodePhase::Crashed => {
                self.handle_crashed(node).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Desired, Role};
    use crate::store::new_node;
    use storage::MemoryStorage;

    fn make_controller() -> (NodeController<MemoryStorage>, Arc<Store<MemoryStorage>>) {
        let store = Arc::new(Store::new(MemoryStorage::new()));
        let controller = NodeController::new(store.clone(), None);
        (controller, store)
    }

    #[tokio::test]
    async fn s3_node_lifecycle_start_then_stop() {
        let (controller, store) = make_controller();
        store.create_node(new_node("default", "dev1", 0, Role::Validator)).await.unwrap();

        controller.reconcile("default/dev1/0").await.unwrap();
        let node = store.get_node("default", "dev1", 0).await.unwrap().unwrap();
        assert_eq!(node.status.phase, NodePhase::Running);

        let mut node = node;
        node.spec.desired = Desired::Stopped;
        store.update_node(node).await.unwrap();

        controller.reconcile("default/dev1/0").await.unwrap();
        let node = store.get_node("default", "dev1", 0).await.unwrap().unwrap();
        assert_eq!(node.status.phase, NodePhase::Stopping);

        controller.reconcile("default/dev1/0").await.unwrap();
        let node = store.get_node("default", "dev1", 0).await.unwrap().unwrap();
        assert_eq!(node.status.phase, NodePhase::Stopped);
        assert_eq!(node.status.message, "Node stopped");
    }

    #[tokio::test]
    async fn stopped_with_desired_running_restarts_with_incremented_count() {
        let (controller, store) = make_controller();
        let mut node = new_node("default", "dev1", 0, Role::Validator);
        node.status.phase = NodePhase::Stopped;
        node.status.restart_count = 2;
        store.create_node(node).await.unwrap();

        controller.reconcile("default/dev1/0").await.unwrap();
        let node = store.get_node("default", "dev1", 0).await.unwrap().unwrap();
        assert_eq!(node.status.phase, NodePhase::Pending);
        assert_eq!(node.status.restart_count, 3);
    }
}
