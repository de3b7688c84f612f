use storage::StorageBackend;

use crate::model::{Metadata, Node};

use super::keys;
use super::watch::{WatchEvent, WatchHandler};
use super::{Store, StoreError};

impl<B: StorageBackend> Store<B> {
    pub async fn create_node(&self, node: Node) -> Result<Node, StoreError> {
        let key = keys::node_key(&node.metadata.namespace, &node.spec.devnet_ref, node.spec.index);
        let created = self.create_record(&key, node).await?;
        self.node_watchers.notify(WatchEvent::Added(created.clone()));
        Ok(created)
    }

    pub async fn get_node(&self, namespace: &str, devnet_name: &str, index: u32) -> Result<Option<Node>, StoreError> {
        self.get_record(&keys::node_key(namespace, devnet_name, index)).await
    }

    pub async fn update_node(&self, node: Node) -> Result<Node, StoreError> {
        let key = keys::node_key(&node.metadata.namespace, &node.spec.devnet_ref, node.spec.index);
        let updated = self.update_record(&key, node).await?;
        self.node_watchers.notify(WatchEvent::Modified(updated.clone()));
        Ok(updated)
    }

    pub async fn delete_node(&self, namespace: &str, devnet_name: &str, index: u32) -> Result<(), StoreError> {
        let key = keys::node_key(namespace, devnet_name, index);
        if let Some(deleted) = self.delete_record::<Node>(&key).await? {
            self.node_watchers.notify(WatchEvent::Deleted(deleted));
        }
        Ok(())
    }

    pub async fn list_nodes(&self, namespace: &str, devnet_name: &str) -> Result<Vec<Node>, StoreError> {
        self.list_records(&keys::node_devnet_prefix(namespace, devnet_name)).await
    }

    /// Cascade helper: deletes every node referencing `devnet_name`, firing
    /// one Deleted notification per node.
    pub async fn delete_nodes_by_devnet(&self, namespace: &str, devnet_name: &str) -> Result<(), StoreError> {
        let nodes = self.list_nodes(namespace, devnet_name).await?;
        for node in nodes {
            self.delete_node(namespace, devnet_name, node.spec.index).await?;
        }
        Ok(())
    }

    pub fn watch_nodes(&self, handler: WatchHandler<Node>) {
        self.node_watchers.register(handler);
    }
}

pub fn new_node(
    namespace: impl Into<String>,
    devnet_ref: impl Into<String>,
    index: u32,
    role: crate::model::Role,
) -> Node {
    let devnet_ref = devnet_ref.into();
    let namespace = namespace.into();
    let name = format!("{devnet_ref}-{index}");
    Node::new(
        Metadata::new(namespace, name),
        crate::model::NodeSpec {
            devnet_ref,
            index,
            role,
            desired: crate::model::Desired::Running,
        },
    )
}
