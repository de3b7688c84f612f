use storage::StorageBackend;

use crate::model::{Devnet, Metadata};

use super::keys;
use super::watch::{WatchEvent, WatchHandler};
use super::{Store, StoreError};

impl<B: StorageBackend> Store<B> {
    pub async fn create_devnet(&self, devnet: Devnet) -> Result<Devnet, StoreError> {
        let key = keys::devnet_key(&devnet.metadata.namespace, &devnet.metadata.name);
        let created = self.create_record(&key, devnet).await?;
        self.devnet_watchers.notify(WatchEvent::Added(created.clone()));
        Ok(created)
    }

    pub async fn get_devnet(&self, namespace: &str, name: &str) -> Result<Option<Devnet>, StoreError> {
        self.get_record(&keys::devnet_key(namespace, name)).await
    }

    pub async fn update_devnet(&self, devnet: Devnet) -> Result<Devnet, StoreError> {
        let key = keys::devnet_key(&devnet.metadata.namespace, &devnet.metadata.name);
        let updated = self.update_record(&key, devnet).await?;
        self.devnet_watchers.notify(WatchEvent::Modified(updated.clone()));
        Ok(updated)
    }

    pub async fn list_devnets(&self, namespace: &str) -> Result<Vec<Devnet>, StoreError> {
        self.list_records(&keys::devnet_namespace_prefix(namespace)).await
    }

    /// Lists the distinct namespaces that currently have at least one devnet.
    pub async fn list_namespaces(&self) -> Result<Vec<String>, StoreError> {
        let all: Vec<Devnet> = self.list_records(keys::DEVNETS_BUCKET).await?;
        let mut namespaces: Vec<String> = all.into_iter().map(|d| d.metadata.namespace).collect();
        namespaces.sort();
        namespaces.dedup();
        Ok(namespaces)
    }

    /// Deletes the devnet and cascades to every Node, Upgrade, and
    /// Transaction referencing it, via a two-phase collect-then-delete.
    pub async fn delete_devnet(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let key = keys::devnet_key(namespace, name);
        if let Some(deleted) = self.delete_record::<Devnet>(&key).await? {
            self.devnet_watchers.notify(WatchEvent::Deleted(deleted));
        }

        self.delete_nodes_by_devnet(namespace, name).await?;
        self.delete_upgrades_by_devnet(namespace, name).await?;
        self.delete_transactions_by_devnet(namespace, name).await?;
        Ok(())
    }

    pub fn watch_devnets(&self, handler: WatchHandler<Devnet>) {
        self.devnet_watchers.register(handler);
    }
}

/// Convenience constructor for the required spec fields.
pub fn new_devnet(
    namespace: impl Into<String>,
    name: impl Into<String>,
    spec: crate::model::DevnetSpec,
) -> Devnet {
    Devnet::new(Metadata::new(namespace, name), spec)
}
