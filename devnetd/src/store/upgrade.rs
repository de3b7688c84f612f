use storage::StorageBackend;

use crate::model::{Metadata, Upgrade};

use super::keys;
use super::watch::{WatchEvent, WatchHandler};
use super::{Store, StoreError};

impl<B: StorageBackend> Store<B> {
    pub async fn create_upgrade(&self, upgrade: Upgrade) -> Result<Upgrade, StoreError> {
        let key = keys::upgrade_key(&upgrade.metadata.namespace, &upgrade.metadata.name);
        let created = self.create_record(&key, upgrade).await?;
        self.upgrade_watchers.notify(WatchEvent::Added(created.clone()));
        Ok(created)
    }

    pub async fn get_upgrade(&self, namespace: &str, name: &str) -> Result<Option<Upgrade>, StoreError> {
        self.get_record(&keys::upgrade_key(namespace, name)).await
    }

    pub async fn update_upgrade(&self, upgrade: Upgrade) -> Result<Upgrade, StoreError> {
        let key = keys::upgrade_key(&upgrade.metadata.namespace, &upgrade.metadata.name);
        let updated = self.update_record(&key, upgrade).await?;
        self.upgrade_watchers.notify(WatchEvent::Modified(updated.clone()));
        Ok(updated)
    }

    pub async fn delete_upgrade(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let key = keys::upgrade_key(namespace, name);
        if let Some(deleted) = self.delete_record::<Upgrade>(&key).await? {
            self.upgrade_watchers.notify(WatchEvent::Deleted(deleted));
        }
        Ok(())
    }

    pub async fn list_upgrades(&self, namespace: &str) -> Result<Vec<Upgrade>, StoreError> {
        self.list_records(&keys::upgrade_namespace_prefix(namespace)).await
    }

    /// Cascade helper: deletes every upgrade referencing `devnet_name`.
    pub async fn delete_upgrades_by_devnet(&self, namespace: &str, devnet_name: &str) -> Result<(), StoreError> {
        let matching: Vec<Upgrade> = self
            .list_upgrades(namespace)
            .await?
            .into_iter()
            .filter(|u| u.spec.devnet_ref == devnet_name)
            .collect();
        for upgrade in matching {
            self.delete_upgrade(namespace, &upgrade.metadata.name).await?;
        }
        Ok(())
    }

    pub fn watch_upgrades(&self, handler: WatchHandler<Upgrade>) {
        self.upgrade_watchers.register(handler);
    }
}

pub fn new_upgrade(
    namespace: impl Into<String>,
    name: impl Into<String>,
    spec: crate::model::UpgradeSpec,
) -> Upgrade {
    Upgrade::new(Metadata::new(namespace, name), spec)
}
