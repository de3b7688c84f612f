//! Persistent, namespaced CRUD for the four resource kinds, with
//! optimistic concurrency, cascade deletes, and change notifications.

mod devnet;
mod error;
mod keys;
mod node;
mod transaction;
mod upgrade;
mod watch;

pub use error::StoreError;
pub use watch::{WatchEvent, WatchHandler, Watchers};

pub use devnet::new_devnet;
pub use node::new_node;
pub use transaction::new_transaction;
pub use upgrade::new_upgrade;

use std::sync::Arc;

use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use storage::StorageBackend;

use crate::model::{Devnet, Node, Resource, Transaction, Upgrade};

/// The store. Generic over the `storage::StorageBackend` the teacher crate
/// defines (`MemoryStorage` for tests, `SledStorage` for the daemon).
pub struct Store<B: StorageBackend> {
    backend: Arc<B>,
    pub(crate) devnet_watchers: Watchers<Devnet>,
    pub(crate) node_watchers: Watchers<Node>,
    pub(crate) upgrade_watchers: Watchers<Upgrade>,
    pub(crate) transaction_watchers: Watchers<Transaction>,
}

impl<B: StorageBackend> Store<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
            devnet_watchers: Watchers::new(),
            node_watchers: Watchers::new(),
            upgrade_watchers: Watchers::new(),
            transaction_watchers: Watchers::new(),
        }
    }

    pub(crate) async fn put_record<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(value)?;
        self.backend.put(key, bytes).await?;
        Ok(())
    }

    pub(crate) async fn get_record<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.backend.get(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn list_records<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>, StoreError> {
        let mut out = Vec::new();
        for key in self.backend.list_keys(prefix).await? {
            if let Some(value) = self.get_record::<T>(&key).await? {
                out.push(value);
            }
        }
        Ok(out)
    }

    /// `Create` rejects with `AlreadyExists` if the key exists; on success
    /// stamps `generation = 1`, `created_at = updated_at = now`.
    pub(crate) async fn create_record<T>(&self, key: &str, mut value: T) -> Result<T, StoreError>
    where
        T: Resource + Serialize + DeserializeOwned,
    {
        if self.backend.exists(key).await? {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        let now = Utc::now();
        value.metadata_mut().generation = 1;
        value.metadata_mut().created_at = now;
        value.metadata_mut().updated_at = now;
        self.put_record(key, &value).await?;
        Ok(value)
    }

    /// `Update` compares the caller's generation against the stored one;
    /// on match, increments the generation and refreshes `updated_at`.
    pub(crate) async fn update_record<T>(&self, key: &str, mut value: T) -> Result<T, StoreError>
    where
        T: Resource + Serialize + DeserializeOwned,
    {
        let existing = self
            .get_record::<T>(key)
            .await?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        if existing.metadata().generation != value.metadata().generation {
            return Err(StoreError::Conflict {
                key: key.to_string(),
                expected: existing.metadata().generation,
                actual: value.metadata().generation,
            });
        }

        value.metadata_mut().generation = existing.metadata().generation + 1;
        value.metadata_mut().created_at = existing.metadata().created_at;
        value.metadata_mut().updated_at = Utc::now();
        self.put_record(key, &value).await?;
        Ok(value)
    }

    /// `Delete` is generation-agnostic (last-delete wins). Returns the
    /// deleted record, if one existed, so cascades and watch notification
    /// have something to report.
    pub(crate) async fn delete_record<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let existing = self.get_record::<T>(key).await?;
        if existing.is_some() {
            self.backend.delete(key).await?;
        }
        Ok(existing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DevnetSpec, Mode, Role};
    use storage::MemoryStorage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_store() -> Store<MemoryStorage> {
        Store::new(MemoryStorage::new())
    }

    fn spec() -> DevnetSpec {
        DevnetSpec { plugin: "stable".to_string(), validators: 2, full_nodes: 0, mode: Mode::Docker, plugin_config: Default::default() }
    }

    #[tokio::test]
    async fn create_stamps_generation_one_and_rejects_duplicate() {
        let store = make_store();
        let devnet = store.create_devnet(new_devnet("default", "dev1", spec())).await.unwrap();
        assert_eq!(devnet.metadata.generation, 1);

        let err = store.create_devnet(new_devnet("default", "dev1", spec())).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    /// Testable property 1: `Update` with stale `Generation` fails with
    /// `Conflict` and leaves the stored resource unchanged.
    #[tokio::test]
    async fn update_with_stale_generation_is_a_conflict_and_leaves_resource_unchanged() {
        let store = make_store();
        let mut devnet = store.create_devnet(new_devnet("default", "dev1", spec())).await.unwrap();
        devnet.status.message = "first update".to_string();
        let devnet = store.update_devnet(devnet).await.unwrap();
        assert_eq!(devnet.metadata.generation, 2);

        // Retry with the stale (pre-update) generation.
        let mut stale = devnet.clone();
        stale.metadata.generation = 1;
        stale.status.message = "stale update".to_string();
        let err = store.update_devnet(stale).await.unwrap_err();
        assert!(err.is_conflict());

        let unchanged = store.get_devnet("default", "dev1").await.unwrap().unwrap();
        assert_eq!(unchanged.metadata.generation, 2);
        assert_eq!(unchanged.status.message, "first update");
    }

    #[tokio::test]
    async fn update_of_missing_record_is_not_found() {
        let store = make_store();
        let mut devnet = new_devnet("default", "ghost", spec());
        devnet.metadata.generation = 1;
        let err = store.update_devnet(devnet).await.unwrap_err();
        assert!(err.is_not_found());
    }

    /// Testable property 2: after deleting a devnet, every Node, Upgrade,
    /// and Transaction referencing it is also gone.
    #[tokio::test]
    async fn cascade_delete_empties_nodes_upgrades_and_transactions() {
        let store = make_store();
        store.create_devnet(new_devnet("default", "dev1", spec())).await.unwrap();
        store.create_node(new_node("default", "dev1", 0, Role::Validator)).await.unwrap();
        store.create_node(new_node("default", "dev1", 1, Role::Fullnode)).await.unwrap();
        store
            .create_upgrade(new_upgrade(
                "default",
                "up1",
                crate::model::UpgradeSpec {
                    devnet_ref: "dev1".to_string(),
                    upgrade_name: "v2".to_string(),
                    target_height: 0,
                    new_binary: crate::model::BinaryRef { type_: "release".to_string(), version: "v2".to_string() },
                    auto_vote: false,
                    with_export: false,
                },
            ))
            .await
            .unwrap();
        store
            .create_transaction(new_transaction(
                "tx1",
                crate::model::TransactionSpec {
                    devnet_ref: "dev1".to_string(),
                    tx_type: "bank-send".to_string(),
                    signer: "alice".to_string(),
                    payload: vec![],
                },
            ))
            .await
            .unwrap();

        store.delete_devnet("default", "dev1").await.unwrap();

        assert!(store.get_devnet("default", "dev1").await.unwrap().is_none());
        assert!(store.list_nodes("default", "dev1").await.unwrap().is_empty());
        assert!(store.list_upgrades("default").await.unwrap().is_empty());
        assert!(store.list_transactions("dev1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_is_generation_agnostic_last_delete_wins() {
        let store = make_store();
        store.create_devnet(new_devnet("default", "dev1", spec())).await.unwrap();
        store.delete_devnet("default", "dev1").await.unwrap();
        // A second delete of an already-absent key is not an error.
        store.delete_devnet("default", "dev1").await.unwrap();
        assert!(store.get_devnet("default", "dev1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn watch_fires_added_modified_deleted_in_commit_order() {
        let store = make_store();
        let events: Arc<std::sync::Mutex<Vec<&'static str>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = events.clone();
        store.watch_devnets(Arc::new(move |event| {
            let label = match event {
                WatchEvent::Added(_) => "added",
                WatchEvent::Modified(_) => "modified",
                WatchEvent::Deleted(_) => "deleted",
            };
            seen.lock().unwrap().push(label);
        }));

        let mut devnet = store.create_devnet(new_devnet("default", "dev1", spec())).await.unwrap();
        devnet.status.message = "updated".to_string();
        store.update_devnet(devnet).await.unwrap();
        store.delete_devnet("default", "dev1").await.unwrap();

        assert_eq!(*events.lock().unwrap(), vec!["added", "modified", "deleted"]);
    }

    #[tokio::test]
    async fn list_namespaces_returns_distinct_sorted_namespaces() {
        let store = make_store();
        store.create_devnet(new_devnet("team-b", "dev1", spec())).await.unwrap();
        store.create_devnet(new_devnet("team-a", "dev1", spec())).await.unwrap();
        store.create_devnet(new_devnet("team-a", "dev2", spec())).await.unwrap();

        let namespaces = store.list_namespaces().await.unwrap();
        assert_eq!(namespaces, vec!["team-a".to_string(), "team-b".to_string()]);
    }

    #[test]
    fn watchers_notify_does_not_deadlock_when_handler_registers_a_new_watcher() {
        // Regression guard for the "release the read lock before calling
        // out" comment on `Watchers::notify`.
        let count = Arc::new(AtomicUsize::new(0));
        let watchers: Watchers<i32> = Watchers::new();
        let register_count = count.clone();
        let watchers = Arc::new(watchers);
        let inner_watchers = watchers.clone();
        watchers.register(Arc::new(move |_| {
            register_count.fetch_add(1, Ordering::SeqCst);
            inner_watchers.register(Arc::new(|_| {}));
        }));
        watchers.notify(WatchEvent::Added(1));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
