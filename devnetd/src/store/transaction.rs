use storage::StorageBackend;

use crate::model::{Metadata, Transaction};

use super::keys;
use super::watch::{WatchEvent, WatchHandler};
use super::{Store, StoreError};

impl<B: StorageBackend> Store<B> {
    pub async fn create_transaction(&self, transaction: Transaction) -> Result<Transaction, StoreError> {
        let key = keys::transaction_key(&transaction.metadata.name);
        let created = self.create_record(&key, transaction).await?;
        self.transaction_watchers.notify(WatchEvent::Added(created.clone()));
        Ok(created)
    }

    pub async fn get_transaction(&self, name: &str) -> Result<Option<Transaction>, StoreError> {
        self.get_record(&keys::transaction_key(name)).await
    }

    pub async fn update_transaction(&self, transaction: Transaction) -> Result<Transaction, StoreError> {
        let key = keys::transaction_key(&transaction.metadata.name);
        let updated = self.update_record(&key, transaction).await?;
        self.transaction_watchers.notify(WatchEvent::Modified(updated.clone()));
        Ok(updated)
    }

    pub async fn delete_transaction(&self, name: &str) -> Result<(), StoreError> {
        let key = keys::transaction_key(name);
        if let Some(deleted) = self.delete_record::<Transaction>(&key).await? {
            self.transaction_watchers.notify(WatchEvent::Deleted(deleted));
        }
        Ok(())
    }

    pub async fn list_transactions(&self, devnet_name: &str) -> Result<Vec<Transaction>, StoreError> {
        let all: Vec<Transaction> = self.list_records(&keys::transactions_prefix()).await?;
        Ok(all.into_iter().filter(|t| t.spec.devnet_ref == devnet_name).collect())
    }

    /// Cascade helper: deletes every transaction referencing `devnet_name`.
    /// Transactions are keyed globally by name, not by devnet, so this is
    /// a full-bucket scan filtered by `spec.devnet_ref`.
    pub async fn delete_transactions_by_devnet(&self, _namespace: &str, devnet_name: &str) -> Result<(), StoreError> {
        let matching = self.list_transactions(devnet_name).await?;
        for transaction in matching {
            self.delete_transaction(&transaction.metadata.name).await?;
        }
        Ok(())
    }

    pub fn watch_transactions(&self, handler: WatchHandler<Transaction>) {
        self.transaction_watchers.register(handler);
    }
}

pub fn new_transaction(name: impl Into<String>, spec: crate::model::TransactionSpec) -> Transaction {
    Transaction::new(Metadata::new("default", name), spec)
}
