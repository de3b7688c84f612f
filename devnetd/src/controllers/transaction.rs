//! `Reconcile(key)` for Transaction resources: the linear
//! Building → Signing → Submitted → Confirmed|Failed pipeline.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use storage::StorageBackend;

use crate::adapters::{TxBuildRequest, TxRuntime};
use crate::error::ReconcileResult;
use crate::manager::Controller;
use crate::model::{Transaction, TransactionPhase};
use crate::store::Store;

/// Unsigned-tx bytes keyed by tx name, so the Signing stage doesn't need
/// to rebuild what Building already produced. In-memory only: a cache
/// miss after a daemon restart triggers a full rebuild, which is
/// deterministic for every tx type this
/// crate models (no hidden nondeterministic input feeds `build_tx`).
pub struct UnsignedTxCache {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl UnsignedTxCache {
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }

    fn put(&self, name: &str, bytes: Vec<u8>) {
        self.entries.lock().expect("unsigned-tx cache lock poisoned").insert(name.to_string(), bytes);
    }

    fn take(&self, name: &str) -> Option<Vec<u8>> {
        self.entries.lock().expect("unsigned-tx cache lock poisoned").remove(name)
    }
}

impl Default for UnsignedTxCache {
    fn default() -> Self {
        Self::new()
    }
}

pub struct TxController<B: StorageBackend> {
    store: Arc<Store<B>>,
    runtime: Arc<dyn TxRuntime>,
    cache: Arc<UnsignedTxCache>,
}

impl<B: StorageBackend> TxController<B> {
    pub fn new(store: Arc<Store<B>>, runtime: Arc<dyn TxRuntime>, cache: Arc<UnsignedTxCache>) -> Self {
        Self { store, runtime, cache }
    }

    async fn handle_pending(&self, mut tx: Transaction) -> ReconcileResult<Transaction> {
        tx.status.phase = TransactionPhase::Building;
        Ok(self.store.update_transaction(tx).await?)
    }

    async fn handle_building(&self, mut tx: Transaction) -> ReconcileResult<Transaction> {
        let req = TxBuildRequest {
            tx_type: tx.spec.tx_type.clone(),
            signer: tx.spec.signer.clone(),
            payload: tx.spec.payload.clone(),
        };
        match self.runtime.build_tx(&tx.spec.devnet_ref, &req).await {
            Ok(unsigned) => {
                self.cache.put(&tx.metadata.name, unsigned);
                tx.status.phase = TransactionPhase::Signing;
            }
            Err(err) => {
                tx.status.error = Some(err.to_string());
                tx.status.message = err.to_string();
                tx.status.phase = TransactionPhase::Failed;
            }
        }
        Ok(self.store.update_transaction(tx).await?)
    }

    async fn handle_signing(&self, mut tx: Transaction) -> ReconcileResult<Transaction> {
        let unsigned = match self.cache.take(&tx.metadata.name) {
            Some(bytes) => bytes,
            None => {
                // Cache miss (e.g. daemon restart mid-transaction): rebuild
                // deterministically rather than fail.
                let req = TxBuildRequest {
                    tx_type: tx.spec.tx_type.clone(),
                    signer: tx.spec.signer.clone(),
                    payload: tx.spec.payload.clone(),
                };
                match self.runtime.build_tx(&tx.spec.devnet_ref, &req).await {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        tx.status.error = Some(err.to_string());
                        tx.status.message = err.to_string();
                        tx.status.phase = TransactionPhase::Failed;
                        return Ok(self.store.update_transaction(tx).await?);
                    }
                }
            }
        };

        let result = async {
            let key = self.runtime.get_signing_key(&tx.spec.devnet_ref, &tx.spec.signer).await?;
            let signed = self.runtime.sign_tx(&unsigned, &key).await?;
            self.runtime.broadcast_tx(&signed).await
        }
        .await;

        match result {
            Ok(tx_hash) => {
                tx.status.tx_hash = Some(tx_hash);
                tx.status.phase = TransactionPhase::Submitted;
            }
            Err(err) => {
                tx.status.error = Some(err.to_string());
                tx.status.message = err.to_string();
                tx.status.phase = TransactionPhase::Failed;
            }
        }
        Ok(self.store.update_transaction(tx).await?)
    }

    async fn handle_submitted(&self, mut tx: Transaction) -> ReconcileResult<Transaction> {
        let Some(tx_hash) = tx.status.tx_hash.clone() else {
            tx.status.error = Some("no tx hash recorded while submitted".to_string());
            tx.status.phase = TransactionPhase::Failed;
            return Ok(self.store.update_transaction(tx).await?);
        };

        match self.runtime.wait_for_confirmation(&tx.spec.devnet_ref, &tx_hash).await {
            Ok(receipt) if receipt.success => {
                tx.status.height = receipt.height;
                tx.status.gas_used = receipt.gas_used;
                tx.status.message = "transaction confirmed".to_string();
                tx.status.phase = TransactionPhase::Confirmed;
            }
            Ok(receipt) => {
                tx.status.error = Some(receipt.log);
                tx.status.phase = TransactionPhase::Failed;
            }
            Err(err) => {
                tx.status.error = Some(err.to_string());
                tx.status.message = err.to_string();
                tx.status.phase = TransactionPhase::Failed;
            }
        }
        Ok(self.store.update_transaction(tx).await?)
    }
}

#[async_trait]
impl<B: StorageBackend + Send + Sync + 'static> Controller for TxController<B> {
    async fn reconcile(&self, key: &str) -> ReconcileResult<()> {
        let Some(tx) = self.store.get_transaction(key).await? else {
            return Ok(());
        };

        if tx.status.phase.is_terminal() {
            return Ok(());
        }

        match tx.status.phase {
            TransactionPhase::Pending => {
                self.handle_pending(tx).await?;
            }
            TransactionPhase::Building => {
                self.handle_building(tx).await?;
            }
            TransactionPhase::Signing => {
                self.handle_signing(tx).await?;
            }
            TransactionPhase::Submitted => {
                self.handle_submitted(tx).await?;
            }
            TransactionPhase::Confirmed | TransactionPhase::Failed => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::NoopTxRuntime;
    use crate::model::TransactionSpec;
    use crate::store::new_transaction;
    use storage::MemoryStorage;

    fn make_controller() -> (TxController<MemoryStorage>, Arc<Store<MemoryStorage>>) {
        let store = Arc::new(Store::new(MemoryStorage::new()));
        let controller = TxController::new(store.clone(), Arc::new(NoopTxRuntime), Arc::new(UnsignedTxCache::new()));
        (controller, store)
    }

    #[tokio::test]
    async fn pipeline_walks_to_confirmed_in_four_reconciles() {
        let (controller, store) = make_controller();
        let spec = TransactionSpec {
            devnet_ref: "dev1".to_string(),
            tx_type: "bank-send".to_string(),
            signer: "alice".to_string(),
            payload: vec![1, 2, 3],
        };
        store.create_transaction(new_transaction("tx1", spec)).await.unwrap();

        for phase in [TransactionPhase::Building, TransactionPhase::Signing, TransactionPhase::Submitted, TransactionPhase::Confirmed] {
            controller.reconcile("tx1").await.unwrap();
            let tx = store.get_transaction("tx1").await.unwrap().unwrap();
            assert_eq!(tx.status.phase, phase);
        }

        let confirmed = store.get_transaction("tx1").await.unwrap().unwrap();
        assert!(confirmed.status.tx_hash.is_some());
        assert_eq!(confirmed.status.gas_used, 21_000);
    }

    #[tokio::test]
    async fn signing_survives_cache_miss_by_rebuilding() {
        let (controller, store) = make_controller();
        let spec = TransactionSpec {
            devnet_ref: "dev1".to_string(),
            tx_type: "bank-send".to_string(),
            signer: "alice".to_string(),
            payload: vec![9, 9, 9],
        };
        let mut tx = new_transaction("tx2", spec);
        tx.status.phase = TransactionPhase::Signing;
        store.create_transaction(tx).await.unwrap();

        // Cache never populated (simulating a restart between Building and Signing).
        controller.reconcile("tx2").await.unwrap();
        let tx = store.get_transaction("tx2").await.unwrap().unwrap();
        assert_eq!(tx.status.phase, TransactionPhase::Submitted);
    }

    #[tokio::test]
    async fn reconcile_on_missing_transaction_is_a_noop() {
        let (controller, _store) = make_controller();
        controller.reconcile("does-not-exist").await.unwrap();
    }
}
