use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct TxBuildRequest {
    pub tx_type: String,
    pub signer: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub height: u64,
    pub gas_used: u64,
    pub success: bool,
    pub log: String,
}

/// Transaction build/sign/broadcast/confirm surface consumed by
/// `TxController`.
#[async_trait]
pub trait TxRuntime: Send + Sync {
    async fn build_tx(&self, devnet_ref: &str, req: &TxBuildRequest) -> anyhow::Result<Vec<u8>>;
    async fn get_signing_key(&self, devnet_ref: &str, signer: &str) -> anyhow::Result<Vec<u8>>;
    async fn sign_tx(&self, unsigned: &[u8], key: &[u8]) -> anyhow::Result<Vec<u8>>;
    async fn broadcast_tx(&self, signed: &[u8]) -> anyhow::Result<String>;
    async fn wait_for_confirmation(&self, devnet_ref: &str, tx_hash: &str) -> anyhow::Result<TxReceipt>;
}

/// Wired in when no chain client is configured. Building, signing, and
/// broadcasting all trivially succeed and confirmation reports success at
/// height 1, so `TxController` reaches `Confirmed` with no external chain.
pub struct NoopTxRuntime;

#[async_trait]
impl TxRuntime for NoopTxRuntime {
    async fn build_tx(&self, _devnet_ref: &str, req: &TxBuildRequest) -> anyhow::Result<Vec<u8>> {
        Ok(req.payload.clone())
    }

    async fn get_signing_key(&self, _devnet_ref: &str, _signer: &str) -> anyhow::Result<Vec<u8>> {
        Ok(Vec::new())
    }

    async fn sign_tx(&self, unsigned: &[u8], _key: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(unsigned.to_vec())
    }

    async fn broadcast_tx(&self, signed: &[u8]) -> anyhow::Result<String> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        signed.hash(&mut hasher);
        Ok(format!("0x{:016x}", hasher.finish()))
    }

    async fn wait_for_confirmation(&self, _devnet_ref: &str, tx_hash: &str) -> anyhow::Result<TxReceipt> {
        Ok(TxReceipt {
            tx_hash: tx_hash.to_string(),
            height: 1,
            gas_used: 21_000,
            success: true,
            log: String::new(),
        })
    }
}
