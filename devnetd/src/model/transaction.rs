use serde::{Deserialize, Serialize};

use super::metadata::Metadata;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSpec {
    pub devnet_ref: String,
    pub tx_type: String,
    pub signer: String,
    #[serde(with = "serde_bytes_base64")]
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionPhase {
    Pending,
    Building,
    Signing,
    Submitted,
    Confirmed,
    Failed,
}

impl Default for TransactionPhase {
    fn default() -> Self {
        TransactionPhase::Pending
    }
}

impl TransactionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionPhase::Confirmed | TransactionPhase::Failed)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionStatus {
    pub phase: TransactionPhase,
    pub tx_hash: Option<String>,
    pub height: u64,
    pub gas_used: u64,
    pub error: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub metadata: Metadata,
    pub spec: TransactionSpec,
    pub status: TransactionStatus,
}

impl Transaction {
    pub fn new(metadata: Metadata, spec: TransactionSpec) -> Self {
        Self {
            metadata,
            spec,
            status: TransactionStatus::default(),
        }
    }
}

/// Opaque payload bytes serialize as base64 so the JSON record stays
/// human-inspectable without losing binary fidelity.
mod serde_bytes_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(bytes).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}
