use serde::{Deserialize, Serialize};

use super::metadata::Metadata;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryRef {
    #[serde(rename = "type")]
    pub type_: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeSpec {
    pub devnet_ref: String,
    pub upgrade_name: String,
    /// 0 means "auto-compute".
    #[serde(default)]
    pub target_height: u64,
    pub new_binary: BinaryRef,
    #[serde(default)]
    pub auto_vote: bool,
    #[serde(default)]
    pub with_export: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpgradePhase {
    Pending,
    Proposing,
    Voting,
    Waiting,
    Switching,
    Verifying,
    Completed,
    Failed,
}

impl Default for UpgradePhase {
    fn default() -> Self {
        UpgradePhase::Pending
    }
}

impl UpgradePhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, UpgradePhase::Completed | UpgradePhase::Failed)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpgradeStatus {
    pub phase: UpgradePhase,
    pub proposal_id: Option<String>,
    pub votes_received: u32,
    pub votes_required: u32,
    pub current_height: u64,
    pub pre_export_path: Option<String>,
    pub post_export_path: Option<String>,
    pub error: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upgrade {
    pub metadata: Metadata,
    pub spec: UpgradeSpec,
    pub status: UpgradeStatus,
}

impl Upgrade {
    pub fn new(metadata: Metadata, spec: UpgradeSpec) -> Self {
        Self {
            metadata,
            spec,
            status: UpgradeStatus::default(),
        }
    }
}
