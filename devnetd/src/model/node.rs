use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::metadata::Metadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Validator,
    Fullnode,
}

/// What the operator wants this node to be doing. Empty string is treated
/// the same as `Running` throughout the controller: `Desired ∈ {"", Running}`
/// both mean "keep this node up".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Desired {
    Running,
    Stopped,
}

impl Default for Desired {
    fn default() -> Self {
        Desired::Running
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub devnet_ref: String,
    pub index: u32,
    pub role: Role,
    #[serde(default)]
    pub desired: Desired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodePhase {
    Pending,
    Starting,
    Running,
    Stopping,
    Stopped,
    Crashed,
}

impl Default for NodePhase {
    fn default() -> Self {
        NodePhase::Pending
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeStatus {
    pub phase: NodePhase,
    pub pid: Option<u32>,
    pub block_height: u64,
    pub last_block_time: Option<DateTime<Utc>>,
    pub peer_count: u32,
    pub catching_up: bool,
    pub consecutive_failures: u32,
    pub restart_count: u32,
    pub next_restart_time: Option<DateTime<Utc>>,
    pub last_health_check: Option<DateTime<Utc>>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub metadata: Metadata,
    pub spec: NodeSpec,
    pub status: NodeStatus,
}

impl Node {
    pub fn new(metadata: Metadata, spec: NodeSpec) -> Self {
        Self {
            metadata,
            spec,
            status: NodeStatus::default(),
        }
    }

    /// `Desired ∈ {"", Running}` treats the absence of an explicit choice
    /// the same as `Running`.
    pub fn wants_running(&self) -> bool {
        matches!(self.spec.desired, Desired::Running)
    }
}
