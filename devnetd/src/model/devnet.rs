use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::condition::{Condition, Event};
use super::metadata::Metadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Docker,
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevnetSpec {
    pub plugin: String,
    pub validators: u32,
    pub full_nodes: u32,
    pub mode: Mode,
    /// Free-form plugin configuration, opaque to the controller.
    #[serde(default)]
    pub plugin_config: HashMap<String, Value>,
}

impl DevnetSpec {
    pub fn total_nodes(&self) -> u32 {
        self.validators + self.full_nodes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DevnetPhase {
    Pending,
    Provisioning,
    Running,
    Degraded,
    Stopped,
}

impl Default for DevnetPhase {
    fn default() -> Self {
        DevnetPhase::Pending
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DevnetStatus {
    pub phase: DevnetPhase,
    pub nodes: u32,
    pub ready_nodes: u32,
    pub current_height: u64,
    pub message: String,
    pub last_health_check: Option<DateTime<Utc>>,
    pub conditions: Vec<Condition>,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Devnet {
    pub metadata: Metadata,
    pub spec: DevnetSpec,
    pub status: DevnetStatus,
}

impl Devnet {
    pub fn new(metadata: Metadata, spec: DevnetSpec) -> Self {
        Self {
            metadata,
            spec,
            status: DevnetStatus::default(),
        }
    }
}
