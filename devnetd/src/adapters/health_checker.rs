use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::Node;

#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub block_height: u64,
    pub peer_count: u32,
    pub catching_up: bool,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

#[async_trait]
pub trait HealthChecker: Send + Sync {
    async fn check_health(&self, node: &Node) -> anyhow::Result<HealthCheckResult>;
}

/// Always reports healthy at the node's last recorded height. Useful as a
/// default wiring and as the baseline the stuck-chain tests override.
pub struct NoopHealthChecker;

#[async_trait]
impl HealthChecker for NoopHealthChecker {
    async fn check_health(&self, node: &Node) -> anyhow::Result<HealthCheckResult> {
        Ok(HealthCheckResult {
            healthy: true,
            block_height: node.status.block_height,
            peer_count: node.status.peer_count,
            catching_up: false,
            error: None,
            checked_at: Utc::now(),
        })
    }
}
