//! `Reconcile(devnetName)` for the sweeping HealthController, plus its
//! background ticker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use storage::StorageBackend;

use crate::adapters::HealthChecker;
use crate::config::CrashRecoveryPolicy;
use crate::error::ReconcileResult;
use crate::manager::Controller;
use crate::model::{set_condition, Condition, ConditionStatus, Devnet, DevnetPhase, Node, NodePhase};
use crate::store::Store;
use crate::workqueue::WorkQueue;

use super::key::{self, parse_ns_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeHealth {
    Healthy,
    Unhealthy,
    Stuck,
}

pub struct HealthController<B: StorageBackend> {
    store: Arc<Store<B>>,
    checker: Option<Arc<dyn HealthChecker>>,
    crash_recovery: CrashRecoveryPolicy,
    stuck_threshold: Duration,
    /// The Node work queue, injected directly rather than through the
    /// whole `Manager`, so this controller can be constructed before the
    /// `Manager` exists.
    node_queue: Arc<WorkQueue<String>>,
}

impl<B: StorageBackend> HealthController<B> {
    pub fn new(
        store: Arc<Store<B>>,
        checker: Option<Arc<dyn HealthChecker>>,
        crash_recovery: CrashRecoveryPolicy,
        stuck_threshold: Duration,
        node_queue: Arc<WorkQueue<String>>,
    ) -> Self {
        Self { store, checker, crash_recovery, stuck_threshold, node_queue }
    }

    async fn handle_crashed_node(&self, mut node: Node) -> ReconcileResult<Node> {
        if !self.crash_recovery.enabled {
            return Ok(node);
        }
        if self.crash_recovery.max_restarts > 0 && node.status.restart_count >= self.crash_recovery.max_restarts {
            return Ok(node);
        }
        if let Some(next) = node.status.next_restart_time {
            if next > Utc::now() {
                return Ok(node);
            }
        }

        let n = node.status.restart_count as i32;
        let backoff_ms = (self.crash_recovery.backoff_initial_ms as f64 * self.crash_recovery.backoff_multiplier.powi(n))
            .min(self.crash_recovery.backoff_max_ms as f64);
        node.status.next_restart_time = Some(Utc::now() + chrono::Duration::milliseconds(backoff_ms as i64));
        node.status.phase = NodePhase::Pending;
        node.status.restart_count += 1;

        let node = self.store.update_node(node).await?;
        self.node_queue.add(key::node_key(&node.metadata.namespace, &node.spec.devnet_ref, node.spec.index));
        Ok(node)
    }

    /// Evaluates one node's health, persists any status changes, and
    /// returns its classification for the devnet-wide aggregate.
    async fn check_node(&self, mut node: Node) -> ReconcileResult<NodeHealth> {
        if !node.wants_running() {
            return Ok(NodeHealth::Healthy);
        }

        if node.status.phase != NodePhase::Running {
            if node.status.phase == NodePhase::Crashed {
                self.handle_crashed_node(node).await?;
            }
            return Ok(NodeHealth::Unhealthy);
        }

        let check = match &self.checker {
            Some(checker) => checker.check_health(&node).await.map_err(anyhow::Error::from)?,
            None => crate::adapters::HealthCheckResult {
                healthy: true,
                block_height: node.status.block_height,
                peer_count: node.status.peer_count,
                catching_up: false,
                error: None,
                checked_at: Utc::now(),
            },
        };

        let now = Utc::now();
        let stuck = node.status.last_block_time.is_some_and(|last| {
            !check.catching_up && (now - last).num_seconds() as u64 > self.stuck_threshold.as_secs()
        });

        if check.block_height > node.status.block_height {
            node.status.block_height = check.block_height;
            node.status.last_block_time = Some(now);
        }
        node.status.peer_count = check.peer_count;
        node.status.catching_up = check.catching_up;
        node.status.last_health_check = Some(now);

        let health = if stuck {
            NodeHealth::Stuck
        } else if check.healthy {
            NodeHealth::Healthy
        } else {
            NodeHealth::Unhealthy
        };

        node.status.consecutive_failures = if health == NodeHealth::Healthy { 0 } else { node.status.consecutive_failures + 1 };

        self.store.update_node(node).await?;
        Ok(health)
    }

    fn update_devnet_aggregate(mut devnet: Devnet, healthy: u32, unhealthy: u32, stuck: u32, total: u32) -> Devnet {
        let ready_condition = if total == 0 {
            Condition::new("Ready", ConditionStatus::Unknown, "NoNodes", "devnet has no nodes")
        } else if healthy == total {
            Condition::new("Ready", ConditionStatus::True, "AllNodesReady", "all nodes are healthy")
        } else {
            Condition::new("Ready", ConditionStatus::False, "SomeNodesNotReady", "not all nodes are healthy")
        };
        set_condition(&mut devnet.status.conditions, ready_condition);

        let healthy_condition = if unhealthy == 0 && total > 0 {
            Condition::new("Healthy", ConditionStatus::True, "AllNodesHealthy", "no unhealthy nodes")
        } else {
            Condition::new("Healthy", ConditionStatus::False, "NodesUnhealthy", "some nodes are unhealthy")
        };
        set_condition(&mut devnet.status.conditions, healthy_condition);

        let degraded_condition = if stuck > 0 {
            Condition::new("Degraded", ConditionStatus::True, "ChainStuck", "one or more nodes have a stuck chain")
        } else if unhealthy > 0 {
            Condition::new("Degraded", ConditionStatus::True, "NodesUnhealthy", "one or more nodes are unhealthy")
        } else {
            Condition::new("Degraded", ConditionStatus::False, "Healthy", "all nodes healthy")
        };
        set_condition(&mut devnet.status.conditions, degraded_condition);

        let fully_healthy = total > 0 && unhealthy == 0 && stuck == 0;
        if matches!(devnet.status.phase, DevnetPhase::Running | DevnetPhase::Degraded) {
            devnet.status.phase = if fully_healthy { DevnetPhase::Running } else { DevnetPhase::Degraded };
        }
        devnet.status.last_health_check = Some(Utc::now());
        devnet
    }
}

#[async_trait]
impl<B: StorageBackend + Send + Sync + 'static> Controller for HealthController<B> {
    async fn reconcile(&self, key: &str) -> ReconcileResult<()> {
        let (namespace, name) = parse_ns_name(key);
        let Some(devnet) = self.store.get_devnet(&namespace, &name).await? else {
            return Ok(());
        };

        let nodes = self.store.list_nodes(&namespace, &name).await?;
        let total = nodes.len() as u32;
        let (mut healthy, mut unhealthy, mut stuck) = (0u32, 0u32, 0u32);

        for node in nodes {
            match self.check_node(node).await? {
                NodeHealth::Healthy => healthy += 1,
                NodeHealth::Unhealthy => unhealthy += 1,
                NodeHealth::Stuck => stuck += 1,
            }
        }

        let devnet = Self::update_devnet_aggregate(devnet, healthy, unhealthy, stuck, total);
        self.store.update_devnet(devnet).await?;
        Ok(())
    }
}

/// Ticks every `interval` and enqueues every Running/Degraded devnet's key
/// onto `health_queue`. Runs for the lifetime of the daemon; spawned once
/// from `main`.
pub async fn run_health_ticker<B: StorageBackend>(store: Arc<Store<B>>, health_queue: Arc<WorkQueue<String>>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let Ok(namespaces) = store.list_namespaces().await else {
            continue;
        };
        for namespace in namespaces {
            let Ok(devnets) = store.list_devnets(&namespace).await else {
                continue;
            };
            for devnet in devnets {
                if matches!(devnet.status.phase, DevnetPhase::Running | DevnetPhase::Degraded) {
                    health_queue.add(format!("{}/{}", devnet.metadata.namespace, devnet.metadata.name));
                }
            }
        }
    }
}
