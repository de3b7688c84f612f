//! `Reconcile(key)` for Upgrade resources, plus the height-math and
//! chain-halt/resume monitor helpers it depends on.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use storage::StorageBackend;

use crate::adapters::UpgradeRuntime;
use crate::config::UpgradeConfig;
use crate::error::ReconcileResult;
use crate::manager::Controller;
use crate::model::Upgrade;
use crate::model::UpgradePhase;
use crate::store::Store;

use super::key::parse_ns_name;

const DEFAULT_VOTING_TARGET_BLOCKS: u64 = 100;

/// Minimum number of extra blocks tacked onto a computed target height.
pub const MIN_HEIGHT_BUFFER: u64 = 10;

/// `blocksForVoting = ceil(votingPeriod / avgBlockTime) + 1`, clamped
/// `avgBlockTime` to `[100ms, 30s]` (default 2s on error).
pub fn blocks_for_voting(voting_period: Duration, avg_block_time: Duration) -> u64 {
    let clamped = avg_block_time.clamp(Duration::from_millis(100), Duration::from_secs(30));
    let voting_ms = voting_period.as_millis().max(1) as u64;
    let block_ms = clamped.as_millis().max(1) as u64;
    voting_ms.div_ceil(block_ms) + 1
}

/// `targetHeight = currentHeight + blocksForVoting + heightBuffer`, with
/// `heightBuffer` floored at `MIN_HEIGHT_BUFFER`.
pub fn compute_target_height(current_height: u64, voting_period: Duration, avg_block_time: Duration, height_buffer: u64) -> u64 {
    let buffer = height_buffer.max(MIN_HEIGHT_BUFFER);
    current_height + blocks_for_voting(voting_period, avg_block_time) + buffer
}

/// Polls `get_current_height` every `poll_interval` to detect a chain
/// halt at or after `target_height`: the chain is considered halted once
/// `current_height >= target_height` AND either the RPC stops responding
/// or the height holds flat for `halt_threshold` consecutive polls.
/// RPC errors observed *before* reaching `target_height` do not count
/// toward halt detection.
pub async fn wait_for_chain_halt(
    runtime: &dyn UpgradeRuntime,
    devnet_ref: &str,
    target_height: u64,
    poll_interval: Duration,
    halt_threshold: u32,
) -> anyhow::Result<u64> {
    let mut last_height = 0u64;
    let mut reached_target = false;
    let mut flat_polls = 0u32;

    loop {
        match runtime.get_current_height(devnet_ref).await {
            Ok(height) => {
                if height >= target_height {
                    reached_target = true;
                }
                if reached_target {
                    if height == last_height {
                        flat_polls += 1;
                    } else {
                        flat_polls = 0;
                    }
                    if flat_polls >= halt_threshold {
                        return Ok(height);
                    }
                }
                last_height = height;
            }
            Err(err) => {
                if reached_target {
                    return Ok(last_height);
                }
                return Err(err);
            }
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Polls until three consecutive strictly increasing heights are observed
/// or `timeout` elapses.
pub async fn verify_chain_resumed(
    runtime: &dyn UpgradeRuntime,
    devnet_ref: &str,
    poll_interval: Duration,
    timeout: Duration,
) -> anyhow::Result<bool> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut last: Option<u64> = None;
    let mut increasing_streak = 0u32;

    while tokio::time::Instant::now() < deadline {
        let height = runtime.get_current_height(devnet_ref).await?;
        match last {
            Some(prev) if height > prev => increasing_streak += 1,
            _ => increasing_streak = if last.is_some() { 0 } else { increasing_streak },
        }
        if increasing_streak >= 3 {
            return Ok(true);
        }
        last = Some(height);
        tokio::time::sleep(poll_interval).await;
    }
    Ok(false)
}

pub struct UpgradeController<B: StorageBackend> {
    store: Arc<Store<B>>,
    runtime: Arc<dyn UpgradeRuntime>,
    config: UpgradeConfig,
}

impl<B: StorageBackend> UpgradeController<B> {
    pub fn new(store: Arc<Store<B>>, runtime: Arc<dyn UpgradeRuntime>, config: UpgradeConfig) -> Self {
        Self { store, runtime, config }
    }

    fn set_failed(upgrade: &mut Upgrade, msg: impl Into<String>) {
        let msg = msg.into();
        upgrade.status.error = Some(msg.clone());
        upgrade.status.message = msg;
        upgrade.status.phase = UpgradePhase::Failed;
    }

    async fn handle_pending(&self, mut upgrade: Upgrade) -> ReconcileResult<Upgrade> {
        if upgrade.spec.target_height == 0 {
            match self.runtime.get_current_height(&upgrade.spec.devnet_ref).await {
                Ok(current) => {
                    upgrade.status.current_height = current;
                    upgrade.spec.target_height = current + DEFAULT_VOTING_TARGET_BLOCKS;
                }
                Err(err) => {
                    Self::set_failed(&mut upgrade, format!("failed to read current height: {err}"));
                    return Ok(self.store.update_upgrade(upgrade).await?);
                }
            }
        }

        match self.runtime.get_validator_count(&upgrade.spec.devnet_ref).await {
            Ok(count) => upgrade.status.votes_required = count,
            Err(err) => {
                Self::set_failed(&mut upgrade, format!("failed to read validator count: {err}"));
                return Ok(self.store.update_upgrade(upgrade).await?);
            }
        }

        if upgrade.spec.with_export {
            match self.runtime.export_state(&upgrade.spec.devnet_ref, "pre-upgrade").await {
                Ok(path) => upgrade.status.pre_export_path = Some(path),
                Err(err) => tracing::warn!(error = %err, upgrade = %upgrade.metadata.name, "pre-upgrade export failed, continuing"),
            }
        }

        upgrade.status.phase = UpgradePhase::Proposing;
        Ok(self.store.update_upgrade(upgrade).await?)
    }

    async fn handle_proposing(&self, mut upgrade: Upgrade) -> ReconcileResult<Upgrade> {
        match self
            .runtime
            .submit_upgrade_proposal(&upgrade.spec.devnet_ref, &upgrade.spec.upgrade_name, upgrade.spec.target_height)
            .await
        {
            Ok(proposal_id) => {
                upgrade.status.proposal_id = Some(proposal_id);
                upgrade.status.phase = UpgradePhase::Voting;
            }
            Err(err) => Self::set_failed(&mut upgrade, format!("proposal submission failed: {err}")),
        }
        Ok(self.store.update_upgrade(upgrade).await?)
    }

    async fn handle_voting(&self, mut upgrade: Upgrade) -> ReconcileResult<Upgrade> {
        let Some(proposal_id) = upgrade.status.proposal_id.clone() else {
            Self::set_failed(&mut upgrade, "no proposal id recorded while voting");
            return Ok(self.store.update_upgrade(upgrade).await?);
        };

        if upgrade.spec.auto_vote {
            for validator_index in 0..upgrade.status.votes_required {
                if let Err(err) = self.runtime.vote_on_proposal(&proposal_id, validator_index).await {
                    tracing::warn!(%validator_index, error = %err, "vote failed, continuing");
                }
            }
        }

        let votes_before = upgrade.status.votes_received;
        match self.runtime.get_proposal_status(&proposal_id).await {
            Ok(status) => {
                upgrade.status.votes_received = status.votes_received;
                if status.passed {
                    upgrade.status.phase = UpgradePhase::Waiting;
                }
            }
            Err(err) => tracing::warn!(error = %err, "proposal status poll failed, remaining in Voting"),
        }
        if upgrade.status.phase == UpgradePhase::Voting && upgrade.status.votes_received == votes_before {
            // Still voting with no new votes observed: nothing moved, skip the write.
            return Ok(upgrade);
        }
        Ok(self.store.update_upgrade(upgrade).await?)
    }

    async fn handle_waiting(&self, mut upgrade: Upgrade) -> ReconcileResult<Upgrade> {
        let height_before = upgrade.status.current_height;
        match self.runtime.get_current_height(&upgrade.spec.devnet_ref).await {
            Ok(height) => {
                upgrade.status.current_height = height;
                if height >= upgrade.spec.target_height {
                    upgrade.status.phase = UpgradePhase::Switching;
                }
            }
            Err(err) => tracing::warn!(error = %err, "height poll failed, remaining in Waiting"),
        }
        if upgrade.status.phase == UpgradePhase::Waiting && upgrade.status.current_height == height_before {
            // Still waiting at the same height: nothing moved, skip the write.
            return Ok(upgrade);
        }
        Ok(self.store.update_upgrade(upgrade).await?)
    }

    async fn node_count(&self, upgrade: &Upgrade) -> ReconcileResult<u32> {
        let devnet = self.store.get_devnet(&upgrade.metadata.namespace, &upgrade.spec.devnet_ref).await?;
        Ok(match devnet {
            Some(devnet) if devnet.status.nodes > 0 => devnet.status.nodes,
            _ => upgrade.status.votes_required.max(1),
        })
    }

    async fn handle_switching(&self, mut upgrade: Upgrade) -> ReconcileResult<Upgrade> {
        let node_count = self.node_count(&upgrade).await?;
        for node_index in 0..node_count {
            if let Err(err) = self.runtime.switch_node_binary(node_index, &upgrade.spec.new_binary).await {
                Self::set_failed(&mut upgrade, format!("binary switch failed on node {node_index}: {err}"));
                return Ok(self.store.update_upgrade(upgrade).await?);
            }
        }
        upgrade.status.phase = UpgradePhase::Verifying;
        Ok(self.store.update_upgrade(upgrade).await?)
    }

    async fn handle_verifying(&self, mut upgrade: Upgrade) -> ReconcileResult<Upgrade> {
        let node_count = self.node_count(&upgrade).await?;
        let mut all_verified = true;
        for node_index in 0..node_count {
            match self.runtime.verify_node_version(node_index, &upgrade.spec.new_binary).await {
                Ok(true) => {}
                Ok(false) | Err(_) => {
                    all_verified = false;
                    break;
                }
            }
        }

        if all_verified {
            if upgrade.spec.with_export {
                match self.runtime.export_state(&upgrade.spec.devnet_ref, "post-upgrade").await {
                    Ok(path) => upgrade.status.post_export_path = Some(path),
                    Err(err) => tracing::warn!(error = %err, "post-upgrade export failed, continuing"),
                }
            }
            upgrade.status.message = "upgrade completed".to_string();
            upgrade.status.phase = UpgradePhase::Completed;
        }
        Ok(self.store.update_upgrade(upgrade).await?)
    }
}

#[async_trait]
impl<B: StorageBackend + Send + Sync + 'static> Controller for UpgradeController<B> {
    async fn reconcile(&self, key: &str) -> ReconcileResult<()> {
        let (namespace, name) = parse_ns_name(key);
        let Some(upgrade) = self.store.get_upgrade(&namespace, &name).await? else {
            return Ok(());
        };

        if upgrade.status.phase.is_terminal() {
            return Ok(());
        }

        match upgrade.status.phase {
            UpgradePhase::Pending => {
                self.handle_pending(upgrade).await?;
            }
            UpgradePhase::Proposing => {
                self.handle_proposing(upgrade).await?;
            }
            UpgradePhase::Voting => {
                self.handle_voting(upgrade).await?;
            }
            UpgradePhase::Waiting => {
                self.handle_waiting(upgrade).await?;
            }
            UpgradePhase::Switching => {
                self.handle_switching(upgrade).await?;
            }
            UpgradePhase::Verifying => {
                self.handle_verifying(upgrade).await?;
            }
            UpgradePhase::Completed | UpgradePhase::Failed => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::NoopUpgradeRuntime;
    use crate::model::{BinaryRef, DevnetSpec, Mode, UpgradeSpec};
    use crate::store::{new_devnet, new_upgrade};
    use storage::MemoryStorage;

    fn make_controller() -> (UpgradeController<MemoryStorage>, Arc<Store<MemoryStorage>>) {
        let store = Arc::new(Store::new(MemoryStorage::new()));
        let controller = UpgradeController::new(store.clone(), Arc::new(NoopUpgradeRuntime), UpgradeConfig::default());
        (controller, store)
    }

    #[tokio::test]
    async fn s6_pipeline_walks_to_completed_in_six_reconciles_then_noops() {
        let (controller, store) = make_controller();
        let devnet_spec =
            DevnetSpec { plugin: "stable".to_string(), validators: 2, full_nodes: 1, mode: Mode::Docker, plugin_config: Default::default() };
        let mut devnet = store.create_devnet(new_devnet("default", "dev1", devnet_spec)).await.unwrap();
        devnet.status.nodes = 3;
        store.update_devnet(devnet).await.unwrap();

        let spec = UpgradeSpec {
            devnet_ref: "dev1".to_string(),
            upgrade_name: "v2-upgrade".to_string(),
            target_height: 1000,
            new_binary: BinaryRef { type_: "release".to_string(), version: "v2.0.0".to_string() },
            auto_vote: true,
            with_export: false,
        };
        store.create_upgrade(new_upgrade("default", "up1", spec)).await.unwrap();

        let expected = [
            UpgradePhase::Proposing,
            UpgradePhase::Voting,
            UpgradePhase::Waiting,
            UpgradePhase::Switching,
            UpgradePhase::Verifying,
            UpgradePhase::Completed,
        ];
        for phase in expected {
            controller.reconcile("default/up1").await.unwrap();
            let upgrade = store.get_upgrade("default", "up1").await.unwrap().unwrap();
            assert_eq!(upgrade.status.phase, phase);
        }

        // Seventh reconcile on a terminal phase must be a no-op.
        let before = store.get_upgrade("default", "up1").await.unwrap().unwrap();
        controller.reconcile("default/up1").await.unwrap();
        let after = store.get_upgrade("default", "up1").await.unwrap().unwrap();
        assert_eq!(before.metadata.generation, after.metadata.generation);
    }

    #[tokio::test]
    async fn reconcile_on_missing_upgrade_is_a_noop() {
        let (controller, _store) = make_controller();
        controller.reconcile("default/does-not-exist").await.unwrap();
    }

    struct RecordingRuntime {
        switched: std::sync::Mutex<Vec<u32>>,
        verified: std::sync::Mutex<Vec<u32>>,
    }

    impl RecordingRuntime {
        fn new() -> Self {
            Self { switched: std::sync::Mutex::new(Vec::new()), verified: std::sync::Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl UpgradeRuntime for RecordingRuntime {
        async fn submit_upgrade_proposal(&self, devnet_ref: &str, upgrade_name: &str, _target_height: u64) -> anyhow::Result<String> {
            Ok(format!("{devnet_ref}-{upgrade_name}"))
        }
        async fn get_proposal_status(&self, _proposal_id: &str) -> anyhow::Result<crate::adapters::ProposalStatus> {
            Ok(crate::adapters::ProposalStatus { passed: true, votes_received: 1 })
        }
        async fn vote_on_proposal(&self, _proposal_id: &str, _validator_index: u32) -> anyhow::Result<()> {
            Ok(())
        }
        async fn get_current_height(&self, _devnet_ref: &str) -> anyhow::Result<u64> {
            Ok(1000)
        }
        async fn switch_node_binary(&self, node_index: u32, _binary: &BinaryRef) -> anyhow::Result<()> {
            self.switched.lock().unwrap().push(node_index);
            Ok(())
        }
        async fn verify_node_version(&self, node_index: u32, _expected: &BinaryRef) -> anyhow::Result<bool> {
            self.verified.lock().unwrap().push(node_index);
            Ok(true)
        }
        async fn export_state(&self, devnet_ref: &str, label: &str) -> anyhow::Result<String> {
            Ok(format!("{devnet_ref}-{label}"))
        }
        async fn get_validator_count(&self, _devnet_ref: &str) -> anyhow::Result<u32> {
            Ok(2)
        }
    }

    #[tokio::test]
    async fn switching_and_verifying_cover_full_nodes_not_just_validators() {
        let store = Arc::new(Store::new(MemoryStorage::new()));
        let runtime = Arc::new(RecordingRuntime::new());
        let controller = UpgradeController::new(store.clone(), runtime.clone(), UpgradeConfig::default());

        let devnet_spec =
            DevnetSpec { plugin: "stable".to_string(), validators: 2, full_nodes: 1, mode: Mode::Docker, plugin_config: Default::default() };
        let mut devnet = store.create_devnet(new_devnet("default", "dev1", devnet_spec)).await.unwrap();
        devnet.status.nodes = 3;
        store.update_devnet(devnet).await.unwrap();

        let mut upgrade = new_upgrade(
            "default",
            "up1",
            UpgradeSpec {
                devnet_ref: "dev1".to_string(),
                upgrade_name: "v2".to_string(),
                target_height: 900,
                new_binary: BinaryRef { type_: "release".to_string(), version: "v2.0.0".to_string() },
                auto_vote: false,
                with_export: false,
            },
        );
        upgrade.status.phase = UpgradePhase::Switching;
        upgrade.status.votes_required = 2;
        store.create_upgrade(upgrade).await.unwrap();

        controller.reconcile("default/up1").await.unwrap();
        let upgrade = store.get_upgrade("default", "up1").await.unwrap().unwrap();
        assert_eq!(upgrade.status.phase, UpgradePhase::Verifying);
        assert_eq!(*runtime.switched.lock().unwrap(), vec![0, 1, 2]);

        controller.reconcile("default/up1").await.unwrap();
        let upgrade = store.get_upgrade("default", "up1").await.unwrap().unwrap();
        assert_eq!(upgrade.status.phase, UpgradePhase::Completed);
        assert_eq!(*runtime.verified.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn height_math_clamps_block_time_and_floors_buffer() {
        let fast = blocks_for_voting(Duration::from_secs(600), Duration::from_millis(10));
        let slow = blocks_for_voting(Duration::from_secs(600), Duration::from_secs(60));
        // Both clamp into [100ms, 30s], so fast and slow settle to the same answer.
        assert_eq!(fast, slow);

        let target = compute_target_height(500, Duration::from_secs(600), Duration::from_secs(2), 0);
        assert!(target >= 500 + MIN_HEIGHT_BUFFER);
    }

    struct FailingSwitchRuntime;

    #[async_trait]
    impl UpgradeRuntime for FailingSwitchRuntime {
        async fn submit_upgrade_proposal(&self, devnet_ref: &str, upgrade_name: &str, _target_height: u64) -> anyhow::Result<String> {
            Ok(format!("{devnet_ref}-{upgrade_name}"))
        }
        async fn get_proposal_status(&self, _proposal_id: &str) -> anyhow::Result<crate::adapters::ProposalStatus> {
            Ok(crate::adapters::ProposalStatus { passed: true, votes_received: 1 })
        }
        async fn vote_on_proposal(&self, _proposal_id: &str, _validator_index: u32) -> anyhow::Result<()> {
            Ok(())
        }
        async fn get_current_height(&self, _devnet_ref: &str) -> anyhow::Result<u64> {
            Ok(1000)
        }
        async fn switch_node_binary(&self, _node_index: u32, _binary: &BinaryRef) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("binary not found"))
        }
        async fn verify_node_version(&self, _node_index: u32, _expected: &BinaryRef) -> anyhow::Result<bool> {
            Ok(true)
        }
        async fn export_state(&self, devnet_ref: &str, label: &str) -> anyhow::Result<String> {
            Ok(format!("{devnet_ref}-{label}"))
        }
        async fn get_validator_count(&self, _devnet_ref: &str) -> anyhow::Result<u32> {
            Ok(1)
        }
    }

    #[tokio::test]
    async fn switching_failure_transitions_to_failed_and_is_terminal() {
        let store = Arc::new(Store::new(MemoryStorage::new()));
        let controller = UpgradeController::new(store.clone(), Arc::new(FailingSwitchRuntime), UpgradeConfig::default());
        let mut upgrade = new_upgrade(
            "default",
            "up1",
            UpgradeSpec {
                devnet_ref: "dev1".to_string(),
                upgrade_name: "v2".to_string(),
                target_height: 900,
                new_binary: BinaryRef { type_: "release".to_string(), version: "v2.0.0".to_string() },
                auto_vote: false,
                with_export: false,
            },
        );
        upgrade.status.phase = UpgradePhase::Switching;
        upgrade.status.votes_required = 1;
        store.create_upgrade(upgrade).await.unwrap();

        controller.reconcile("default/up1").await.unwrap();
        let upgrade = store.get_upgrade("default", "up1").await.unwrap().unwrap();
        assert_eq!(upgrade.status.phase, UpgradePhase::Failed);
        assert!(upgrade.status.error.is_some());

        let before = upgrade.metadata.generation;
        controller.reconcile("default/up1").await.unwrap();
        let after = store.get_upgrade("default", "up1").await.unwrap().unwrap();
        assert_eq!(after.metadata.generation, before);
    }
}
