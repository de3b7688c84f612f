use async_trait::async_trait;

use crate::model::BinaryRef;

#[derive(Debug, Clone, Copy)]
pub struct ProposalStatus {
    pub passed: bool,
    pub votes_received: u32,
}

/// Governance and chain-control surface consumed by `UpgradeController`:
/// propose, vote, poll height, switch binaries, verify versions, export
/// state.
#[async_trait]
pub trait UpgradeRuntime: Send + Sync {
    async fn submit_upgrade_proposal(
        &self,
        devnet_ref: &str,
        upgrade_name: &str,
        target_height: u64,
    ) -> anyhow::Result<String>;

    async fn get_proposal_status(&self, proposal_id: &str) -> anyhow::Result<ProposalStatus>;

    async fn vote_on_proposal(&self, proposal_id: &str, validator_index: u32) -> anyhow::Result<()>;

    async fn get_current_height(&self, devnet_ref: &str) -> anyhow::Result<u64>;

    async fn switch_node_binary(&self, node_index: u32, binary: &BinaryRef) -> anyhow::Result<()>;

    async fn verify_node_version(&self, node_index: u32, expected: &BinaryRef) -> anyhow::Result<bool>;

    async fn export_state(&self, devnet_ref: &str, label: &str) -> anyhow::Result<String>;

    async fn get_validator_count(&self, devnet_ref: &str) -> anyhow::Result<u32>;
}

/// Wired in when no governance/RPC client is configured. Every stage
/// succeeds immediately and height polling reports the requested target
/// as already reached, so `UpgradeController` walks its whole pipeline in
/// six reconciles with no external chain.
pub struct NoopUpgradeRuntime;

#[async_trait]
impl UpgradeRuntime for NoopUpgradeRuntime {
    async fn submit_upgrade_proposal(
        &self,
        devnet_ref: &str,
        upgrade_name: &str,
        _target_height: u64,
    ) -> anyhow::Result<String> {
        Ok(format!("{devnet_ref}-{upgrade_name}-proposal"))
    }

    async fn get_proposal_status(&self, _proposal_id: &str) -> anyhow::Result<ProposalStatus> {
        Ok(ProposalStatus { passed: true, votes_received: 0 })
    }

    async fn vote_on_proposal(&self, _proposal_id: &str, _validator_index: u32) -> anyhow::Result<()> {
        Ok(())
    }

    async fn get_current_height(&self, _devnet_ref: &str) -> anyhow::Result<u64> {
        Ok(u64::MAX / 2)
    }

    async fn switch_node_binary(&self, _node_index: u32, _binary: &BinaryRef) -> anyhow::Result<()> {
        Ok(())
    }

    async fn verify_node_version(&self, _node_index: u32, _expected: &BinaryRef) -> anyhow::Result<bool> {
        Ok(true)
    }

    async fn export_state(&self, devnet_ref: &str, label: &str) -> anyhow::Result<String> {
        Ok(format!("/tmp/devnetd-exports/{devnet_ref}-{label}.tar.gz"))
    }

    async fn get_validator_count(&self, _devnet_ref: &str) -> anyhow::Result<u32> {
        Ok(1)
    }
}
