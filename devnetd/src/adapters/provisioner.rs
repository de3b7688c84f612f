use async_trait::async_trait;

use crate::model::Devnet;

#[derive(Debug, Clone, Copy, Default)]
pub struct ProvisionStatus {
    pub nodes: u32,
    pub ready_nodes: u32,
    pub current_height: u64,
}

/// Drives the container/process backend that actually stands up a devnet's
/// nodes. Contract-only: "given a devnet spec, make the infrastructure
/// match it".
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision(&self, devnet: &Devnet) -> anyhow::Result<()>;
    async fn deprovision(&self, devnet: &Devnet) -> anyhow::Result<()>;
    async fn start(&self, devnet: &Devnet) -> anyhow::Result<()>;
    async fn stop(&self, devnet: &Devnet) -> anyhow::Result<()>;
    async fn get_status(&self, devnet: &Devnet) -> anyhow::Result<ProvisionStatus>;
}

/// Trivially-successful stand-in used when the daemon is run without a real
/// provisioning backend wired in. Reports every node as ready immediately,
/// which is what lets DevnetController reach `Running` in a single
/// reconcile.
pub struct NoopProvisioner;

#[async_trait]
impl Provisioner for NoopProvisioner {
    async fn provision(&self, _devnet: &Devnet) -> anyhow::Result<()> {
        Ok(())
    }

    async fn deprovision(&self, _devnet: &Devnet) -> anyhow::Result<()> {
        Ok(())
    }

    async fn start(&self, _devnet: &Devnet) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self, _devnet: &Devnet) -> anyhow::Result<()> {
        Ok(())
    }

    async fn get_status(&self, devnet: &Devnet) -> anyhow::Result<ProvisionStatus> {
        let total = devnet.spec.total_nodes();
        Ok(ProvisionStatus {
            nodes: total,
            ready_nodes: total,
            current_height: devnet.status.current_height,
        })
    }
}
