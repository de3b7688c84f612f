use async_trait::async_trait;

use crate::model::Node;

#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub tail_lines: Option<u32>,
    pub follow: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct NodeRuntimeStatus {
    pub running: bool,
    pub pid: Option<u32>,
}

/// The process/container runtime backend: `StartNode/StopNode/GetStatus/
/// GetLogs/Exec`.
#[async_trait]
pub trait NodeRuntime: Send + Sync {
    async fn start_node(&self, node: &Node, opts: &StartOptions) -> anyhow::Result<()>;
    async fn stop_node(&self, node_id: &str, graceful: bool) -> anyhow::Result<()>;
    async fn restart_node(&self, node_id: &str) -> anyhow::Result<()>;
    async fn get_node_status(&self, node_id: &str) -> anyhow::Result<NodeRuntimeStatus>;
    async fn get_logs(&self, node_id: &str, opts: &LogOptions) -> anyhow::Result<Vec<String>>;
    async fn exec_in_node(&self, node_id: &str, cmd: &[String]) -> anyhow::Result<String>;
    async fn cleanup(&self, node_id: &str) -> anyhow::Result<()>;
}

/// Wired in when no real runtime is configured. Every node reports itself
/// running immediately, which is what lets NodeController's Pending
/// handler chain Pending → Starting → Running in a single reconcile.
pub struct NoopNodeRuntime;

#[async_trait]
impl NodeRuntime for NoopNodeRuntime {
    async fn start_node(&self, _node: &Node, _opts: &StartOptions) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop_node(&self, _node_id: &str, _graceful: bool) -> anyhow::Result<()> {
        Ok(())
    }

    async fn restart_node(&self, _node_id: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn get_node_status(&self, _node_id: &str) -> anyhow::Result<NodeRuntimeStatus> {
        Ok(NodeRuntimeStatus { running: true, pid: None })
    }

    async fn get_logs(&self, _node_id: &str, _opts: &LogOptions) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn exec_in_node(&self, _node_id: &str, _cmd: &[String]) -> anyhow::Result<String> {
        Ok(String::new())
    }

    async fn cleanup(&self, _node_id: &str) -> anyhow::Result<()> {
        Ok(())
    }
}
