//! Narrow, contract-only interfaces to everything the reconciliation engine
//! treats as an external collaborator: binary/container runtimes, RPC
//! clients, key management.
//!
//! None of these are implemented against a real chain or runtime here —
//! that machinery lives outside this engine's scope. Each trait ships a
//! `Noop*` implementation that the daemon wires in by default and that the
//! controller test suites exercise directly, covering the
//! "without a runtime/without a Provisioner" scenarios.

mod health_checker;
mod node_runtime;
mod provisioner;
mod tx_runtime;
mod upgrade_runtime;

pub use health_checker::{HealthCheckResult, HealthChecker, NoopHealthChecker};
pub use node_runtime::{LogOptions, NodeRuntime, NodeRuntimeStatus, NoopNodeRuntime, StartOptions};
pub use provisioner::{NoopProvisioner, ProvisionStatus, Provisioner};
pub use tx_runtime::{NoopTxRuntime, TxBuildRequest, TxReceipt, TxRuntime};
pub use upgrade_runtime::{NoopUpgradeRuntime, ProposalStatus, UpgradeRuntime};
