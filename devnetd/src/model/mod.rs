//! Resource types: `Devnet`, `Node`, `Upgrade`, `Transaction`, and the
//! `Metadata`/`Condition`/`Event` types every resource shares.

mod condition;
mod devnet;
mod metadata;
mod node;
mod transaction;
mod upgrade;

pub use condition::{set_condition, Condition, ConditionStatus, Event, EventType};
pub use devnet::{Devnet, DevnetPhase, DevnetSpec, DevnetStatus, Mode};
pub use metadata::Metadata;
pub use node::{Desired, Node, NodePhase, NodeSpec, NodeStatus, Role};
pub use transaction::{Transaction, TransactionPhase, TransactionSpec, TransactionStatus};
pub use upgrade::{BinaryRef, Upgrade, UpgradePhase, UpgradeSpec, UpgradeStatus};

pub const DEFAULT_NAMESPACE: &str = "default";

/// Common accessor implemented by every resource kind, used generically by
/// the store's optimistic-concurrency logic.
pub trait Resource {
    fn metadata(&self) -> &Metadata;
    fn metadata_mut(&mut self) -> &mut Metadata;
}

impl Resource for Devnet {
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }
    fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl Resource for Node {
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }
    fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl Resource for Upgrade {
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }
    fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl Resource for Transaction {
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }
    fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
