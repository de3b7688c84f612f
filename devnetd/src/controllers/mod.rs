//! One controller per resource kind (Devnet, Node, Upgrade, Transaction,
//! Health). Each implements `manager::Controller::reconcile(key)` as a
//! pure transition over stored state.

mod classify;
mod devnet;
mod health;
mod key;
mod node;
mod transaction;
mod upgrade;

pub use devnet::DevnetController;
pub use health::{run_health_ticker, HealthController};
pub use node::NodeController;
pub use transaction::{TxController, UnsignedTxCache};
pub use upgrade::{blocks_for_voting, compute_target_height, verify_chain_resumed, wait_for_chain_halt, UpgradeController};
