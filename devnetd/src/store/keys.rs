//! Binary/string key formats:
//! `"<ns>/<name>"` for devnets and upgrades, `"<ns>/<devnetName>/<index>"`
//! for nodes, `"<name>"` (globally unique) for transactions.

pub const DEVNETS_BUCKET: &str = "devnets";
pub const NODES_BUCKET: &str = "nodes";
pub const UPGRADES_BUCKET: &str = "upgrades";
pub const TRANSACTIONS_BUCKET: &str = "transactions";

pub fn devnet_key(namespace: &str, name: &str) -> String {
    format!("{DEVNETS_BUCKET}/{namespace}/{name}")
}

pub fn devnet_namespace_prefix(namespace: &str) -> String {
    format!("{DEVNETS_BUCKET}/{namespace}/")
}

pub fn node_key(namespace: &str, devnet_name: &str, index: u32) -> String {
    format!("{NODES_BUCKET}/{namespace}/{devnet_name}/{index}")
}

pub fn node_devnet_prefix(namespace: &str, devnet_name: &str) -> String {
    format!("{NODES_BUCKET}/{namespace}/{devnet_name}/")
}

pub fn node_namespace_prefix(namespace: &str) -> String {
    format!("{NODES_BUCKET}/{namespace}/")
}

pub fn upgrade_key(namespace: &str, name: &str) -> String {
    format!("{UPGRADES_BUCKET}/{namespace}/{name}")
}

pub fn upgrade_namespace_prefix(namespace: &str) -> String {
    format!("{UPGRADES_BUCKET}/{namespace}/")
}

pub fn transaction_key(name: &str) -> String {
    format!("{TRANSACTIONS_BUCKET}/{name}")
}

pub fn transactions_prefix() -> String {
    format!("{TRANSACTIONS_BUCKET}/")
}
