//! Reconcile keys are plain strings; each controller owns its own format.
//! This module centralizes the two reconcile-key shapes in use: `"ns/name"`
//! and `"ns/devnet/index"`, both accepting a short form that defaults the
//! namespace.

use crate::model::DEFAULT_NAMESPACE;

/// Splits `"ns/name"` or `"name"` (default namespace) into `(namespace, name)`.
pub fn parse_ns_name(key: &str) -> (String, String) {
    match key.split_once('/') {
        Some((ns, name)) => (ns.to_string(), name.to_string()),
        None => (DEFAULT_NAMESPACE.to_string(), key.to_string()),
    }
}

/// Splits `"namespace/devnet/index"` or `"devnet/index"` (default
/// namespace) into `(namespace, devnet_name, index)`.
pub fn parse_devnet_node(key: &str) -> Option<(String, String, u32)> {
    let parts: Vec<&str> = key.split('/').collect();
    match parts.as_slice() {
        [devnet, index] => index.parse().ok().map(|i| (DEFAULT_NAMESPACE.to_string(), devnet.to_string(), i)),
        [ns, devnet, index] => index.parse().ok().map(|i| (ns.to_string(), devnet.to_string(), i)),
        _ => None,
    }
}

pub fn node_key(namespace: &str, devnet_name: &str, index: u32) -> String {
    format!("{namespace}/{devnet_name}/{index}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ns_name_defaults_namespace() {
        assert_eq!(parse_ns_name("dev1"), (DEFAULT_NAMESPACE.to_string(), "dev1".to_string()));
        assert_eq!(parse_ns_name("team-a/dev1"), ("team-a".to_string(), "dev1".to_string()));
    }

    #[test]
    fn devnet_node_accepts_both_forms() {
        assert_eq!(parse_devnet_node("dev1/0"), Some((DEFAULT_NAMESPACE.to_string(), "dev1".to_string(), 0)));
        assert_eq!(parse_devnet_node("team-a/dev1/2"), Some(("team-a".to_string(), "dev1".to_string(), 2)));
        assert_eq!(parse_devnet_node("garbage"), None);
    }
}
