use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::DEFAULT_NAMESPACE;

/// Fields common to every persisted resource. `Generation` backs optimistic
/// concurrency: `Store::update` is rejected with `Conflict` unless the
/// caller's generation matches the one currently on record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub namespace: String,
    pub name: String,
    pub generation: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Metadata {
    /// A fresh, not-yet-persisted set of metadata. `Store::create` is
    /// responsible for stamping `generation = 1` and the timestamps.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let namespace = if namespace.is_empty() {
            DEFAULT_NAMESPACE.to_string()
        } else {
            namespace
        };
        let now = Utc::now();
        Self {
            namespace,
            name: name.into(),
            generation: 0,
            created_at: now,
            updated_at: now,
        }
    }
}
