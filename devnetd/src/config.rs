//! Daemon configuration: built-in defaults, layered with an optional TOML
//! file, layered with `DEVNETD__*` environment overrides, via the `config`
//! crate.

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashRecoveryPolicy {
    pub enabled: bool,
    /// 0 means unlimited restarts.
    pub max_restarts: u32,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for CrashRecoveryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_restarts: 0,
            backoff_initial_ms: 5_000,
            backoff_max_ms: 300_000,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    pub check_interval_secs: u64,
    pub stuck_threshold_secs: u64,
    pub crash_recovery: CrashRecoveryPolicy,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 30,
            stuck_threshold_secs: 120,
            crash_recovery: CrashRecoveryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeConfig {
    pub block_poll_interval_secs: u64,
    pub chain_halt_threshold: u32,
    pub min_height_buffer: u64,
    pub default_voting_target_blocks: u64,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            block_poll_interval_secs: 2,
            chain_halt_threshold: 3,
            min_height_buffer: 10,
            default_voting_target_blocks: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub data_dir: String,
    pub default_namespace: String,
    pub workers_per_controller: usize,
    pub health: HealthConfig,
    pub upgrade: UpgradeConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: "./devnetd-data".to_string(),
            default_namespace: "default".to_string(),
            workers_per_controller: 3,
            health: HealthConfig::default(),
            upgrade: UpgradeConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Loads configuration from built-in defaults, an optional TOML file,
    /// and `DEVNETD__SECTION__KEY`-style environment overrides, in that
    /// order of increasing precedence.
    pub fn load(file: Option<&Path>) -> anyhow::Result<Self> {
        let defaults = DaemonConfig::default();
        let mut builder = config::Config::builder()
            .set_default("data_dir", defaults.data_dir)?
            .set_default("default_namespace", defaults.default_namespace)?
            .set_default("workers_per_controller", defaults.workers_per_controller as i64)?
            .set_default("health.check_interval_secs", defaults.health.check_interval_secs as i64)?
            .set_default("health.stuck_threshold_secs", defaults.health.stuck_threshold_secs as i64)?
            .set_default("health.crash_recovery.enabled", defaults.health.crash_recovery.enabled)?
            .set_default("health.crash_recovery.max_restarts", defaults.health.crash_recovery.max_restarts as i64)?
            .set_default(
                "health.crash_recovery.backoff_initial_ms",
                defaults.health.crash_recovery.backoff_initial_ms as i64,
            )?
            .set_default(
                "health.crash_recovery.backoff_max_ms",
                defaults.health.crash_recovery.backoff_max_ms as i64,
            )?
            .set_default(
                "health.crash_recovery.backoff_multiplier",
                defaults.health.crash_recovery.backoff_multiplier,
            )?
            .set_default("upgrade.block_poll_interval_secs", defaults.upgrade.block_poll_interval_secs as i64)?
            .set_default("upgrade.chain_halt_threshold", defaults.upgrade.chain_halt_threshold as i64)?
            .set_default("upgrade.min_height_buffer", defaults.upgrade.min_height_buffer as i64)?
            .set_default(
                "upgrade.default_voting_target_blocks",
                defaults.upgrade.default_voting_target_blocks as i64,
            )?;

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder = builder.add_source(config::Environment::with_prefix("DEVNETD").separator("__"));

        let settings = builder.build()?;
        let config = settings.try_deserialize()?;
        Ok(config)
    }
}
