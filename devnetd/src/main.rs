use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use devnetd::adapters::{NoopHealthChecker, NoopNodeRuntime, NoopProvisioner, NoopTxRuntime, NoopUpgradeRuntime};
use devnetd::broadcaster::LogBroadcaster;
use devnetd::controllers::{
    DevnetController, HealthController, NodeController, TxController, UnsignedTxCache, UpgradeController,
};
use devnetd::manager::{Controller, Manager, ResourceKind};
use devnetd::store::Store;
use devnetd::DaemonConfig;

use storage::{MemoryStorage, SledStorage};

/// devnetd - the reconciliation daemon for local multi-node blockchain
/// devnets. The CLI surface here is deliberately thin: CLI/RPC handling
/// beyond start/stop is left to an external collaborator.
#[derive(Parser)]
#[command(name = "devnetd")]
#[command(about = "Reconciliation daemon for local multi-node blockchain devnets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug-level logging.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reconciliation engine until interrupted.
    Run {
        /// Path to a TOML config file. Falls back to built-in defaults
        /// layered with `DEVNETD__*` environment overrides.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory for the sled-backed store. Overrides the config
        /// file's `data_dir`.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Use an in-memory store instead of sled. Intended for local
        /// trial runs; state does not survive a restart.
        #[arg(long)]
        in_memory: bool,
    },
    /// Print version information and exit.
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run { config, data_dir, in_memory } => run(config, data_dir, in_memory).await,
        Commands::Version => {
            println!("devnetd {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(tracing_subscriber::filter::LevelFilter::from_level(level))
        .init();
}

async fn run(config_path: Option<PathBuf>, data_dir_override: Option<PathBuf>, in_memory: bool) -> Result<()> {
    let mut config = DaemonConfig::load(config_path.as_deref())?;
    if let Some(dir) = data_dir_override {
        config.data_dir = dir.to_string_lossy().into_owned();
    }

    info!(data_dir = %config.data_dir, workers_per_controller = config.workers_per_controller, "starting devnetd");

    if in_memory {
        run_with_backend(config, MemoryStorage::new()).await
    } else {
        std::fs::create_dir_all(&config.data_dir)?;
        let backend = SledStorage::new(&config.data_dir).map_err(|err| anyhow::anyhow!(err))?;
        run_with_backend(config, backend).await
    }
}

async fn run_with_backend<B>(config: DaemonConfig, backend: B) -> Result<()>
where
    B: storage::StorageBackend + Send + Sync + 'static,
{
    let store = Arc::new(Store::new(backend));
    let broadcaster = Arc::new(LogBroadcaster::new());
    let queues = Manager::new_queues();
    let node_queue = queues.get(&ResourceKind::Node).expect("node queue registered by Manager::new_queues").clone();

    let devnet_controller: Arc<dyn Controller> =
        Arc::new(DevnetController::new(store.clone(), Some(Arc::new(NoopProvisioner)), broadcaster.clone()));
    let node_controller: Arc<dyn Controller> = Arc::new(NodeController::new(store.clone(), Some(Arc::new(NoopNodeRuntime))));
    let upgrade_controller: Arc<dyn Controller> =
        Arc::new(UpgradeController::new(store.clone(), Arc::new(NoopUpgradeRuntime), config.upgrade.clone()));
    let tx_controller: Arc<dyn Controller> =
        Arc::new(TxController::new(store.clone(), Arc::new(NoopTxRuntime), Arc::new(UnsignedTxCache::new())));
    let health_controller: Arc<dyn Controller> = Arc::new(HealthController::new(
        store.clone(),
        Some(Arc::new(NoopHealthChecker)),
        config.health.crash_recovery.clone(),
        Duration::from_secs(config.health.stuck_threshold_secs),
        node_queue,
    ));

    let mut controllers = std::collections::HashMap::new();
    controllers.insert(ResourceKind::Devnet, devnet_controller);
    controllers.insert(ResourceKind::Node, node_controller);
    controllers.insert(ResourceKind::Upgrade, upgrade_controller);
    controllers.insert(ResourceKind::Transaction, tx_controller);
    controllers.insert(ResourceKind::Health, health_controller);

    let manager = Arc::new(Manager::new(queues, controllers));
    manager.start(config.workers_per_controller);

    let health_queue = manager.queue(ResourceKind::Health);
    let ticker_store = store.clone();
    let ticker_interval = Duration::from_secs(config.health.check_interval_secs);
    let ticker = tokio::spawn(async move {
        devnetd::controllers::run_health_ticker(ticker_store, health_queue, ticker_interval).await;
    });

    register_enqueue_watchers(&store, &manager);

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, draining workers");
    ticker.abort();
    manager.stop().await;
    Ok(())
}

/// Wires the Store's watch notifications to the Manager's work queues: a
/// mutation commits, the store fires a watch event, the matching handler
/// enqueues the resource's key.
fn register_enqueue_watchers<B: storage::StorageBackend + Send + Sync + 'static>(store: &Arc<Store<B>>, manager: &Arc<Manager>) {
    let m = manager.clone();
    store.watch_devnets(Arc::new(move |event| {
        let key = devnet_watch_key(&event);
        m.enqueue(ResourceKind::Devnet, key);
    }));

    let m = manager.clone();
    store.watch_nodes(Arc::new(move |event| {
        let key = node_watch_key(&event);
        m.enqueue(ResourceKind::Node, key);
    }));

    let m = manager.clone();
    store.watch_upgrades(Arc::new(move |event| {
        let key = upgrade_watch_key(&event);
        m.enqueue(ResourceKind::Upgrade, key);
    }));

    let m = manager.clone();
    store.watch_transactions(Arc::new(move |event| {
        let key = transaction_watch_key(&event);
        m.enqueue(ResourceKind::Transaction, key);
    }));
}

fn devnet_watch_key(event: &devnetd::store::WatchEvent<devnetd::model::Devnet>) -> String {
    let devnet = match event {
        devnetd::store::WatchEvent::Added(d) | devnetd::store::WatchEvent::Modified(d) | devnetd::store::WatchEvent::Deleted(d) => d,
    };
    format!("{}/{}", devnet.metadata.namespace, devnet.metadata.name)
}

fn node_watch_key(event: &devnetd::store::WatchEvent<devnetd::model::Node>) -> String {
    let node = match event {
        devnetd::store::WatchEvent::Added(n) | devnetd::store::WatchEvent::Modified(n) | devnetd::store::WatchEvent::Deleted(n) => n,
    };
    format!("{}/{}/{}", node.metadata.namespace, node.spec.devnet_ref, node.spec.index)
}

fn upgrade_watch_key(event: &devnetd::store::WatchEvent<devnetd::model::Upgrade>) -> String {
    let upgrade = match event {
        devnetd::store::WatchEvent::Added(u) | devnetd::store::WatchEvent::Modified(u) | devnetd::store::WatchEvent::Deleted(u) => u,
    };
    format!("{}/{}", upgrade.metadata.namespace, upgrade.metadata.name)
}

fn transaction_watch_key(event: &devnetd::store::WatchEvent<devnetd::model::Transaction>) -> String {
    let tx = match event {
        devnetd::store::WatchEvent::Added(t) | devnetd::store::WatchEvent::Modified(t) | devnetd::store::WatchEvent::Deleted(t) => t,
    };
    tx.metadata.name.clone()
}
