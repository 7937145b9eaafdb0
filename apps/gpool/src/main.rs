use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use gpool_core::config::ConfigLoader;
use gpool_core::handler::AppState;
use gpool_core::logwriter::{LogWriter, DEFAULT_WORKER_COUNT};
use gpool_core::pool::KeyPool;
use gpool_core::rollup::{RollupWorker, DEFAULT_TICK};
use gpool_core::ConfigSnapshot;
use gpool_storage::{SeaOrmConfigStore, SeaOrmCredentialStore, SeaOrmLogStore, SeaOrmRollupStore};

mod cli;
mod data_dir;
mod dsn;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let data_dir = data_dir::resolve_data_dir(&cli.data_dir);
    let resolved_dsn = dsn::resolve_dsn(&cli.dsn, &data_dir).map_err(|err| anyhow::anyhow!(err.to_string()))?;

    let db = gpool_storage::db::connect_shared(&resolved_dsn).await?;
    let credential_store = Arc::new(SeaOrmCredentialStore::new(db.clone()));
    let log_store = Arc::new(SeaOrmLogStore::new(db.clone()));
    let rollup_store = Arc::new(SeaOrmRollupStore::new(db.clone()));
    let config_store = Arc::new(SeaOrmConfigStore::new(db.clone()));

    let (pool_config, mut system) = ConfigLoader::new(config_store).load().await;
    if !cli.host.trim().is_empty() {
        system.host = cli.host.clone();
    }
    if let Some(port) = cli.port {
        system.port = port;
    }

    let key_pool_size = pool_config.key_pool_size;
    let snapshot = Arc::new(ConfigSnapshot::new(pool_config, system));

    let pool = Arc::new(KeyPool::new(credential_store.clone(), key_pool_size));
    let log_writer = Arc::new(LogWriter::spawn(log_store.clone(), DEFAULT_WORKER_COUNT));

    let rollup_worker = Arc::new(RollupWorker::new(credential_store.clone(), log_store.clone(), rollup_store, DEFAULT_TICK));
    tokio::spawn(rollup_worker.run());

    let state = Arc::new(AppState { config: snapshot.clone(), pool, log_writer });
    let router = gpool_router::build_router(state, &snapshot.system().api_prefix);

    let system = snapshot.system();
    let bind = format!("{}:{}", system.host, system.port);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(%bind, event = "listening");
    axum::serve(listener, router).await?;
    Ok(())
}
