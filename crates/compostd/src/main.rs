//! compostd - request aggregation daemon
//!
//! Answers check, result, inventory and test-check queries by fanning out to
//! the check-management, notification, state-history and provider backends,
//! the result store and the worker fleet.

use anyhow::{Context, Result};
use compostd::aggregator::CheckAggregator;
use compostd::backends::{HttpCheckService, HttpCloudProvider, HttpNotificationService, HttpStateHistory};
use compostd::config::Config;
use compostd::directory::EtcdDirectory;
use compostd::dispatcher::{HttpWorkerConnector, TestDispatcher};
use compostd::query::QueryExecutor;
use compostd::results::ResultStore;
use compostd::server::{self, AppState};
use compostd::store::DynamoStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("compostd v{} starting", compost_shared::VERSION);

    let config = Config::load();
    let backend_timeout = Duration::from_secs(config.backends.timeout_secs);

    let checks = HttpCheckService::new(&config.backends.bartnet_url, backend_timeout)
        .context("building check service client")?;
    let notifications = HttpNotificationService::new(&config.backends.hugs_url, backend_timeout)
        .context("building notification service client")?;
    let history = HttpStateHistory::new(&config.backends.cats_url, backend_timeout)
        .context("building state history client")?;
    let cloud = HttpCloudProvider::new(&config.backends.provider_url, backend_timeout)
        .context("building cloud provider client")?;

    let store = DynamoStore::new(&config.store.endpoint, Duration::from_secs(config.store.timeout_secs))
        .context("building result store client")?;
    let results = ResultStore::new(Arc::new(store), config.store.clone());

    let directory = EtcdDirectory::new(
        &config.directory.etcd_url,
        Duration::from_secs(config.directory.timeout_secs),
    )
    .context("building service directory client")?;
    let connector = HttpWorkerConnector::new(config.dispatcher.connect_timeout());

    let aggregator = CheckAggregator::new(
        Arc::new(checks),
        Arc::new(notifications),
        Arc::new(history),
        Arc::new(results),
    );
    let dispatcher = TestDispatcher::new(
        Arc::new(directory),
        Arc::new(connector),
        config.directory.clone(),
        config.dispatcher.clone(),
    );
    let executor = QueryExecutor::new(Arc::new(aggregator), Arc::new(dispatcher), Arc::new(cloud));

    server::run(
        AppState::new(executor),
        &config.server.listen_addr,
        Duration::from_secs(config.server.request_timeout_secs),
    )
    .await
    .context("serving requests")
}
