//! Process entry point: initializes logging and drives the background
//! reconciliation and disk-pressure admission loops. Concrete engine,
//! repository, provider and cache wiring is an external integration
//! concern; this binary demonstrates how the core
//! crates are composed together.

mod usecases;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tsearch_admission::{probe::NullProbe, AdmissionConfig, AdmissionController};
use tsearch_core::testutil::{InMemoryEngine, InMemoryTorrentRepository, StaticSearchProvider};
use tsearch_reconcile::Reconciler;
use tsearch_search::{Aggregator, AggregatorConfig, CacheConfig, CacheStore, HealthRegistry, PopularQueryRefresher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    // Placeholder wiring: a real deployment supplies an engine backed by
    // the embedded BitTorrent client and a repository backed by its
    // persistent store. The in-memory fakes keep this binary runnable
    // standalone for smoke-testing the reconciler and admission loops.
    let engine = Arc::new(InMemoryEngine::new());
    let repository = Arc::new(InMemoryTorrentRepository::new());

    let cancellation = CancellationToken::new();

    let reconciler = Reconciler::new(engine.clone(), repository.clone());
    let reconciler_token = cancellation.clone();
    let reconciler_handle = tokio::spawn(async move { reconciler.run(reconciler_token).await });

    let admission_config = AdmissionConfig::new(PathBuf::from("/data"), 5 * 1024 * 1024 * 1024, 10 * 1024 * 1024 * 1024);
    let admission = AdmissionController::new(engine.clone(), Arc::new(NullProbe), admission_config);
    let admission_token = cancellation.clone();
    let admission_handle = tokio::spawn(async move { admission.run(admission_token).await });

    // Same placeholder-wiring rationale as the engine/repository above: a
    // real deployment supplies real indexer clients as providers.
    let providers: Vec<Arc<dyn tsearch_core::domain::SearchProvider>> = vec![
        Arc::new(StaticSearchProvider::new("piratebay", Vec::new())),
        Arc::new(StaticSearchProvider::new("1337x", Vec::new())),
    ];
    let cache_config = CacheConfig::default();
    let warm_interval = cache_config.warm_interval;
    let cache = Arc::new(CacheStore::new(cache_config, None));
    // No external catalog client is wired for this standalone binary; a
    // real deployment supplies one (TMDb/IMDb-style) to backfill
    // poster/rating/overview on merged results.
    let aggregator = Arc::new(Aggregator::new(
        providers,
        Arc::new(HealthRegistry::new()),
        Some(cache.clone()),
        None,
        AggregatorConfig::default(),
    ));
    let refresher: Arc<dyn PopularQueryRefresher> = aggregator.clone();
    let warmer_token = cancellation.clone();
    let warmer_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(warm_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => cache.warm_tick(50, refresher.clone()).await,
                _ = warmer_token.cancelled() => break,
            }
        }
    });

    info!("tsearch core services started");
    shutdown_signal().await;
    info!("shutdown signal received, stopping background loops");

    cancellation.cancel();
    let _ = tokio::join!(reconciler_handle, admission_handle, warmer_handle);

    Ok(())
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
