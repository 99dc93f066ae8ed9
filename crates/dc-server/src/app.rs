use std::sync::Arc;

use anyhow::Context;
use dc_data::{
    spawn_refresh_loop, DropboxStore, Ingestor, LocalStore, RefreshLoop, RemoteStore,
    SensorService, SensorSources, SourceCache,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{AppConfig, StoreConfig};
use crate::routes::{router, AppState};
use crate::signal::shutdown_signal;

pub fn build_store(config: &StoreConfig) -> Arc<dyn RemoteStore> {
    match config {
        StoreConfig::Dropbox { token } => Arc::new(DropboxStore::new(token.clone())),
        StoreConfig::Local { root } => Arc::new(LocalStore::new(root)),
    }
}

/// Wire the pipeline, serve until a shutdown signal, then stop the refresh loop.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let store = build_store(&config.store);
    info!(store = store.name(), addr = %config.addr, "Starting Decarbonator server");

    let cache = Arc::new(SourceCache::new());
    let ingestor = Arc::new(Ingestor::new(store, cache).with_naive_offset(config.naive_offset));
    let sources = SensorSources::new(&config.wise4051_root, &config.wise4012_root);
    let service = Arc::new(SensorService::new(ingestor.clone(), sources));

    let shutdown = CancellationToken::new();
    let refresh_loop = RefreshLoop::new(ingestor, service.primary_source().clone())
        .with_interval(config.refresh_interval);
    let refresh = spawn_refresh_loop(refresh_loop, shutdown.clone());

    let app = router(AppState::new(service, config.models.clone()));
    let listener = TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    info!(addr = %config.addr, "Listening");

    let serve_token = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            serve_token.cancel();
        })
        .await;

    shutdown.cancel();
    if let Err(e) = refresh.await {
        warn!(error = %e, "Refresh task ended abnormally");
    }
    info!("Server stopped");

    served.context("server error")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_build_store_by_config() {
        let local = build_store(&StoreConfig::Local {
            root: PathBuf::from("/srv/mirror"),
        });
        assert_eq!(local.name(), "Local Directory");

        let dropbox = build_store(&StoreConfig::Dropbox {
            token: "sl.token".to_string(),
        });
        assert_eq!(dropbox.name(), "Dropbox");
    }
}
