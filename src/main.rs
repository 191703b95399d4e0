use std::sync::Arc;

use axum::http::Method;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use smv_service::api;
use smv_service::config::Config;
use smv_service::feed::HttpFeed;
use smv_service::state::AppState;
use smv_service::store::SnapshotStore;
use smv_service::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    telemetry::init_tracing(config.log_json);

    tracing::info!("Starting SMV service v{}", config.version);
    tracing::info!("Host: {}:{}", config.host, config.port);
    tracing::info!("Data dir: {:?}", config.data_dir);
    tracing::info!("Feed: {} as @{}", config.feed_url, config.account_name);

    let store = SnapshotStore::new(config.state_file_path());
    if let Err(e) = store.load_from_disk().await {
        tracing::warn!("Failed to load state from disk: {}", e);
    }
    let persister = store.spawn_persister(config.persist_interval);

    let feed = Arc::new(HttpFeed::new(
        config.feed_url.clone(),
        config.account_name.clone(),
        config.feed_token.clone(),
    ));
    let state = AppState::new(config.clone(), store.clone(), feed);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .allow_origin(Any);

    let app = api::create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&store)))
        .await?;

    tracing::info!("Waiting for final persistence...");
    let _ = tokio::time::timeout(std::time::Duration::from_secs(10), persister).await;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal(store: Arc<SnapshotStore>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }

    store.signal_shutdown();
}
