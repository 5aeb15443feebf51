mod config;
mod dispatcher;
mod error;
mod handlers;
mod metrics;
mod qbittorrent;
mod registry;
mod state;
mod tasks;
mod telegram;
#[cfg(test)]
mod test_support;
mod torrent;
mod tracker;
mod watcher;

use axum::{Router, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{Level, error, info, warn};

use crate::config::Settings;
use crate::dispatcher::Dispatcher;
use crate::handlers::{inbound::MessageHandler, system};
use crate::metrics::Metrics;
use crate::qbittorrent::QbitClient;
use crate::registry::{JsonFileStore, Registry};
use crate::state::AppState;
use crate::tasks::BackgroundTasks;
use crate::telegram::TelegramClient;
use crate::watcher::Watcher;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let settings = Settings::new()?;

    tracing_subscriber::fmt()
        .with_env_filter(&settings.log_level)
        .init();

    info!("Starting Torrent Herald...");

    let metrics = Metrics::new()?;
    let store = Arc::new(JsonFileStore::new(&settings.registry_path));
    let registry = Arc::new(Registry::open(store).await);
    metrics.set_registered_chats(registry.len());

    let telegram = Arc::new(TelegramClient::new(
        &settings.telegram_api_url,
        &settings.telegram_token,
    )?);
    let me = telegram.get_me().await?;
    info!(
        "Authorized on account {}",
        me.username.as_deref().unwrap_or(&me.first_name)
    );

    let qbittorrent = Arc::new(QbitClient::new(
        &settings.qbittorrent_url,
        &settings.qbittorrent_username,
        &settings.qbittorrent_password,
    )?);
    if let Err(e) = qbittorrent.login().await {
        warn!("qBittorrent login failed, retrying on next request: {}", e);
    }

    let (dispatcher, delivery) =
        Dispatcher::new(registry.clone(), telegram.clone(), metrics.clone());
    let watcher = Watcher::new(
        qbittorrent.clone(),
        dispatcher,
        metrics.clone(),
        settings.poll_interval(),
    );
    let handler = MessageHandler::new(
        registry.clone(),
        qbittorrent.clone(),
        telegram.clone(),
        telegram.clone(),
    );

    // Start background tasks (Delivery, Watch, Session, Updates)
    tasks::start_background_tasks(BackgroundTasks {
        watcher,
        delivery,
        handler,
        telegram,
        qbittorrent,
        session_refresh: settings.session_refresh(),
    });

    let app = create_app(AppState { registry, metrics });

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.system_port));
    info!("System server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown");
    Ok(())
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/metrics", get(system::metrics))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(tower_http::trace::DefaultMakeSpan::new().level(Level::DEBUG))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
