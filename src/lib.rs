pub mod commands;
pub mod config;
pub mod doc_processor;
pub mod gemini;
pub mod session;
pub mod ui;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use commands::{chat, knowledge, settings, AppState};
use config::ServerConfig;

pub fn app(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/", get(chat::index))
        .route("/healthz", get(|| async { "ok" }))
        .route("/settings/api-key", post(settings::set_api_key))
        .route("/settings/model", post(settings::select_model))
        .route("/documents", post(knowledge::upload_document))
        .route("/documents/reset", post(knowledge::reset_document))
        .route("/chat", post(chat::send_message))
        .route("/chat/suggested", post(chat::ask_suggested))
        .route("/chat/export", get(chat::export_history))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let address = config.address.clone();
    let state = AppState::new(config)?;

    let gemini_settings = state.config.clone();
    let sweeper = session::spawn_idle_sweep(
        state.sessions.clone(),
        Duration::from_secs(state.config.session_idle_secs),
        Duration::from_secs(state.config.session_sweep_secs.max(1)),
        move |api_key: &str| gemini_settings.gemini_config(api_key),
    );
    let app = app(state);

    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    sweeper.abort();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
