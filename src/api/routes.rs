//! HTTP route handlers and server composition root.

use std::sync::Arc;

use axum::{
    extract::State,
    middleware,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::terminal::completion::CompletionIndex;
use crate::terminal::{IdentityAuthorizer, SessionRegistry, StaticAuthorizer};

use super::auth;
use super::terminal as terminal_api;

/// Shared application state.
///
/// The registry is constructed here and passed by reference everywhere,
/// so tests can build their own `AppState` with independent registries.
pub struct AppState {
    pub config: Config,
    pub registry: Arc<SessionRegistry>,
    pub completions: CompletionIndex,
    pub authorizer: Arc<dyn IdentityAuthorizer>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let authorizer = Arc::new(StaticAuthorizer::new(
            config.terminal.allowed_identities.clone(),
        ));
        Self {
            config,
            registry: Arc::new(SessionRegistry::new()),
            completions: CompletionIndex::from_env(),
            authorizer,
        }
    }
}

/// Build the panel router over the given state.
pub fn router(state: Arc<AppState>) -> Router {
    let public_routes = Router::new().route("/api/health", get(health));

    let protected_routes = Router::new()
        .route("/api/terminal", post(terminal_api::create))
        .route("/api/terminal/identities", get(terminal_api::list_identities))
        .route("/api/terminal/complete", get(terminal_api::complete))
        .route("/api/terminal/:id/stream", get(terminal_api::attach_stream))
        .route("/api/terminal/:id/input", post(terminal_api::write_input))
        .route("/api/terminal/:id/resize", post(terminal_api::resize))
        .route("/api/terminal/:id", delete(terminal_api::terminate))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(config.clone()));

    // Retire idle or dead sessions in the background.
    crate::terminal::reaper::start_reaper(
        Arc::clone(&state.registry),
        config.terminal.idle_ttl,
        config.terminal.reap_interval,
    );

    let app = router(Arc::clone(&state));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    if state.config.dev_mode() {
        tracing::warn!("PANEL_TOKEN not set: running without authentication");
    }

    let shutdown_state = Arc::clone(&state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal(shutdown_state).await;
        })
        .await?;

    Ok(())
}

/// Wait for shutdown and tear down every live shell.
async fn shutdown_signal(state: Arc<AppState>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    let sessions = state.registry.drain().await;
    if sessions.is_empty() {
        tracing::info!("Shutdown: no terminal sessions to close");
        return;
    }

    tracing::info!("Shutdown: closing {} terminal session(s)", sessions.len());
    for session in sessions {
        session.close().await;
    }
    tracing::info!("Graceful shutdown complete");
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    dev_mode: bool,
    terminal_enabled: bool,
    active_sessions: usize,
}

/// Health check endpoint.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        dev_mode: state.config.dev_mode(),
        terminal_enabled: state.config.terminal.enabled,
        active_sessions: state.registry.len().await,
    })
}
