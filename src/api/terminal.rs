//! HTTP bridge for terminal sessions.
//!
//! Adapts the session engine to request/response HTTP: attach-stream turns
//! a session's fan-out channel into a chunked response body, input/resize
//! decode small JSON bodies and delegate to the session, terminate closes
//! and unregisters. Several independent attach-stream requests against the
//! same id are how multiple browser tabs share one shell.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Extension, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::terminal::{self, CallerClaims, Identity, Session, TerminalError};

use super::routes::AppState;

/// Map an engine error onto the HTTP surface.
///
/// `Gone` and `NotFound` stay distinct so the dashboard can tell "session
/// ended" apart from "never existed".
fn error_response(err: TerminalError) -> (StatusCode, String) {
    let status = match &err {
        TerminalError::Disabled | TerminalError::Unauthorized(_) => StatusCode::FORBIDDEN,
        TerminalError::NotFound(_) => StatusCode::NOT_FOUND,
        TerminalError::Gone(_) => StatusCode::GONE,
        TerminalError::Validation(_) => StatusCode::BAD_REQUEST,
        TerminalError::Allocation(_) | TerminalError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

#[derive(Debug, Deserialize)]
pub struct CreateTerminalRequest {
    /// OS user to run the shell as; omitted or "self" means the server's
    /// own user.
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub cols: u16,
    #[serde(default)]
    pub rows: u16,
}

#[derive(Debug, Serialize)]
pub struct CreateTerminalResponse {
    pub id: String,
    pub identity: String,
}

/// Create a new terminal session.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<CallerClaims>,
    Json(req): Json<CreateTerminalRequest>,
) -> Result<Json<CreateTerminalResponse>, (StatusCode, String)> {
    let identity = Identity::from_request(req.identity.as_deref());
    let session = terminal::create_session(
        &state.registry,
        state.authorizer.as_ref(),
        &claims,
        &state.config.terminal,
        identity,
        req.cols,
        req.rows,
    )
    .await
    .map_err(error_response)?;

    Ok(Json(CreateTerminalResponse {
        id: session.id().to_string(),
        identity: session.identity().label().to_string(),
    }))
}

/// Unsubscribes when the attach-stream body is dropped, which is how
/// client disconnects reach the session.
struct SubscriberGuard {
    session: Arc<Session>,
    subscriber: u64,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        let session = Arc::clone(&self.session);
        let subscriber = self.subscriber;
        tokio::spawn(async move {
            session.unsubscribe(subscriber).await;
        });
    }
}

/// Attach a live output stream to a session.
///
/// The response body starts with the tail replay, then carries each chunk
/// as it arrives, flushed immediately. It ends when the session closes;
/// the client dropping the connection just unsubscribes this viewer.
pub async fn attach_stream(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, (StatusCode, String)> {
    let session = state.registry.get(&id).await.map_err(error_response)?;
    let (subscriber, mut rx, snapshot) = session.subscribe().await.map_err(error_response)?;

    let guard = SubscriberGuard {
        session,
        subscriber,
    };

    let stream = async_stream::stream! {
        // Holds the subscription for as long as the client reads.
        let _guard = guard;
        if !snapshot.is_empty() {
            yield Ok::<Bytes, Infallible>(snapshot);
        }
        while let Some(chunk) = rx.recv().await {
            yield Ok(chunk);
        }
    };

    Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(stream))
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to build stream response: {e}"),
            )
        })
}

#[derive(Debug, Deserialize)]
pub struct InputRequest {
    /// Base64-encoded keystroke bytes, forwarded verbatim to the PTY.
    pub data: String,
}

pub async fn write_input(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<InputRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(&req.data)
        .map_err(|e| {
            error_response(TerminalError::Validation(format!(
                "input payload is not valid base64: {e}"
            )))
        })?;

    let session = state.registry.get(&id).await.map_err(error_response)?;
    session.write(&bytes).await.map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ResizeRequest {
    pub cols: u16,
    pub rows: u16,
}

pub async fn resize(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ResizeRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    let session = state.registry.get(&id).await.map_err(error_response)?;
    session
        .resize(req.cols, req.rows)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Close a session and drop it from the registry.
pub async fn terminate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let session = state.registry.get(&id).await.map_err(error_response)?;
    session.close().await;
    state.registry.remove(&id).await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct IdentitiesResponse {
    pub identities: Vec<String>,
}

/// Identity labels the caller may open shells as.
pub async fn list_identities(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<CallerClaims>,
) -> Json<IdentitiesResponse> {
    Json(IdentitiesResponse {
        identities: state.authorizer.allowed_identities(&claims),
    })
}

#[derive(Debug, Deserialize)]
pub struct CompleteQuery {
    #[serde(default)]
    pub prefix: String,
}

#[derive(Debug, Serialize)]
pub struct CompleteResponse {
    pub completions: Vec<String>,
}

/// Command-name completion hints for the terminal frontend.
pub async fn complete(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CompleteQuery>,
) -> impl IntoResponse {
    Json(CompleteResponse {
        completions: state.completions.query(&query.prefix).await,
    })
}
