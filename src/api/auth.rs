//! Bearer-token auth middleware.
//!
//! The panel runs single-tenant: one shared token configured via
//! `PANEL_TOKEN`. When no token is configured the server is in dev mode and
//! every request gets a synthesized local caller. Handlers downstream see
//! only [`CallerClaims`], never the token.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::terminal::CallerClaims;

use super::routes::AppState;

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, (StatusCode, String)> {
    let claims = match &state.config.auth_token {
        Some(expected) => {
            let presented = bearer_token(&req).ok_or((
                StatusCode::UNAUTHORIZED,
                "Missing Authorization header".to_string(),
            ))?;
            if presented != expected {
                return Err((
                    StatusCode::UNAUTHORIZED,
                    "Invalid or expired token".to_string(),
                ));
            }
            CallerClaims {
                subject: "panel-admin".to_string(),
            }
        }
        None => CallerClaims {
            subject: "dev".to_string(),
        },
    };

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
