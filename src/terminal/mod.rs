//! Terminal session engine.
//!
//! Allocates a pseudo-terminal, launches an interactive shell (optionally
//! as another OS user), and exposes it to any number of concurrent HTTP
//! viewers as a live, resumable byte stream. Sessions are purely in-memory
//! and do not survive a server restart.

pub mod authz;
pub mod completion;
pub mod error;
pub mod launch;
pub mod pty;
pub mod reaper;
pub mod registry;
pub mod session;

use std::sync::Arc;

use uuid::Uuid;

use crate::config::TerminalSettings;

pub use authz::{CallerClaims, Identity, IdentityAuthorizer, StaticAuthorizer};
pub use error::{TerminalError, TerminalResult};
pub use registry::SessionRegistry;
pub use session::Session;

/// Create a new shell session and register it.
///
/// Authorization, PTY allocation, and launch all happen before the registry
/// ever sees the session, so no failure path leaves a half-initialized
/// entry behind.
pub async fn create_session(
    registry: &SessionRegistry,
    authorizer: &dyn IdentityAuthorizer,
    claims: &CallerClaims,
    settings: &TerminalSettings,
    identity: Identity,
    cols: u16,
    rows: u16,
) -> TerminalResult<Arc<Session>> {
    if !settings.enabled {
        return Err(TerminalError::Disabled);
    }

    if let Identity::User(name) = &identity {
        if !authorizer.authorize(&identity, claims) {
            return Err(TerminalError::Unauthorized(format!(
                "caller '{}' may not run a shell as '{name}'",
                claims.subject
            )));
        }
    }

    let pair = pty::open_pty(cols, rows)?;
    let privilege_tool = authz::privilege_tool_path();
    let process = launch::launch_shell(
        pair.slave,
        &identity,
        &settings.shell,
        privilege_tool.as_deref(),
    )?;

    let id = Uuid::new_v4().simple().to_string();
    tracing::info!(
        "created terminal session {id} as '{}' for caller '{}'",
        identity.label(),
        claims.subject
    );

    let session = session::Session::spawn(
        id,
        identity,
        pair.master,
        Box::new(process),
        settings.tail_limit,
    )?;

    if let Err(err) = registry.insert(Arc::clone(&session)).await {
        session.close().await;
        return Err(err);
    }
    Ok(session)
}
