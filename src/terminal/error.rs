//! Error taxonomy for the terminal session engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("terminal sessions are disabled on this server")]
    Disabled,

    #[error("failed to allocate terminal: {0}")]
    Allocation(String),

    #[error("identity not permitted: {0}")]
    Unauthorized(String),

    #[error("session {0} not found")]
    NotFound(String),

    #[error("session {0} has ended")]
    Gone(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("terminal I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TerminalResult<T> = Result<T, TerminalError>;
