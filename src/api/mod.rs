//! HTTP API for the panel.

pub mod auth;
pub mod routes;
pub mod terminal;

pub use routes::{router, serve, AppState};
