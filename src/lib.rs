//! # shellpanel
//!
//! A self-hosted server administration panel with a live web terminal.
//!
//! The heart of the crate is the terminal session engine: it allocates a
//! pseudo-terminal, launches an interactive shell (optionally as another OS
//! user), and exposes that shell to any number of concurrent HTTP viewers
//! as a live, resumable byte stream.
//!
//! ## Architecture
//!
//! ```text
//!   POST /api/terminal ──► create_session ──► PTY + shell ──► Session
//!                                                               │
//!   GET /api/terminal/:id/stream ◄── fan-out + tail replay ◄────┤
//!   POST /api/terminal/:id/input ──► PTY master ────────────────┤
//!                                                               │
//!   Reaper (periodic) ──► close idle/dead sessions ─────────────┘
//! ```
//!
//! ## Modules
//! - `api`: axum routes, auth middleware, and the HTTP/stream bridge
//! - `terminal`: sessions, registry, shell launcher, reaper, completion
//! - `config`: environment-derived server configuration

pub mod api;
pub mod config;
pub mod terminal;

pub use config::Config;
