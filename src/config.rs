//! Server configuration.
//!
//! Everything comes from environment variables with sensible defaults, so
//! the panel can run with zero configuration in development.

use std::time::Duration;

/// Top-level panel configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address for the HTTP server.
    pub host: String,
    pub port: u16,
    /// Bearer token required on API calls. `None` means dev mode: no auth,
    /// a local caller is synthesized for every request.
    pub auth_token: Option<String>,
    pub terminal: TerminalSettings,
}

/// Settings for the terminal session engine.
#[derive(Debug, Clone)]
pub struct TerminalSettings {
    /// When false, session creation is refused outright.
    pub enabled: bool,
    /// Shell launched for "self" sessions.
    pub shell: String,
    /// Upper bound on the replay tail buffer, in bytes.
    pub tail_limit: usize,
    /// Idle time after which the reaper retires a session.
    pub idle_ttl: Duration,
    /// How often the reaper scans.
    pub reap_interval: Duration,
    /// OS users callers may run shells as, besides their own.
    pub allowed_identities: Vec<String>,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            shell: default_shell(),
            tail_limit: 64 * 1024,
            idle_ttl: Duration::from_secs(1800),
            reap_interval: Duration::from_secs(30),
            allowed_identities: Vec::new(),
        }
    }
}

fn default_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let auth_token = std::env::var("PANEL_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());

        let allowed_identities = std::env::var("PANEL_TERMINAL_IDENTITIES")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            host: std::env::var("PANEL_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env_or("PANEL_PORT", 8888),
            auth_token,
            terminal: TerminalSettings {
                enabled: env_or("PANEL_TERMINAL_ENABLED", true),
                shell: std::env::var("PANEL_SHELL").unwrap_or_else(|_| default_shell()),
                tail_limit: env_or("PANEL_TERMINAL_TAIL_LIMIT", 64 * 1024),
                idle_ttl: Duration::from_secs(env_or("PANEL_TERMINAL_IDLE_TTL_SECS", 1800)),
                reap_interval: Duration::from_secs(env_or("PANEL_TERMINAL_REAP_SECS", 30)),
                allowed_identities,
            },
        }
    }

    pub fn dev_mode(&self) -> bool {
        self.auth_token.is_none()
    }
}
