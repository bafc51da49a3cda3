//! Command-name completion hints for the web terminal.
//!
//! A read-mostly snapshot of shell builtins plus every executable found on
//! the search path. Rebuilt lazily when stale; completely decoupled from
//! session lifecycle.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Names the shell understands without consulting `$PATH`.
const SHELL_BUILTINS: &[&str] = &[
    "alias", "bg", "cd", "command", "echo", "eval", "exec", "exit", "export", "fg", "hash",
    "history", "jobs", "kill", "printf", "pwd", "read", "set", "source", "test", "times", "trap",
    "type", "ulimit", "umask", "unalias", "unset", "wait",
];

/// How old a snapshot may get before a query triggers a rebuild.
const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Hard cap on results returned for one prefix.
const MAX_RESULTS: usize = 50;

struct IndexState {
    names: Vec<String>,
    built_at: Option<Instant>,
}

pub struct CompletionIndex {
    search_path: Vec<PathBuf>,
    ttl: Duration,
    state: Mutex<IndexState>,
}

impl CompletionIndex {
    /// Index over the process's `$PATH`.
    pub fn from_env() -> Self {
        let search_path = std::env::var_os("PATH")
            .map(|p| std::env::split_paths(&p).collect())
            .unwrap_or_default();
        Self::with_search_path(search_path, DEFAULT_TTL)
    }

    pub fn with_search_path(search_path: Vec<PathBuf>, ttl: Duration) -> Self {
        Self {
            search_path,
            ttl,
            state: Mutex::new(IndexState {
                names: Vec::new(),
                built_at: None,
            }),
        }
    }

    /// Commands starting with `prefix`, sorted, capped at [`MAX_RESULTS`].
    pub async fn query(&self, prefix: &str) -> Vec<String> {
        let mut state = self.state.lock().await;
        let stale = match state.built_at {
            Some(at) => at.elapsed() > self.ttl,
            None => true,
        };
        if stale {
            // Directory walking stays off the async executor; on a rebuild
            // failure the previous snapshot is kept.
            let search_path = self.search_path.clone();
            if let Ok(names) = tokio::task::spawn_blocking(move || rebuild(&search_path)).await {
                state.names = names;
                state.built_at = Some(Instant::now());
            }
        }

        state
            .names
            .iter()
            .filter(|name| name.starts_with(prefix))
            .take(MAX_RESULTS)
            .cloned()
            .collect()
    }
}

fn rebuild(search_path: &[PathBuf]) -> Vec<String> {
    let mut names: BTreeSet<String> = SHELL_BUILTINS.iter().map(|s| s.to_string()).collect();

    for dir in search_path {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            if !is_executable_file(&entry) {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                names.insert(name);
            }
        }
    }

    tracing::debug!("completion index rebuilt: {} commands", names.len());
    names.into_iter().collect()
}

#[cfg(unix)]
fn is_executable_file(entry: &std::fs::DirEntry) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match entry.metadata() {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_executable_file(entry: &std::fs::DirEntry) -> bool {
    entry.metadata().map(|m| m.is_file()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn make_executable(dir: &std::path::Path, name: &str) {
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
    }

    #[tokio::test]
    async fn finds_executables_and_builtins_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        make_executable(dir.path(), "git");
        make_executable(dir.path(), "gitk");
        // Non-executable files are skipped.
        std::fs::write(dir.path().join("gitignore"), "").unwrap();

        let index = CompletionIndex::with_search_path(
            vec![dir.path().to_path_buf()],
            Duration::from_secs(60),
        );

        let hits = index.query("git").await;
        assert_eq!(hits, vec!["git".to_string(), "gitk".to_string()]);

        let hits = index.query("ec").await;
        assert!(hits.contains(&"echo".to_string()));
    }

    #[tokio::test]
    async fn results_are_capped() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..80 {
            make_executable(dir.path(), &format!("tool{i:03}"));
        }

        let index = CompletionIndex::with_search_path(
            vec![dir.path().to_path_buf()],
            Duration::from_secs(60),
        );
        let hits = index.query("tool").await;
        assert_eq!(hits.len(), MAX_RESULTS);
    }

    #[tokio::test]
    async fn stale_snapshot_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let index = CompletionIndex::with_search_path(
            vec![dir.path().to_path_buf()],
            Duration::from_millis(0),
        );

        assert!(index.query("newtool").await.is_empty());
        make_executable(dir.path(), "newtool");
        // TTL of zero forces a rebuild on the next query.
        let hits = index.query("newtool").await;
        assert_eq!(hits, vec!["newtool".to_string()]);
    }
}
