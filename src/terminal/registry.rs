//! Concurrency-safe map of live terminal sessions.
//!
//! Owned by the server's composition root and passed by reference, so tests
//! can run any number of independent registries. The registry lock covers
//! map access only; session teardown always happens after it is released.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::error::{TerminalError, TerminalResult};
use super::session::Session;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly created session under its id.
    ///
    /// Ids carry enough entropy that a collision is a bug, not a normal
    /// failure; the existing session is kept and the insert refused.
    pub async fn insert(&self, session: Arc<Session>) -> TerminalResult<()> {
        let mut sessions = self.sessions.write().await;
        let id = session.id().to_string();
        if sessions.contains_key(&id) {
            tracing::error!("session id collision: {id}");
            return Err(TerminalError::Allocation(format!(
                "session id collision: {id}"
            )));
        }
        sessions.insert(id, session);
        Ok(())
    }

    pub async fn get(&self, id: &str) -> TerminalResult<Arc<Session>> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| TerminalError::NotFound(id.to_string()))
    }

    /// Remove a session from the map. Idempotent; does not close it.
    pub async fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.write().await.remove(id)
    }

    /// Snapshot of all live sessions, for the reaper's scan.
    pub async fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Take every session out of the map, for shutdown.
    pub async fn drain(&self) -> Vec<Arc<Session>> {
        self.sessions.write().await.drain().map(|(_, s)| s).collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::authz::Identity;
    use crate::terminal::{launch, pty};

    async fn shell_session(id: &str) -> Arc<Session> {
        let pair = pty::open_pty(80, 24).expect("openpty");
        let process =
            launch::launch_shell(pair.slave, &Identity::OwnUser, "/bin/sh", None).expect("spawn");
        Session::spawn(
            id.to_string(),
            Identity::OwnUser,
            pair.master,
            Box::new(process),
            1024,
        )
        .expect("session")
    }

    #[tokio::test]
    async fn insert_then_get_returns_the_session() {
        let registry = SessionRegistry::new();
        let session = shell_session("alpha").await;

        registry.insert(Arc::clone(&session)).await.expect("insert");
        let found = registry.get("alpha").await.expect("get");
        assert_eq!(found.id(), "alpha");
        assert_eq!(registry.len().await, 1);

        session.close().await;
    }

    #[tokio::test]
    async fn get_unknown_id_is_not_found() {
        let registry = SessionRegistry::new();
        match registry.get("missing").await {
            Err(TerminalError::NotFound(_)) => {}
            other => panic!(
                "expected NotFound, got {:?}",
                other.map(|s| s.id().to_string())
            ),
        }
    }

    #[tokio::test]
    async fn insert_collision_is_refused_and_keeps_the_original() {
        let registry = SessionRegistry::new();
        let first = shell_session("dup").await;
        let second = shell_session("dup").await;

        registry.insert(Arc::clone(&first)).await.expect("insert");
        let err = registry
            .insert(Arc::clone(&second))
            .await
            .expect_err("collision must be refused");
        assert!(matches!(err, TerminalError::Allocation(_)));

        // The first registration survives.
        let found = registry.get("dup").await.expect("get");
        assert!(Arc::ptr_eq(&found, &first));
        assert_eq!(registry.len().await, 1);

        first.close().await;
        second.close().await;
    }

    #[tokio::test]
    async fn remove_is_idempotent_and_does_not_close() {
        let registry = SessionRegistry::new();
        let session = shell_session("beta").await;
        registry.insert(Arc::clone(&session)).await.expect("insert");

        let removed = registry.remove("beta").await;
        assert!(removed.is_some());
        // Removal only drops the map entry; the session itself stays open.
        assert!(!session.is_closed().await);

        assert!(registry.remove("beta").await.is_none());
        assert!(registry.is_empty().await);

        session.close().await;
    }
}
