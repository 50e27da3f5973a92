//! Session ownership and the re-authentication policy.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::store::{ClientCredentials, KvClient, KvSession, RangeResponse, StoreError, WatchStream};

/// The watcher's handle on the remote store.
///
/// Owns at most one session. An `Auth` failure on any operation triggers one
/// immediate reconnect and retry; a second `Auth` failure is returned.
pub struct StoreConnection {
    client: Arc<dyn KvClient>,
    credentials: ClientCredentials,
    session: Option<Box<dyn KvSession>>,
}

impl StoreConnection {
    pub fn new(client: Arc<dyn KvClient>, credentials: ClientCredentials) -> Self {
        Self {
            client,
            credentials,
            session: None,
        }
    }

    pub fn credentials(&self) -> &ClientCredentials {
        &self.credentials
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Open a session, replacing any existing one.
    pub async fn connect(&mut self) -> Result<(), StoreError> {
        self.close().await;
        let result = self.client.connect(&self.credentials).await;
        let session = match result {
            Err(StoreError::Auth(reason)) => {
                warn!(endpoint = %self.credentials.endpoint, %reason, "Authentication failed, retrying once");
                self.client.connect(&self.credentials).await?
            }
            other => other?,
        };
        debug!(endpoint = %self.credentials.endpoint, "Store session established");
        self.session = Some(session);
        Ok(())
    }

    /// Batched read of `keys`.
    pub async fn get_by_keys(&mut self, keys: &BTreeSet<String>) -> Result<RangeResponse, StoreError> {
        let result = self.session()?.get(keys).await;
        match result {
            Err(StoreError::Auth(reason)) => {
                self.reauthenticate(&reason).await?;
                self.session()?.get(keys).await
            }
            other => other,
        }
    }

    /// Open a watch on `prefix` starting at `start_revision`.
    pub async fn watch_prefix(
        &mut self,
        prefix: &str,
        start_revision: u64,
    ) -> Result<WatchStream, StoreError> {
        let result = self.session()?.watch(prefix, start_revision).await;
        match result {
            Err(StoreError::Auth(reason)) => {
                self.reauthenticate(&reason).await?;
                self.session()?.watch(prefix, start_revision).await
            }
            other => other,
        }
    }

    /// Release the session, if any. Idempotent.
    pub async fn close(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
            debug!(endpoint = %self.credentials.endpoint, "Store session closed");
        }
    }

    fn session(&self) -> Result<&dyn KvSession, StoreError> {
        self.session
            .as_deref()
            .ok_or_else(|| StoreError::Connection("not connected".into()))
    }

    async fn reauthenticate(&mut self, reason: &str) -> Result<(), StoreError> {
        info!(endpoint = %self.credentials.endpoint, %reason, "Session token rejected, re-authenticating");
        self.close().await;
        let session = self.client.connect(&self.credentials).await?;
        self.session = Some(session);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn keys(keys: &[&str]) -> BTreeSet<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[tokio::test]
    async fn test_get_by_keys_reports_absent_keys() {
        let store = MemoryStore::new();
        store.put("/app/a", "1");
        let mut conn = StoreConnection::new(Arc::new(store.clone()), ClientCredentials::new("mem"));
        conn.connect().await.unwrap();

        let response = conn.get_by_keys(&keys(&["/app/a", "/app/b"])).await.unwrap();
        assert_eq!(response.revision, 1);
        assert_eq!(response.entries["/app/a"].as_ref().unwrap().value, "1");
        assert!(response.entries["/app/b"].is_none());
    }

    #[tokio::test]
    async fn test_expired_token_is_renewed_once() {
        let store = MemoryStore::new();
        store.require_credentials("root", "pw");
        store.put("/app/a", "1");
        let creds = ClientCredentials::new("mem").with_user("root", "pw");
        let mut conn = StoreConnection::new(Arc::new(store.clone()), creds);
        conn.connect().await.unwrap();
        assert_eq!(store.connect_attempts(), 1);

        store.expire_tokens();
        let response = conn.get_by_keys(&keys(&["/app/a"])).await.unwrap();
        assert!(response.entries["/app/a"].is_some());
        assert_eq!(store.connect_attempts(), 2);
        assert_eq!(store.active_sessions(), 1);
    }

    #[tokio::test]
    async fn test_bad_credentials_surface_after_one_retry() {
        let store = MemoryStore::new();
        store.require_credentials("root", "pw");
        let creds = ClientCredentials::new("mem").with_user("root", "wrong");
        let mut conn = StoreConnection::new(Arc::new(store.clone()), creds);

        let err = conn.connect().await.unwrap_err();
        assert!(err.is_auth());
        assert_eq!(store.connect_attempts(), 2);
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let store = MemoryStore::new();
        let mut conn = StoreConnection::new(Arc::new(store.clone()), ClientCredentials::new("mem"));
        conn.connect().await.unwrap();
        assert_eq!(store.active_sessions(), 1);
        conn.close().await;
        conn.close().await;
        assert_eq!(store.active_sessions(), 0);
        assert!(conn.get_by_keys(&keys(&["/x"])).await.is_err());
    }
}
