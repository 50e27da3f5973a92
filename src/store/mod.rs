//! Store connection subsystem.
//!
//! # Data Flow
//! ```text
//! ClientCredentials
//!     → KvClient::connect()        authenticated session
//!     → KvSession::get(keys)       one batched round trip
//!     → KvSession::watch(prefix)   ordered change stream from a revision
//!     → KvSession::close()
//! ```
//!
//! # Design Decisions
//! - The remote client is a collaborator behind `KvClient`/`KvSession`
//! - `StoreConnection` adds the re-authenticate-once policy on top
//! - Watch streams end on connection loss; reopening is the caller's job

pub mod connection;
pub mod credentials;
pub mod gateway;
pub mod memory;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use thiserror::Error;

pub use connection::StoreConnection;
pub use credentials::ClientCredentials;
pub use gateway::EtcdGatewayClient;
pub use memory::MemoryStore;

/// Failures talking to the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("no watch activity for {0:?}")]
    WatchInactivity(Duration),

    #[error("watch stream closed")]
    StreamClosed,

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl StoreError {
    pub fn is_auth(&self) -> bool {
        matches!(self, StoreError::Auth(_))
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Auth(_) => "auth",
            StoreError::Connection(_) => "connection",
            StoreError::WatchInactivity(_) => "inactivity",
            StoreError::StreamClosed => "stream_closed",
            StoreError::Protocol(_) => "protocol",
        }
    }
}

/// A value as stored remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub value: String,
    pub mod_revision: u64,
}

/// Result of a batched read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeResponse {
    /// Store revision the read was served at.
    pub revision: u64,

    /// Every requested key; `None` when the key has never been set.
    pub entries: HashMap<String, Option<KeyValue>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Put,
    Delete,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Put => "put",
            EventKind::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub key: String,
    pub value: Option<String>,
    pub kind: EventKind,
    pub revision: u64,
}

impl ChangeEvent {
    pub fn put(key: impl Into<String>, value: impl Into<String>, revision: u64) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
            kind: EventKind::Put,
            revision,
        }
    }

    pub fn delete(key: impl Into<String>, revision: u64) -> Self {
        Self {
            key: key.into(),
            value: None,
            kind: EventKind::Delete,
            revision,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Change(ChangeEvent),

    /// Keep-alive from the store; carries no data.
    Progress { revision: u64 },
}

pub type WatchStream = BoxStream<'static, Result<WatchEvent, StoreError>>;

/// Factory for sessions against one kind of store.
#[async_trait]
pub trait KvClient: Send + Sync {
    async fn connect(
        &self,
        credentials: &ClientCredentials,
    ) -> Result<Box<dyn KvSession>, StoreError>;
}

/// One authenticated session.
#[async_trait]
pub trait KvSession: Send + Sync {
    /// Read `keys` in a single round trip.
    async fn get(&self, keys: &BTreeSet<String>) -> Result<RangeResponse, StoreError>;

    /// Stream every change under `prefix` from `start_revision` onwards.
    async fn watch(&self, prefix: &str, start_revision: u64) -> Result<WatchStream, StoreError>;

    /// Release the session. Idempotent.
    async fn close(&self);
}
