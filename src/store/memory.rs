//! In-process store with fault injection.
//!
//! Behaves like a single-node etcd: a global revision counter, per-key
//! `mod_revision`, prefix watches that replay history from a start
//! revision. Used by tests and local demos.

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use crate::store::{
    ChangeEvent, ClientCredentials, KeyValue, KvClient, KvSession, RangeResponse, StoreError,
    WatchEvent, WatchStream,
};

const WATCH_BUFFER: usize = 256;

#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<State>,
    connect_attempts: AtomicU64,
    active_sessions: AtomicUsize,
}

struct State {
    data: BTreeMap<String, KeyValue>,
    history: Vec<ChangeEvent>,
    revision: u64,
    unreachable: bool,
    credentials: Option<(String, String)>,
    token_generation: u64,
    events: broadcast::Sender<WatchEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_BUFFER);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    data: BTreeMap::new(),
                    history: Vec::new(),
                    revision: 0,
                    unreachable: false,
                    credentials: None,
                    token_generation: 0,
                    events,
                }),
                connect_attempts: AtomicU64::new(0),
                active_sessions: AtomicUsize::new(0),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set `key`, returning the new store revision.
    pub fn put(&self, key: &str, value: &str) -> u64 {
        let mut state = self.state();
        state.revision += 1;
        let revision = state.revision;
        state.data.insert(
            key.to_string(),
            KeyValue {
                value: value.to_string(),
                mod_revision: revision,
            },
        );
        state.record(ChangeEvent::put(key, value, revision));
        revision
    }

    /// Remove `key`. Deleting a missing key still bumps the revision.
    pub fn delete(&self, key: &str) -> u64 {
        let mut state = self.state();
        state.revision += 1;
        let revision = state.revision;
        state.data.remove(key);
        state.record(ChangeEvent::delete(key, revision));
        revision
    }

    /// Deliver `event` to open watches verbatim, without touching stored data.
    pub fn inject(&self, event: WatchEvent) {
        let _ = self.state().events.send(event);
    }

    /// Send a progress notification at the current revision.
    pub fn progress(&self) {
        let state = self.state();
        let _ = state.events.send(WatchEvent::Progress {
            revision: state.revision,
        });
    }

    /// Refuse connections and operations. Also ends open watches.
    pub fn set_unreachable(&self, unreachable: bool) {
        let mut state = self.state();
        state.unreachable = unreachable;
        if unreachable {
            state.close_watches();
        }
    }

    /// End every open watch stream.
    pub fn terminate_watches(&self) {
        self.state().close_watches();
    }

    /// Require this username/password on connect.
    pub fn require_credentials(&self, username: &str, password: &str) {
        self.state().credentials = Some((username.to_string(), password.to_string()));
    }

    /// Invalidate every issued session token.
    pub fn expire_tokens(&self) {
        self.state().token_generation += 1;
    }

    pub fn revision(&self) -> u64 {
        self.state().revision
    }

    pub fn connect_attempts(&self) -> u64 {
        self.shared.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn active_sessions(&self) -> usize {
        self.shared.active_sessions.load(Ordering::SeqCst)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    fn record(&mut self, event: ChangeEvent) {
        self.history.push(event.clone());
        let _ = self.events.send(WatchEvent::Change(event));
    }

    fn close_watches(&mut self) {
        // Receivers see `Closed` once the old sender is gone.
        let (events, _) = broadcast::channel(WATCH_BUFFER);
        self.events = events;
    }
}

#[async_trait]
impl KvClient for MemoryStore {
    async fn connect(
        &self,
        credentials: &ClientCredentials,
    ) -> Result<Box<dyn KvSession>, StoreError> {
        self.shared.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let state = self.state();
        if state.unreachable {
            return Err(StoreError::Connection("endpoint unreachable".into()));
        }
        if let Some((user, pass)) = &state.credentials {
            let ok = credentials.username.as_deref() == Some(user.as_str())
                && credentials.password.as_deref() == Some(pass.as_str());
            if !ok {
                return Err(StoreError::Auth("authentication failed".into()));
            }
        }
        let token = state.token_generation;
        drop(state);

        self.shared.active_sessions.fetch_add(1, Ordering::SeqCst);
        debug!(token, "Memory store session opened");
        Ok(Box::new(MemorySession {
            store: self.clone(),
            token,
            closed: AtomicBool::new(false),
        }))
    }
}

struct MemorySession {
    store: MemoryStore,
    token: u64,
    closed: AtomicBool,
}

impl MemorySession {
    fn check(&self, state: &State) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("session closed".into()));
        }
        if state.unreachable {
            return Err(StoreError::Connection("endpoint unreachable".into()));
        }
        if state.credentials.is_some() && state.token_generation != self.token {
            return Err(StoreError::Auth("invalid auth token".into()));
        }
        Ok(())
    }

    fn release(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.store.shared.active_sessions.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl KvSession for MemorySession {
    async fn get(&self, keys: &BTreeSet<String>) -> Result<RangeResponse, StoreError> {
        let state = self.store.state();
        self.check(&state)?;
        let entries: HashMap<String, Option<KeyValue>> = keys
            .iter()
            .map(|k| (k.clone(), state.data.get(k).cloned()))
            .collect();
        Ok(RangeResponse {
            revision: state.revision,
            entries,
        })
    }

    async fn watch(&self, prefix: &str, start_revision: u64) -> Result<WatchStream, StoreError> {
        let state = self.store.state();
        self.check(&state)?;

        // Subscribe and snapshot history under one lock so nothing falls between.
        let rx = state.events.subscribe();
        let backlog: Vec<Result<WatchEvent, StoreError>> = state
            .history
            .iter()
            .filter(|e| e.revision >= start_revision && e.key.starts_with(prefix))
            .cloned()
            .map(|e| Ok(WatchEvent::Change(e)))
            .collect();
        drop(state);

        let prefix = prefix.to_string();
        let live = stream::unfold(Some(rx), move |rx| {
            let prefix = prefix.clone();
            async move {
                let mut rx = match rx {
                    Some(rx) => rx,
                    None => return None,
                };
                loop {
                    match rx.recv().await {
                        Ok(WatchEvent::Change(event)) if !event.key.starts_with(&prefix) => {
                            continue
                        }
                        Ok(event) => return Some((Ok(event), Some(rx))),
                        Err(RecvError::Closed) => return None,
                        Err(RecvError::Lagged(missed)) => {
                            let err = StoreError::Connection(format!(
                                "watch fell behind by {} events",
                                missed
                            ));
                            return Some((Err(err), None));
                        }
                    }
                }
            }
        });

        Ok(stream::iter(backlog).chain(live).boxed())
    }

    async fn close(&self) {
        self.release();
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.release();
    }
}
