//! A save-state group within a room.

use super::client::ClientId;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

struct TeamInner {
    state: Value,
    queue: Vec<String>,
    requesters: Vec<ClientId>,
}

/// Holds the authoritative save state, a replay queue of raw packets for
/// late joiners, and the list of clients awaiting a state reply. Created
/// lazily on first reference and never explicitly destroyed — it lives as
/// long as its room.
pub struct Team {
    pub id: String,
    inner: Mutex<TeamInner>,
}

impl Team {
    pub fn new(id: String) -> Arc<Self> {
        Arc::new(Self {
            id,
            inner: Mutex::new(TeamInner {
                state: json!({}),
                queue: Vec::new(),
                requesters: Vec::new(),
            }),
        })
    }

    pub fn state(&self) -> Value {
        self.inner.lock().unwrap().state.clone()
    }

    pub fn set_state(&self, state: Value) {
        self.inner.lock().unwrap().state = state;
    }

    /// True when `state` is the empty-object sentinel (spec's literal
    /// `"{}"`, represented here as an empty `Value::Object`).
    pub fn state_is_empty(&self) -> bool {
        matches!(&self.inner.lock().unwrap().state, Value::Object(map) if map.is_empty())
    }

    pub fn push_queue(&self, raw: String) {
        self.inner.lock().unwrap().queue.push(raw);
    }

    pub fn queue_snapshot(&self) -> Vec<String> {
        self.inner.lock().unwrap().queue.clone()
    }

    pub fn push_requester(&self, id: ClientId) {
        self.inner.lock().unwrap().requesters.push(id);
    }

    /// Atomically snapshots and clears `requesters` and `queue` (spec
    /// §4.2's `UPDATE_TEAM_STATE` handler takes both under one lock
    /// acquisition).
    pub fn take_requesters_and_clear_queue(&self) -> Vec<ClientId> {
        let mut inner = self.inner.lock().unwrap();
        inner.queue.clear();
        std::mem::take(&mut inner.requesters)
    }
}
