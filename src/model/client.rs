//! A single connected (or recently-connected) participant.

use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex as AsyncMutex;

/// Client ids are non-zero 64-bit integers, unique among currently-online
/// clients.
pub type ClientId = u64;

/// A handle to the write half of a connected socket, shared between the
/// owning session task and any broadcast that wants to send to this client.
/// The mutex serializes concurrent writers; it is locked only for the
/// duration of a single frame write.
pub type SharedWriter = Arc<AsyncMutex<OwnedWriteHalf>>;

struct ClientInner {
    socket: Option<SharedWriter>,
    state: Value,
    team_id: String,
    ip_hash: String,
    last_activity: Instant,
}

/// One client's record. Lives in its room's client index for the client's
/// entire membership, even while offline; the relay's online index holds a
/// second, transient reference while a socket is attached.
pub struct ClientRecord {
    pub id: ClientId,
    inner: Mutex<ClientInner>,
}

impl ClientRecord {
    pub fn new(
        id: ClientId,
        socket: SharedWriter,
        state: Value,
        team_id: String,
        ip_hash: String,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            inner: Mutex::new(ClientInner {
                socket: Some(socket),
                state,
                team_id,
                ip_hash,
                last_activity: Instant::now(),
            }),
        })
    }

    /// Read the current socket reference under the client mutex, then
    /// release it immediately — the caller performs the actual write
    /// without holding this lock.
    pub fn socket(&self) -> Option<SharedWriter> {
        self.inner.lock().unwrap().socket.clone()
    }

    pub fn is_online(&self) -> bool {
        self.inner.lock().unwrap().socket.is_some()
    }

    /// Attaches a new socket on (re)handshake, refreshing state and team.
    pub fn reattach(&self, socket: SharedWriter, state: Value, team_id: String, ip_hash: String) {
        let mut inner = self.inner.lock().unwrap();
        inner.socket = Some(socket);
        inner.state = state;
        inner.team_id = team_id;
        inner.ip_hash = ip_hash;
        inner.last_activity = Instant::now();
    }

    pub fn ip_hash(&self) -> String {
        self.inner.lock().unwrap().ip_hash.clone()
    }

    /// Takes (removes) the current socket reference, if any, so the caller
    /// can shut it down without racing a concurrent sender.
    pub fn take_socket(&self) -> Option<SharedWriter> {
        self.inner.lock().unwrap().socket.take()
    }

    /// Marks the client offline without dropping it from its room.
    pub fn mark_offline(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.socket = None;
        if let Some(obj) = inner.state.as_object_mut() {
            obj.insert("online".to_string(), json!(false));
            obj.insert("isSaveLoaded".to_string(), json!(false));
        }
    }

    pub fn state(&self) -> Value {
        self.inner.lock().unwrap().state.clone()
    }

    pub fn set_state(&self, state: Value) {
        self.inner.lock().unwrap().state = state;
    }

    pub fn team_id(&self) -> String {
        self.inner.lock().unwrap().team_id.clone()
    }

    pub fn set_team_id(&self, team_id: String) {
        self.inner.lock().unwrap().team_id = team_id;
    }

    pub fn touch(&self) {
        self.inner.lock().unwrap().last_activity = Instant::now();
    }

    pub fn last_activity(&self) -> Instant {
        self.inner.lock().unwrap().last_activity
    }

    pub fn is_save_loaded(&self) -> bool {
        self.inner
            .lock()
            .unwrap()
            .state
            .get("isSaveLoaded")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}
