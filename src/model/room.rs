//! A session: the membership registry of clients and teams sharing a room
//! code, plus room-level settings.

use super::client::{ClientId, ClientRecord};
use super::team::Team;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

struct RoomInner {
    state: Value,
    clients: HashMap<ClientId, Arc<ClientRecord>>,
    teams: HashMap<String, Arc<Team>>,
}

/// Owns its clients and teams outright (see [`crate::model`] on why this is
/// an arena rather than a graph of strong references). Created lazily by
/// the first `HANDSHAKE` referencing it; destroyed by the inactivity sweep
/// once every member has been idle past the threshold.
pub struct Room {
    pub id: String,
    inner: Mutex<RoomInner>,
}

impl Room {
    /// `ownerClientId` is set once, from the first client to create the
    /// room, and never recomputed afterward.
    pub fn new(id: String, owner_client_id: ClientId) -> Arc<Self> {
        Arc::new(Self {
            id,
            inner: Mutex::new(RoomInner {
                state: json!({ "ownerClientId": owner_client_id }),
                clients: HashMap::new(),
                teams: HashMap::new(),
            }),
        })
    }

    pub fn state(&self) -> Value {
        self.inner.lock().unwrap().state.clone()
    }

    pub fn set_state(&self, state: Value) {
        self.inner.lock().unwrap().state = state;
    }

    pub fn insert_client(&self, client: Arc<ClientRecord>) {
        self.inner.lock().unwrap().clients.insert(client.id, client);
    }

    pub fn get_client(&self, id: ClientId) -> Option<Arc<ClientRecord>> {
        self.inner.lock().unwrap().clients.get(&id).cloned()
    }

    pub fn clients_snapshot(&self) -> Vec<Arc<ClientRecord>> {
        self.inner.lock().unwrap().clients.values().cloned().collect()
    }

    pub fn client_count(&self) -> usize {
        self.inner.lock().unwrap().clients.len()
    }

    /// Returns the existing team or installs a freshly-created one,
    /// atomically with respect to other callers. The `bool` tells the
    /// caller whether a new team was installed, so it can account for that
    /// in its own counters.
    pub fn find_or_create_team(&self, team_id: &str) -> (Arc<Team>, bool) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(team) = inner.teams.get(team_id) {
            return (Arc::clone(team), false);
        }
        let team = Team::new(team_id.to_string());
        inner.teams.insert(team_id.to_string(), Arc::clone(&team));
        (team, true)
    }

    pub fn get_team(&self, team_id: &str) -> Option<Arc<Team>> {
        self.inner.lock().unwrap().teams.get(team_id).cloned()
    }

    /// Members currently assigned to the given team, online or not.
    pub fn members_of_team(&self, team_id: &str) -> Vec<Arc<ClientRecord>> {
        self.inner
            .lock()
            .unwrap()
            .clients
            .values()
            .filter(|c| c.team_id() == team_id)
            .cloned()
            .collect()
    }

    /// True once every client in the room has been idle past `threshold`.
    /// An empty room (no members left at all) also qualifies, matching the
    /// original behavior of sweeping rooms nobody ever rejoined.
    pub fn last_activity(&self) -> Option<Instant> {
        self.clients_snapshot()
            .iter()
            .map(|c| c.last_activity())
            .max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn test_writer() -> crate::model::client::SharedWriter {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = tokio::net::TcpStream::connect(addr);
        let (accepted, _) = tokio::join!(async { listener.accept().await.unwrap() }, connect);
        let (_, write_half) = accepted.0.into_split();
        std::sync::Arc::new(tokio::sync::Mutex::new(write_half))
    }

    #[tokio::test]
    async fn find_or_create_team_is_idempotent() {
        let room = Room::new("R1".to_string(), 1);
        let (first, first_is_new) = room.find_or_create_team("T1");
        let (second, second_is_new) = room.find_or_create_team("T1");
        assert!(first_is_new);
        assert!(!second_is_new);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn members_of_team_filters_by_assignment() {
        let room = Room::new("R1".to_string(), 1);
        let writer = test_writer().await;
        let a = ClientRecord::new(1, writer.clone(), json!({}), "T1".to_string(), String::new());
        let b = ClientRecord::new(2, writer, json!({}), "T2".to_string(), String::new());
        room.insert_client(a);
        room.insert_client(b);

        let members = room.members_of_team("T1");
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, 1);
    }

    #[tokio::test]
    async fn last_activity_is_none_for_an_empty_room() {
        let room = Room::new("R1".to_string(), 1);
        assert!(room.last_activity().is_none());

        let writer = test_writer().await;
        let client = ClientRecord::new(1, writer, json!({}), "T1".to_string(), String::new());
        room.insert_client(client);
        assert!(room.last_activity().is_some());
    }
}
