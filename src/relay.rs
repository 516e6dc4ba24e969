//! The relay: accepts TCP connections, owns the room registry and the
//! online-client index, assigns client ids, runs the periodic timers, and
//! enforces the ban list and invalid-packet threshold.

use crate::config::RelayConfig;
use crate::metrics::ServerMetrics;
use crate::model::client::{ClientId, ClientRecord, SharedWriter};
use crate::model::Room;
use crate::security::hash_ip;
use crate::stats::StatsStore;
use dashmap::{DashMap, DashSet};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Process-wide relay state. Constructed once in `main`, run until shutdown,
/// never exposed as ambient/global state.
pub struct Relay {
    pub config: RelayConfig,
    pub metrics: Arc<ServerMetrics>,
    rooms: DashMap<String, Arc<Room>>,
    online: DashMap<ClientId, Arc<ClientRecord>>,
    next_client_id: AtomicU64,
    pub total_games_complete: AtomicU64,
    pub monthly_games_complete: AtomicU64,
    current_month: AtomicU32,
    ban_list: DashSet<String>,
    known_client_ips: DashSet<String>,
    quiet_mode: std::sync::atomic::AtomicBool,
    pub stats_path: String,
}

impl Relay {
    pub fn new(config: RelayConfig, stats_path: String, stats: &StatsStore) -> Arc<Self> {
        let ban_list = DashSet::new();
        for hash in &stats.ban_list {
            ban_list.insert(hash.clone());
        }
        let known_client_ips = DashSet::new();
        for hash in &stats.client_shas {
            known_client_ips.insert(hash.clone());
        }

        Arc::new(Self {
            config,
            metrics: Arc::new(ServerMetrics::new()),
            rooms: DashMap::new(),
            online: DashMap::new(),
            next_client_id: AtomicU64::new(stats.unique_count.max(1)),
            total_games_complete: AtomicU64::new(stats.total_games_complete_count),
            monthly_games_complete: AtomicU64::new(stats.monthly_games_complete_count),
            current_month: AtomicU32::new(stats.current_month),
            ban_list,
            known_client_ips,
            quiet_mode: std::sync::atomic::AtomicBool::new(false),
            stats_path,
        })
    }

    // ---- accept loop ---------------------------------------------------

    /// Accepts connections until the listener is closed. Each accepted
    /// socket is checked against the ban list before a session task is
    /// spawned for it.
    pub async fn run_accept_loop(self: Arc<Self>, listener: tokio::net::TcpListener) {
        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(err) => {
                    tracing::error!(error = %err, "accept loop stopped");
                    return;
                }
            };

            self.metrics.connections_accepted.fetch_add(1, Ordering::Relaxed);
            let hash = hash_ip(addr.ip());

            if self.ban_list.contains(&hash) {
                self.metrics.connections_banned.fetch_add(1, Ordering::Relaxed);
                tracing::info!(%addr, "rejecting connection from banned IP");
                tokio::spawn(reject_banned_connection(stream));
                continue;
            }

            self.known_client_ips.insert(hash);

            let relay = Arc::clone(&self);
            tokio::spawn(async move {
                crate::session::handle_connection(relay, stream, addr).await;
            });
        }
    }

    // ---- registration ----------------------------------------------------

    /// Assigns (or confirms) a client id, then installs/reuses the client
    /// record in its room.
    pub fn register_client(
        &self,
        room_id: &str,
        requested_id: ClientId,
        mut client_state: Value,
        writer: SharedWriter,
        ip_hash: String,
    ) -> (Arc<Room>, Arc<ClientRecord>) {
        let mut candidate = requested_id;
        while candidate == 0 || self.online.contains_key(&candidate) {
            candidate = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        }

        let room = {
            let metrics = &self.metrics;
            Arc::clone(&*self.rooms.entry(room_id.to_string()).or_insert_with(|| {
                metrics.rooms_created.fetch_add(1, Ordering::Relaxed);
                Room::new(room_id.to_string(), candidate)
            }))
        };

        if !client_state.is_object() {
            client_state = json!({});
        }
        let team_id = client_state
            .get("teamId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if let Some(obj) = client_state.as_object_mut() {
            obj.insert("clientId".to_string(), json!(candidate));
            obj.insert("online".to_string(), json!(true));
        }
        // `findOrCreateTeam` installs the team before any client references it.
        let (_, team_is_new) = room.find_or_create_team(&team_id);
        if team_is_new {
            self.metrics.teams_created.fetch_add(1, Ordering::Relaxed);
        }

        let client = match room.get_client(candidate) {
            Some(existing) => {
                // Reusing an offline record keeps prior `state` fields
                // outside what this handshake overwrites, so overlay the
                // fresh `clientState` onto the stored state rather than
                // replacing it outright.
                let mut merged = existing.state();
                match (merged.as_object_mut(), client_state.as_object()) {
                    (Some(existing_obj), Some(update_obj)) => {
                        for (key, value) in update_obj {
                            existing_obj.insert(key.clone(), value.clone());
                        }
                    }
                    _ => merged = client_state,
                }
                existing.reattach(writer, merged, team_id, ip_hash);
                existing
            }
            None => {
                let record = ClientRecord::new(candidate, writer, client_state, team_id, ip_hash);
                room.insert_client(Arc::clone(&record));
                record
            }
        };

        self.online.insert(candidate, Arc::clone(&client));
        self.metrics.handshakes.fetch_add(1, Ordering::Relaxed);
        (room, client)
    }

    pub fn get_room(&self, room_id: &str) -> Option<Arc<Room>> {
        self.rooms.get(room_id).map(|r| Arc::clone(&r))
    }

    pub fn get_online_client(&self, id: ClientId) -> Option<Arc<ClientRecord>> {
        self.online.get(&id).map(|c| Arc::clone(&c))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn online_count(&self) -> usize {
        self.online.len()
    }

    pub fn rooms_snapshot(&self) -> Vec<Arc<Room>> {
        self.rooms.iter().map(|r| Arc::clone(r.value())).collect()
    }

    /// Looks a client up by id across every room, online or not. Used by
    /// console commands that take a bare client id (`banClient`,
    /// `getClientSHA`).
    pub fn find_client_anywhere(&self, id: ClientId) -> Option<Arc<ClientRecord>> {
        if let Some(client) = self.get_online_client(id) {
            return Some(client);
        }
        self.rooms.iter().find_map(|entry| entry.value().get_client(id))
    }

    pub fn delete_room(&self, room_id: &str) -> bool {
        self.rooms.remove(room_id).is_some()
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet_mode.load(Ordering::Relaxed)
    }

    pub fn toggle_quiet(&self) -> bool {
        let new_value = !self.quiet_mode.load(Ordering::Relaxed);
        self.quiet_mode.store(new_value, Ordering::Relaxed);
        new_value
    }

    // ---- bans --------------------------------------------------------

    pub fn ban_ip_hash(&self, hash: String) {
        self.ban_list.insert(hash);
    }

    pub fn unban_ip_hash(&self, hash: &str) {
        self.ban_list.remove(hash);
    }

    /// Clears only the ban list; `known_client_ips` ("seen this month") is
    /// left intact.
    pub fn unban_all(&self) {
        self.ban_list.clear();
    }

    pub fn ban_list_snapshot(&self) -> Vec<String> {
        self.ban_list.iter().map(|e| e.clone()).collect()
    }

    pub fn client_shas_snapshot(&self) -> Vec<String> {
        self.known_client_ips.iter().map(|e| e.clone()).collect()
    }

    // ---- sending ---------------------------------------------------------

    /// Writes one frame to one client with the configured write deadline.
    /// Any failure triggers `disconnect`; success refreshes `lastActivity`.
    pub async fn send_to_client(&self, client: &Arc<ClientRecord>, raw: &str) -> bool {
        let Some(socket) = client.socket() else {
            return false;
        };
        let deadline = Duration::from_secs(self.config.write_deadline_secs);
        let payload = raw.as_bytes().to_vec();

        let result = timeout(deadline, async {
            let mut guard = socket.lock().await;
            guard.write_all(&payload).await?;
            guard.write_all(&[0u8]).await?;
            guard.flush().await
        })
        .await;

        match result {
            Ok(Ok(())) => {
                client.touch();
                true
            }
            _ => {
                self.disconnect(client).await;
                false
            }
        }
    }

    /// Closes the socket if present, marks the client record offline, and
    /// drops it from the online index. The record remains in its room.
    pub async fn disconnect(&self, client: &Arc<ClientRecord>) {
        if let Some(socket) = client.take_socket() {
            let mut guard = socket.lock().await;
            let _ = guard.shutdown().await;
        }
        client.mark_offline();
        self.online.remove(&client.id);
        self.metrics.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Bans the peer behind `client`, notifies it, and disconnects it.
    /// Shared by the invalid-packet threshold and the `banClient` console
    /// command.
    pub async fn ban_client(self: &Arc<Self>, client: &Arc<ClientRecord>) {
        self.ban_ip_hash(client.ip_hash());
        self.metrics.connections_banned.fetch_add(1, Ordering::Relaxed);
        self.metrics.invalid_packet_closures.fetch_add(1, Ordering::Relaxed);
        self.disconnect(client).await;
    }

    // ---- broadcast -----------------------------------------------------

    /// Fans a raw frame out to every member of `room` except `origin`,
    /// each send on its own task so one slow peer cannot block the others.
    pub async fn broadcast_to_room(self: &Arc<Self>, room: &Arc<Room>, raw: &str, origin: ClientId) {
        let recipients = room.clients_snapshot();
        self.fan_out(recipients, raw, origin).await;
        self.metrics.broadcasts_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Same fan-out, restricted to members currently on `team_id`.
    pub async fn broadcast_to_team(
        self: &Arc<Self>,
        room: &Arc<Room>,
        team_id: &str,
        raw: &str,
        origin: ClientId,
    ) {
        let recipients = room.members_of_team(team_id);
        self.fan_out(recipients, raw, origin).await;
        self.metrics.broadcasts_sent.fetch_add(1, Ordering::Relaxed);
    }

    async fn fan_out(self: &Arc<Self>, recipients: Vec<Arc<ClientRecord>>, raw: &str, origin: ClientId) {
        let mut tasks = Vec::with_capacity(recipients.len());
        for client in recipients {
            if client.id == origin {
                continue;
            }
            let relay = Arc::clone(self);
            let raw = raw.to_string();
            tasks.push(tokio::spawn(async move {
                relay.send_to_client(&client, &raw).await;
            }));
        }
        for task in tasks {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "broadcast send task panicked");
            }
        }
    }

    /// Builds `{type: ALL_CLIENT_STATE, state: [...]}` once, toggling a
    /// `self` marker on the recipient's own entry before each send and
    /// clearing it before the next. Offline members are included in the
    /// list but receive no copy.
    pub async fn broadcast_all_client_state(self: &Arc<Self>, room: &Arc<Room>) {
        let members = room.clients_snapshot();
        let mut states: Vec<Value> = members.iter().map(|c| c.state()).collect();

        for (index, recipient) in members.iter().enumerate() {
            if !recipient.is_online() {
                continue;
            }
            if let Some(obj) = states[index].as_object_mut() {
                obj.insert("self".to_string(), json!(true));
            }
            let packet = json!({ "type": "ALL_CLIENT_STATE", "state": states });
            let raw = serde_json::to_string(&packet).unwrap_or_default();
            self.send_to_client(recipient, &raw).await;
            if let Some(obj) = states[index].as_object_mut() {
                obj.remove("self");
            }
        }
        self.metrics.broadcasts_sent.fetch_add(1, Ordering::Relaxed);
    }

    // ---- periodic tasks --------------------------------------------------

    /// Deletes any room idle longer than `inactivity_threshold_secs`.
    pub async fn sweep_inactive_rooms(&self) {
        let threshold = Duration::from_secs(self.config.inactivity_threshold_secs);
        let now = Instant::now();
        let stale: Vec<String> = self
            .rooms
            .iter()
            .filter(|entry| match entry.value().last_activity() {
                Some(last) => now.duration_since(last) >= threshold,
                None => true,
            })
            .map(|entry| entry.key().clone())
            .collect();

        for room_id in stale {
            if self.rooms.remove(&room_id).is_some() {
                self.metrics.rooms_swept.fetch_add(1, Ordering::Relaxed);
                tracing::info!(room_id, "swept inactive room");
            }
        }
    }

    /// Sends a quiet heartbeat to every online client idle longer than the
    /// heartbeat period.
    pub async fn send_liveness_heartbeats(self: &Arc<Self>) {
        let threshold = Duration::from_secs(self.config.heartbeat_period_secs);
        let now = Instant::now();
        let idle: Vec<Arc<ClientRecord>> = self
            .online
            .iter()
            .filter(|entry| now.duration_since(entry.value().last_activity()) >= threshold)
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let packet = json!({ "type": "HEARTBEAT", "quiet": true }).to_string();
        for client in idle {
            self.send_to_client(&client, &packet).await;
        }
    }

    /// Resets monthly counters atomically with the month boundary, then
    /// persists the stats file.
    pub async fn run_stats_heartbeat(&self) {
        let now_month = chrono::Utc::now().format("%Y-%m").to_string();
        let now_month_num = month_sentinel(&now_month);
        let previous = self.current_month.swap(now_month_num, Ordering::SeqCst);
        if previous != now_month_num && previous != 0 {
            self.monthly_games_complete.store(0, Ordering::SeqCst);
        }

        let snapshot = self.stats_snapshot();
        if let Err(err) = StatsStore::save(&self.stats_path, &snapshot).await {
            tracing::error!(error = %err, "failed to persist stats");
        }
    }

    pub fn stats_snapshot(&self) -> crate::stats::StatsSnapshot {
        crate::stats::StatsSnapshot {
            total_games_complete_count: self.total_games_complete.load(Ordering::Relaxed),
            monthly_games_complete_count: self.monthly_games_complete.load(Ordering::Relaxed),
            current_month: self.current_month.load(Ordering::Relaxed),
            unique_count: self.next_client_id.load(Ordering::Relaxed).saturating_sub(1).max(1),
            online_count: self.online_count() as u64,
            last_stats_heartbeat: chrono::Utc::now().to_rfc3339(),
            ban_list: self.ban_list_snapshot(),
            client_shas: self.client_shas_snapshot(),
        }
    }
}

/// Packs a `YYYY-MM` string into a comparable integer sentinel so
/// `current_month` stays a plain atomic scalar.
fn month_sentinel(formatted: &str) -> u32 {
    formatted
        .replace('-', "")
        .parse()
        .unwrap_or(0)
}

async fn reject_banned_connection(stream: TcpStream) {
    let mut writer = BufWriter::new(stream);
    let message = json!({
        "type": "SERVER_MESSAGE",
        "message": "Your IP address has been banned from this server.",
    });
    let disable = json!({ "type": "DISABLE_ANCHOR" });
    for frame in [message, disable] {
        let mut bytes = serde_json::to_vec(&frame).unwrap_or_default();
        bytes.push(0);
        if writer.write_all(&bytes).await.is_err() {
            return;
        }
    }
    let _ = writer.flush().await;
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_sentinel_is_monotonic_within_a_year() {
        assert!(month_sentinel("2026-07") > month_sentinel("2026-06"));
        assert!(month_sentinel("2027-01") > month_sentinel("2026-12"));
    }
}
