//! Per-connection state machine: frames a raw TCP stream, negotiates the
//! handshake, and dispatches every subsequent packet by type.

use crate::codec::{FrameSplitter, Packet};
use crate::model::client::SharedWriter;
use crate::model::{ClientRecord, Room, Team};
use crate::relay::Relay;
use crate::security::hash_ip;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;

#[derive(Debug, PartialEq, Eq)]
enum State {
    AwaitingHandshake,
    Active,
}

/// Whether a processed frame counted against the invalid-packet threshold,
/// and whether it resets that counter back to zero.
enum FrameOutcome {
    Invalid,
    Accepted { resets_invalid_counter: bool },
}

/// Owns one accepted socket for its lifetime: reads frames, tracks the
/// handshake/active state, and counts invalid packets toward the ban
/// threshold.
pub async fn handle_connection(relay: Arc<Relay>, stream: TcpStream, addr: SocketAddr) {
    let (mut read_half, write_half) = stream.into_split();
    let writer: SharedWriter = Arc::new(AsyncMutex::new(write_half));

    let mut splitter = FrameSplitter::default();
    let mut read_buf = [0u8; 8192];
    let mut state = State::AwaitingHandshake;
    let mut invalid_packets: u32 = 0;
    let mut room: Option<Arc<Room>> = None;
    let mut client: Option<Arc<ClientRecord>> = None;

    loop {
        let n = match read_half.read(&mut read_buf).await {
            Ok(0) => {
                if let Some(frame) = splitter.finish() {
                    let outcome = handle_frame(&relay, &mut state, &mut room, &mut client, &frame, addr, &writer).await;
                    handle_invalid_threshold(&relay, &mut invalid_packets, outcome, &client, addr).await;
                }
                break;
            }
            Ok(n) => n,
            Err(err) => {
                tracing::debug!(%addr, error = %err, "read error, closing connection");
                break;
            }
        };
        splitter.push(&read_buf[..n]);

        while let Some(frame) = splitter.next_frame() {
            let outcome = handle_frame(&relay, &mut state, &mut room, &mut client, &frame, addr, &writer).await;
            if handle_invalid_threshold(&relay, &mut invalid_packets, outcome, &client, addr).await {
                return;
            }
        }
    }

    if let Some(c) = &client {
        relay.disconnect(c).await;
    }
}

/// Applies one frame's outcome to the running invalid-packet count, banning
/// and tearing down the connection once the threshold is hit — whether or
/// not a handshake ever completed. Returns `true` in that case; the caller
/// must stop reading.
async fn handle_invalid_threshold(
    relay: &Arc<Relay>,
    invalid_packets: &mut u32,
    outcome: FrameOutcome,
    client: &Option<Arc<ClientRecord>>,
    addr: SocketAddr,
) -> bool {
    match outcome {
        FrameOutcome::Accepted { resets_invalid_counter } => {
            if resets_invalid_counter {
                *invalid_packets = 0;
            }
            false
        }
        FrameOutcome::Invalid => {
            *invalid_packets += 1;
            if *invalid_packets < relay.config.invalid_packet_threshold {
                return false;
            }
            tracing::info!(%addr, "invalid packet threshold exceeded, banning");
            match client {
                Some(c) => relay.ban_client(c).await,
                None => {
                    relay.ban_ip_hash(hash_ip(addr.ip()));
                    relay.metrics.connections_banned.fetch_add(1, Ordering::Relaxed);
                    relay.metrics.invalid_packet_closures.fetch_add(1, Ordering::Relaxed);
                }
            }
            true
        }
    }
}

/// Parses and dispatches one frame.
async fn handle_frame(
    relay: &Arc<Relay>,
    state: &mut State,
    room: &mut Option<Arc<Room>>,
    client: &mut Option<Arc<ClientRecord>>,
    frame: &[u8],
    addr: SocketAddr,
    writer: &SharedWriter,
) -> FrameOutcome {
    let packet = match Packet::parse(frame) {
        Ok(packet) => packet,
        Err(err) => {
            tracing::debug!(%addr, error = %err, "dropping unparseable frame");
            return FrameOutcome::Invalid;
        }
    };

    // STATS is answered in any state and never affects the invalid-packet count.
    if packet.packet_type() == "STATS" {
        let snapshot = relay.stats_snapshot();
        let response = json!({ "type": "STATS", "stats": snapshot });
        let raw = serde_json::to_string(&response).unwrap_or_default();
        let mut guard = writer.lock().await;
        let _ = tokio::io::AsyncWriteExt::write_all(&mut *guard, raw.as_bytes()).await;
        let _ = tokio::io::AsyncWriteExt::write_all(&mut *guard, &[0u8]).await;
        let _ = tokio::io::AsyncWriteExt::flush(&mut *guard).await;
        return FrameOutcome::Accepted { resets_invalid_counter: false };
    }

    if *state == State::AwaitingHandshake {
        if packet.packet_type() != "HANDSHAKE" {
            // Ignored: the connection stays in AwaitingHandshake.
            return FrameOutcome::Accepted { resets_invalid_counter: false };
        }
        return handle_handshake(relay, state, room, client, &packet, writer, addr).await;
    }

    let (Some(room_ref), Some(client_ref)) = (room.as_ref(), client.as_ref()) else {
        return FrameOutcome::Invalid;
    };

    dispatch_active(relay, room_ref, client_ref, &packet, frame).await;
    FrameOutcome::Accepted { resets_invalid_counter: true }
}

async fn handle_handshake(
    relay: &Arc<Relay>,
    state: &mut State,
    room: &mut Option<Arc<Room>>,
    client: &mut Option<Arc<ClientRecord>>,
    packet: &Packet,
    writer: &SharedWriter,
    addr: SocketAddr,
) -> FrameOutcome {
    let room_id = match packet.get_str("roomId") {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => return FrameOutcome::Invalid,
    };
    let requested_id = packet.get_u64("clientId").unwrap_or(0);
    let client_state = packet.get("clientState").cloned().unwrap_or_else(|| json!({}));
    let ip_hash = hash_ip(addr.ip());

    let (new_room, new_client) =
        relay.register_client(&room_id, requested_id, client_state, Arc::clone(writer), ip_hash);

    *room = Some(Arc::clone(&new_room));
    *client = Some(Arc::clone(&new_client));
    *state = State::Active;

    relay.broadcast_all_client_state(&new_room).await;
    let room_state = json!({ "type": "UPDATE_ROOM_STATE", "state": new_room.state() });
    relay
        .send_to_client(&new_client, &serde_json::to_string(&room_state).unwrap_or_default())
        .await;

    FrameOutcome::Accepted { resets_invalid_counter: false }
}

async fn dispatch_active(relay: &Arc<Relay>, room: &Arc<Room>, client: &Arc<ClientRecord>, packet: &Packet, raw: &[u8]) {
    let raw_str = std::str::from_utf8(raw).unwrap_or_default();

    match packet.packet_type() {
        "UPDATE_CLIENT_STATE" => {
            let mut new_state = packet.get("state").cloned().unwrap_or_else(|| json!({}));
            if !new_state.is_object() {
                new_state = json!({});
            }
            if let Some(obj) = new_state.as_object_mut() {
                obj.insert("clientId".to_string(), json!(client.id));
            }
            let team_id = new_state
                .get("teamId")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            find_or_create_team_tracked(relay, room, &team_id);
            client.set_team_id(team_id);
            client.set_state(new_state);
            relay.broadcast_all_client_state(room).await;
        }
        "GAME_COMPLETE" => {
            relay.total_games_complete.fetch_add(1, Ordering::Relaxed);
            relay.monthly_games_complete.fetch_add(1, Ordering::Relaxed);
            relay.broadcast_to_room(room, raw_str, client.id).await;
        }
        "REQUEST_TEAM_STATE" => {
            let team_id = client.team_id();
            let team = find_or_create_team_tracked(relay, room, &team_id);
            let teammate_online_with_save = room
                .members_of_team(&team_id)
                .iter()
                .any(|peer| peer.id != client.id && peer.is_online() && peer.is_save_loaded());

            if teammate_online_with_save {
                team.push_requester(client.id);
                relay.broadcast_to_team(room, &team_id, raw_str, client.id).await;
            } else {
                let mut response = json!({ "type": "UPDATE_TEAM_STATE" });
                if !team.state_is_empty() {
                    response["state"] = team.state();
                }
                response["queue"] = json!(team.queue_snapshot());
                relay
                    .send_to_client(client, &serde_json::to_string(&response).unwrap_or_default())
                    .await;
            }
        }
        "UPDATE_TEAM_STATE" => {
            let team = find_or_create_team_tracked(relay, room, &client.team_id());
            let incoming_state = packet.get("state").cloned().unwrap_or_else(|| json!({}));
            team.set_state(incoming_state);

            let requesters = team.take_requesters_and_clear_queue();
            for requester_id in requesters {
                if let Some(requester) = room.get_client(requester_id) {
                    relay.send_to_client(&requester, raw_str).await;
                }
            }
        }
        "UPDATE_ROOM_STATE" => {
            if let Some(state) = packet.get("state").cloned() {
                room.set_state(state);
            }
            relay.broadcast_to_room(room, raw_str, client.id).await;
        }
        _ => {
            if let Some(target_id) = packet.get_u64("targetClientId") {
                if let Some(target) = relay.get_online_client(target_id) {
                    relay.metrics.directed_sends.fetch_add(1, Ordering::Relaxed);
                    relay.send_to_client(&target, raw_str).await;
                }
            } else if packet.get_bool("addToQueue").unwrap_or(false) {
                let team = find_or_create_team_tracked(relay, room, &client.team_id());
                team.push_queue(raw_str.to_string());
                relay.broadcast_to_team(room, &client.team_id(), raw_str, client.id).await;
            } else {
                relay.broadcast_to_room(room, raw_str, client.id).await;
            }
        }
    }

    relay.metrics.packets_routed.fetch_add(1, Ordering::Relaxed);
}

fn find_or_create_team_tracked(relay: &Arc<Relay>, room: &Arc<Room>, team_id: &str) -> Arc<Team> {
    let (team, is_new) = room.find_or_create_team(team_id);
    if is_new {
        relay.metrics.teams_created.fetch_add(1, Ordering::Relaxed);
    }
    team
}
