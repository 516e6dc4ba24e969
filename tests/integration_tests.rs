use relay_server::config::RelayConfig;
use relay_server::relay::Relay;
use relay_server::stats::StatsSnapshot;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

fn test_config() -> RelayConfig {
    RelayConfig {
        heartbeat_period_secs: 1,
        inactivity_threshold_secs: 300,
        invalid_packet_threshold: 3,
        write_deadline_secs: 5,
    }
}

async fn spawn_relay(config: RelayConfig) -> (Arc<Relay>, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let stats = StatsSnapshot::default();
    let relay = Relay::new(config, "integration-test-stats.json".to_string(), &stats);
    tokio::spawn(Arc::clone(&relay).run_accept_loop(listener));
    (relay, addr)
}

async fn send_packet(stream: &mut TcpStream, value: &Value) {
    let mut bytes = serde_json::to_vec(value).unwrap();
    bytes.push(0);
    stream.write_all(&bytes).await.unwrap();
}

async fn send_garbage(stream: &mut TcpStream, bytes: &[u8]) {
    let mut frame = bytes.to_vec();
    frame.push(0);
    stream.write_all(&frame).await.unwrap();
}

async fn read_packet(stream: &mut TcpStream) -> Value {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await.unwrap();
        assert!(n > 0, "connection closed before a frame arrived");
        if byte[0] == 0 {
            break;
        }
        buf.push(byte[0]);
    }
    serde_json::from_slice(&buf).unwrap()
}

async fn read_packet_timeout(stream: &mut TcpStream) -> Option<Value> {
    tokio::time::timeout(Duration::from_millis(500), read_packet(stream))
        .await
        .ok()
}

fn handshake(room_id: &str, team_id: &str, extra: Value) -> Value {
    let mut state = json!({ "teamId": team_id });
    if let (Some(obj), Some(extra_obj)) = (state.as_object_mut(), extra.as_object()) {
        for (key, value) in extra_obj {
            obj.insert(key.clone(), value.clone());
        }
    }
    json!({
        "type": "HANDSHAKE",
        "clientId": 0,
        "roomId": room_id,
        "clientState": state,
    })
}

#[tokio::test]
async fn handshake_broadcasts_all_client_state_and_room_state() {
    let (_relay, addr) = spawn_relay(test_config()).await;
    let mut a = TcpStream::connect(addr).await.unwrap();

    send_packet(&mut a, &handshake("ROOM1", "T1", json!({ "scene": "lobby" }))).await;

    let all_state = read_packet(&mut a).await;
    assert_eq!(all_state["type"], "ALL_CLIENT_STATE");
    let members = all_state["state"].as_array().unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0]["self"], json!(true));
    assert_eq!(members[0]["scene"], "lobby");
    let owner_id = members[0]["clientId"].clone();

    let room_state = read_packet(&mut a).await;
    assert_eq!(room_state["type"], "UPDATE_ROOM_STATE");
    assert_eq!(room_state["state"]["ownerClientId"], owner_id);

    // A second client joining the same room gets its own ALL_CLIENT_STATE
    // reflecting both members, and the first client is re-broadcast to.
    let mut b = TcpStream::connect(addr).await.unwrap();
    send_packet(&mut b, &handshake("ROOM1", "T1", json!({ "scene": "lobby" }))).await;

    let a_refresh = read_packet(&mut a).await;
    assert_eq!(a_refresh["type"], "ALL_CLIENT_STATE");
    assert_eq!(a_refresh["state"].as_array().unwrap().len(), 2);

    let b_state = read_packet(&mut b).await;
    assert_eq!(b_state["state"].as_array().unwrap().len(), 2);
    let _ = read_packet(&mut b).await; // UPDATE_ROOM_STATE
}

#[tokio::test]
async fn request_team_state_synthesizes_a_reply_when_nobody_has_the_save() {
    // Scenario: only A is in the room/team, with isSaveLoaded:false.
    let (_relay, addr) = spawn_relay(test_config()).await;
    let mut a = TcpStream::connect(addr).await.unwrap();
    send_packet(&mut a, &handshake("ROOM2", "T1", json!({ "isSaveLoaded": false }))).await;
    let _ = read_packet(&mut a).await; // ALL_CLIENT_STATE
    let _ = read_packet(&mut a).await; // UPDATE_ROOM_STATE

    send_packet(
        &mut a,
        &json!({ "type": "REQUEST_TEAM_STATE", "targetTeamId": "T1", "clientId": 1 }),
    )
    .await;

    // No online-with-save-loaded teammate exists, so the server synthesizes
    // a reply from the (empty) team state instead of queuing the request.
    let reply = read_packet(&mut a).await;
    assert_eq!(reply["type"], "UPDATE_TEAM_STATE");
    assert!(reply.get("state").is_none());
    assert_eq!(reply["queue"], json!([]));

    // No further packets follow: the request was answered directly, not
    // broadcast to anyone.
    assert!(read_packet_timeout(&mut a).await.is_none());
}

#[tokio::test]
async fn update_team_state_handoff_delivers_exactly_one_copy_to_the_requester() {
    let (_relay, addr) = spawn_relay(test_config()).await;

    let mut a = TcpStream::connect(addr).await.unwrap();
    send_packet(&mut a, &handshake("ROOM3", "T1", json!({ "isSaveLoaded": false }))).await;
    let _ = read_packet(&mut a).await; // ALL_CLIENT_STATE
    let _ = read_packet(&mut a).await; // UPDATE_ROOM_STATE

    // A loads its save; its state now reports isSaveLoaded:true.
    send_packet(
        &mut a,
        &json!({ "type": "UPDATE_CLIENT_STATE", "state": { "teamId": "T1", "isSaveLoaded": true } }),
    )
    .await;
    let _ = read_packet(&mut a).await; // ALL_CLIENT_STATE refresh

    let mut b = TcpStream::connect(addr).await.unwrap();
    send_packet(&mut b, &handshake("ROOM3", "T1", json!({ "isSaveLoaded": false }))).await;
    let _ = read_packet(&mut a).await; // ALL_CLIENT_STATE refresh from b joining
    let _ = read_packet(&mut b).await; // ALL_CLIENT_STATE
    let _ = read_packet(&mut b).await; // UPDATE_ROOM_STATE

    // B requests the team state. A is online-with-save-loaded, so the
    // request is forwarded to the team (A) instead of answered directly.
    send_packet(
        &mut b,
        &json!({ "type": "REQUEST_TEAM_STATE", "targetTeamId": "T1", "clientId": 2 }),
    )
    .await;
    assert!(read_packet_timeout(&mut b).await.is_none());

    let forwarded = read_packet(&mut a).await;
    assert_eq!(forwarded["type"], "REQUEST_TEAM_STATE");

    // A answers with the save; the server delivers exactly one copy to B.
    send_packet(
        &mut a,
        &json!({ "type": "UPDATE_TEAM_STATE", "targetTeamId": "T1", "state": { "hp": 10 }, "clientId": 1 }),
    )
    .await;

    let answer = read_packet(&mut b).await;
    assert_eq!(answer["type"], "UPDATE_TEAM_STATE");
    assert_eq!(answer["state"]["hp"], 10);

    // No second copy, and A itself never receives its own answer back.
    assert!(read_packet_timeout(&mut b).await.is_none());
    assert!(read_packet_timeout(&mut a).await.is_none());
}

#[tokio::test]
async fn targeted_packets_are_delivered_only_to_the_named_client() {
    let (_relay, addr) = spawn_relay(test_config()).await;

    let mut a = TcpStream::connect(addr).await.unwrap();
    send_packet(&mut a, &handshake("ROOM4", "T1", json!({}))).await;
    let _ = read_packet(&mut a).await;
    let a_room_state = read_packet(&mut a).await;
    let a_id = a_room_state["state"]["ownerClientId"].as_u64().unwrap();

    let mut b = TcpStream::connect(addr).await.unwrap();
    send_packet(&mut b, &handshake("ROOM4", "T1", json!({}))).await;
    let _ = read_packet(&mut b).await;
    let _ = read_packet(&mut b).await;
    let _ = read_packet(&mut a).await; // refreshed ALL_CLIENT_STATE from b joining

    send_packet(&mut b, &json!({ "type": "PING", "targetClientId": a_id, "payload": "hi" })).await;

    let delivered = read_packet(&mut a).await;
    assert_eq!(delivered["type"], "PING");
    assert_eq!(delivered["payload"], "hi");

    // b never receives its own directed packet back.
    assert!(read_packet_timeout(&mut b).await.is_none());
}

#[tokio::test]
async fn idle_clients_receive_a_quiet_heartbeat() {
    let config = RelayConfig {
        heartbeat_period_secs: 0,
        ..test_config()
    };
    let (relay, addr) = spawn_relay(config).await;
    let mut a = TcpStream::connect(addr).await.unwrap();
    send_packet(&mut a, &handshake("ROOM5", "T1", json!({}))).await;
    let _ = read_packet(&mut a).await;
    let _ = read_packet(&mut a).await;

    tokio::time::sleep(Duration::from_millis(10)).await;
    relay.send_liveness_heartbeats().await;

    let heartbeat = read_packet(&mut a).await;
    assert_eq!(heartbeat["type"], "HEARTBEAT");
    assert_eq!(heartbeat["quiet"], json!(true));
}

#[tokio::test]
async fn invalid_packets_past_the_threshold_ban_the_connection() {
    let (_relay, addr) = spawn_relay(test_config()).await;
    let mut a = TcpStream::connect(addr).await.unwrap();

    for _ in 0..3 {
        send_garbage(&mut a, b"not json").await;
    }

    // The connection is dropped once the invalid-packet threshold is hit.
    let mut buf = [0u8; 1];
    let n = a.read(&mut buf).await.unwrap();
    assert_eq!(n, 0);

    // The banned IP is rejected outright on the next connection attempt.
    let mut retry = TcpStream::connect(addr).await.unwrap();
    let rejection = read_packet(&mut retry).await;
    assert_eq!(rejection["type"], "SERVER_MESSAGE");
    let disable = read_packet(&mut retry).await;
    assert_eq!(disable["type"], "DISABLE_ANCHOR");
}
