//! Operator console: a line-oriented command loop over stdin.

use crate::relay::Relay;
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

const DEFAULT_DISABLE_MESSAGE: &str = "The server is shutting down for maintenance.";

const HELP: &str = "\
commands:
  roomCount                 number of active rooms
  clientCount               number of online clients
  stats                     current counters and stats snapshot
  quiet                     toggle quiet heartbeat mode
  list                      list rooms and their members
  message <id> <text>       send a SERVER_MESSAGE to one client
  messageAll <text>         send a SERVER_MESSAGE to every online client
  disable <id>              tell one client to disable its anchor and disconnect
  disableAll                tell every online client to disable its anchor and disconnect
  deleteRoom <roomId>       force-delete a room
  banIP <hash>              add an IP hash to the ban list
  unbanIP <hash>            remove an IP hash from the ban list
  unbanAll                  clear the ban list
  banClient <id>            ban and disconnect one client by id
  getClientSHA <id>         print the IP hash for one client
  stop                      shut the server down";

/// Runs until `stop` is entered or stdin closes. Returns when the operator
/// asked for shutdown.
pub async fn run(relay: Arc<Relay>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(err) => {
                tracing::warn!(error = %err, "console read error");
                return;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match command {
            "roomCount" => println!("{}", relay.room_count()),
            "clientCount" => println!("{}", relay.online_count()),
            "stats" => {
                let stats = relay.stats_snapshot();
                let metrics = relay.metrics.snapshot();
                println!("{}", serde_json::to_string_pretty(&json!({ "stats": stats, "metrics": metrics })).unwrap_or_default());
            }
            "quiet" => println!("quiet mode: {}", relay.toggle_quiet()),
            "list" => list_rooms(&relay),
            "message" => message_one(&relay, rest).await,
            "messageAll" => message_all(&relay, rest).await,
            "disable" => disable_one(&relay, rest).await,
            "disableAll" => disable_all(&relay).await,
            "deleteRoom" => {
                let deleted = relay.delete_room(rest);
                println!("{}", if deleted { "deleted" } else { "no such room" });
            }
            "banIP" => {
                relay.ban_ip_hash(rest.to_string());
                println!("banned");
            }
            "unbanIP" => {
                relay.unban_ip_hash(rest);
                println!("unbanned");
            }
            "unbanAll" => {
                relay.unban_all();
                println!("ban list cleared");
            }
            "banClient" => ban_client(&relay, rest).await,
            "getClientSHA" => get_client_sha(&relay, rest),
            "stop" => {
                println!("stopping");
                return;
            }
            _ => println!("{HELP}"),
        }
    }
}

fn list_rooms(relay: &Arc<Relay>) {
    for room in relay.rooms_snapshot() {
        let members = room.clients_snapshot();
        let ids: Vec<String> = members
            .iter()
            .map(|c| format!("{}{}", c.id, if c.is_online() { "" } else { "(offline)" }))
            .collect();
        println!("{}: [{}]", room.id, ids.join(", "));
    }
}

async fn message_one(relay: &Arc<Relay>, rest: &str) {
    let (id, text) = match rest.split_once(char::is_whitespace) {
        Some((id, text)) => (id, text.trim()),
        None => (rest, DEFAULT_DISABLE_MESSAGE),
    };
    let Ok(id) = id.parse::<u64>() else {
        println!("invalid client id");
        return;
    };
    let Some(client) = relay.find_client_anywhere(id) else {
        println!("no such client");
        return;
    };
    let packet = json!({ "type": "SERVER_MESSAGE", "message": text });
    relay.send_to_client(&client, &serde_json::to_string(&packet).unwrap_or_default()).await;
}

async fn message_all(relay: &Arc<Relay>, rest: &str) {
    let text = if rest.is_empty() { DEFAULT_DISABLE_MESSAGE } else { rest };
    let packet = json!({ "type": "SERVER_MESSAGE", "message": text }).to_string();
    for room in relay.rooms_snapshot() {
        for client in room.clients_snapshot() {
            if client.is_online() {
                relay.send_to_client(&client, &packet).await;
            }
        }
    }
}

async fn disable_one(relay: &Arc<Relay>, rest: &str) {
    let Ok(id) = rest.trim().parse::<u64>() else {
        println!("invalid client id");
        return;
    };
    let Some(client) = relay.find_client_anywhere(id) else {
        println!("no such client");
        return;
    };
    let packet = json!({ "type": "DISABLE_ANCHOR" }).to_string();
    relay.send_to_client(&client, &packet).await;
    relay.disconnect(&client).await;
}

async fn disable_all(relay: &Arc<Relay>) {
    let packet = json!({ "type": "DISABLE_ANCHOR" }).to_string();
    for room in relay.rooms_snapshot() {
        for client in room.clients_snapshot() {
            if client.is_online() {
                relay.send_to_client(&client, &packet).await;
                relay.disconnect(&client).await;
            }
        }
    }
}

async fn ban_client(relay: &Arc<Relay>, rest: &str) {
    let Ok(id) = rest.trim().parse::<u64>() else {
        println!("invalid client id");
        return;
    };
    let Some(client) = relay.find_client_anywhere(id) else {
        println!("no such client");
        return;
    };
    relay.ban_client(&client).await;
    println!("banned and disconnected {id}");
}

fn get_client_sha(relay: &Arc<Relay>, rest: &str) {
    let Ok(id) = rest.trim().parse::<u64>() else {
        println!("invalid client id");
        return;
    };
    match relay.find_client_anywhere(id) {
        Some(client) => println!("{}", client.ip_hash()),
        None => println!("no such client"),
    }
}
