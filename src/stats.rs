//! Persisted counters and ban list.
//!
//! The stats file is the only thing that survives a restart: games-complete
//! counters, the current month sentinel, the set of IP hashes ever seen, and
//! the ban list. Everything else (rooms, teams, online clients) is rebuilt
//! from scratch.

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    #[serde(rename = "totalGamesCompleteCount", default)]
    pub total_games_complete_count: u64,
    #[serde(rename = "monthlyGamesCompleteCount", default)]
    pub monthly_games_complete_count: u64,
    #[serde(rename = "currentMonth", default)]
    pub current_month: u32,
    #[serde(rename = "uniqueCount", default)]
    pub unique_count: u64,
    #[serde(rename = "onlineCount", default)]
    pub online_count: u64,
    #[serde(rename = "lastStatsHeartbeat", default)]
    pub last_stats_heartbeat: String,
    #[serde(rename = "banList", default)]
    pub ban_list: Vec<String>,
    #[serde(rename = "clientSHAs", default)]
    pub client_shas: Vec<String>,
}

impl Default for StatsSnapshot {
    fn default() -> Self {
        Self {
            total_games_complete_count: 0,
            monthly_games_complete_count: 0,
            current_month: 0,
            unique_count: 1,
            online_count: 0,
            last_stats_heartbeat: String::new(),
            ban_list: Vec::new(),
            client_shas: Vec::new(),
        }
    }
}

pub type StatsStore = StatsSnapshot;

impl StatsSnapshot {
    /// Loads the stats file. A missing file is not an error — a fresh
    /// deployment simply starts from defaults.
    pub async fn load(path: &str) -> Result<Self, StoreError> {
        let mut file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(StoreError::Read {
                    path: path.to_string(),
                    source: err,
                })
            }
        };

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .await
            .map_err(|err| StoreError::Read {
                path: path.to_string(),
                source: err,
            })?;

        serde_json::from_str(&contents).map_err(|err| StoreError::Decode {
            path: path.to_string(),
            source: err,
        })
    }

    /// Replaces the stats file wholesale.
    pub async fn save(path: &str, snapshot: &StatsSnapshot) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(snapshot).map_err(|err| StoreError::Decode {
            path: path.to_string(),
            source: err,
        })?;

        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|err| StoreError::Write {
                path: path.to_string(),
                source: err,
            })?;
        file.write_all(&body).await.map_err(|err| StoreError::Write {
            path: path.to_string(),
            source: err,
        })?;
        file.flush().await.map_err(|err| StoreError::Write {
            path: path.to_string(),
            source: err,
        })
    }
}
