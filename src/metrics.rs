//! Atomic counters tracking relay activity, mirrored to the `stats` console
//! command and `stats.json`. Pure instrumentation: no endpoint exposes these
//! directly.

use std::sync::atomic::{AtomicU64, Ordering};

/// Relay-wide activity counters. Every field is a monotonically increasing
/// count; readers use `Ordering::Relaxed` since these feed human-facing
/// reporting, not synchronization.
#[derive(Debug, Default)]
pub struct ServerMetrics {
    pub connections_accepted: AtomicU64,
    pub connections_banned: AtomicU64,
    pub disconnects: AtomicU64,
    pub invalid_packet_closures: AtomicU64,
    pub handshakes: AtomicU64,
    pub rooms_created: AtomicU64,
    pub rooms_swept: AtomicU64,
    pub teams_created: AtomicU64,
    pub packets_routed: AtomicU64,
    pub broadcasts_sent: AtomicU64,
    pub directed_sends: AtomicU64,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ServerMetricsSnapshot {
        ServerMetricsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_banned: self.connections_banned.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            invalid_packet_closures: self.invalid_packet_closures.load(Ordering::Relaxed),
            handshakes: self.handshakes.load(Ordering::Relaxed),
            rooms_created: self.rooms_created.load(Ordering::Relaxed),
            rooms_swept: self.rooms_swept.load(Ordering::Relaxed),
            teams_created: self.teams_created.load(Ordering::Relaxed),
            packets_routed: self.packets_routed.load(Ordering::Relaxed),
            broadcasts_sent: self.broadcasts_sent.load(Ordering::Relaxed),
            directed_sends: self.directed_sends.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time read of [`ServerMetrics`], suitable for logging or the
/// `stats` console command.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct ServerMetricsSnapshot {
    pub connections_accepted: u64,
    pub connections_banned: u64,
    pub disconnects: u64,
    pub invalid_packet_closures: u64,
    pub handshakes: u64,
    pub rooms_created: u64,
    pub rooms_swept: u64,
    pub teams_created: u64,
    pub packets_routed: u64,
    pub broadcasts_sent: u64,
    pub directed_sends: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn snapshot_reflects_increments() {
        let metrics = ServerMetrics::new();
        metrics.handshakes.fetch_add(3, Ordering::Relaxed);
        metrics.rooms_created.fetch_add(1, Ordering::Relaxed);

        let snap = metrics.snapshot();
        assert_eq!(snap.handshakes, 3);
        assert_eq!(snap.rooms_created, 1);
        assert_eq!(snap.connections_accepted, 0);
    }
}
