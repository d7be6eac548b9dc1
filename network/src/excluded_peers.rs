//! Excluded peers — endpoints banned from reachout.

use std::collections::HashMap;
use std::net::SocketAddrV6;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Misbehavior score at which an address becomes excluded.
const SCORE_LIMIT: u64 = 2;
/// How long an exclusion lasts.
const EXCLUDE_DURATION: Duration = Duration::from_secs(60 * 60);
/// Bound on tracked addresses.
const MAX_SIZE: usize = 5000;

struct PeerRecord {
    score: u64,
    excluded_until: Option<Instant>,
    last_update: Instant,
}

/// Tracks misbehaving addresses; `check` gates reachout and inbound accepts.
pub struct ExcludedPeers {
    peers: Mutex<HashMap<std::net::Ipv6Addr, PeerRecord>>,
}

impl ExcludedPeers {
    pub fn new() -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
        }
    }

    /// Record one misbehavior for this address. Returns the new score.
    pub fn add(&self, endpoint: &SocketAddrV6) -> u64 {
        let mut peers = self.peers.lock().unwrap();
        if peers.len() >= MAX_SIZE {
            // Drop the stalest record to stay bounded.
            if let Some(oldest) = peers
                .iter()
                .min_by_key(|(_, record)| record.last_update)
                .map(|(addr, _)| *addr)
            {
                peers.remove(&oldest);
            }
        }
        let record = peers.entry(*endpoint.ip()).or_insert(PeerRecord {
            score: 0,
            excluded_until: None,
            last_update: Instant::now(),
        });
        record.score += 1;
        record.last_update = Instant::now();
        if record.score >= SCORE_LIMIT {
            record.excluded_until = Some(Instant::now() + EXCLUDE_DURATION);
        }
        record.score
    }

    /// Whether this address is currently excluded.
    pub fn check(&self, endpoint: &SocketAddrV6) -> bool {
        let peers = self.peers.lock().unwrap();
        peers
            .get(endpoint.ip())
            .and_then(|record| record.excluded_until)
            .map(|until| until > Instant::now())
            .unwrap_or(false)
    }

    pub fn remove(&self, endpoint: &SocketAddrV6) {
        self.peers.lock().unwrap().remove(endpoint.ip());
    }

    pub fn len(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.lock().unwrap().is_empty()
    }
}

impl Default for ExcludedPeers {
    fn default() -> Self {
        Self::new()
    }
}
