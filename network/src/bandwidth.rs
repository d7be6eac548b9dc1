//! Outbound bandwidth shaping.
//!
//! One token bucket per traffic class. Channels acquire bandwidth in large
//! chunks before writing, so the bucket is consulted relatively rarely even
//! on busy channels.

use std::sync::Mutex;
use std::time::Instant;

use crate::traffic_type::TrafficType;

/// Bytes-per-second budgets per traffic class. Zero means unlimited.
#[derive(Clone, Copy, Debug)]
pub struct BandwidthLimits {
    pub generic_bytes_per_sec: u64,
    pub bootstrap_bytes_per_sec: u64,
}

impl Default for BandwidthLimits {
    fn default() -> Self {
        Self {
            generic_bytes_per_sec: 10 * 1024 * 1024,
            bootstrap_bytes_per_sec: 5 * 1024 * 1024,
        }
    }
}

struct Bucket {
    rate: u64,
    tokens: u64,
    last_refill: Instant,
}

impl Bucket {
    fn new(rate: u64) -> Self {
        Self {
            rate,
            tokens: rate,
            last_refill: Instant::now(),
        }
    }

    fn try_consume(&mut self, bytes: u64) -> bool {
        if self.rate == 0 {
            return true;
        }
        self.refill();
        if self.tokens >= bytes {
            self.tokens -= bytes;
            true
        } else {
            false
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(self.last_refill).as_millis() as u64;
        let new_tokens = elapsed_ms.saturating_mul(self.rate) / 1000;
        // Cap at 2x the rate to bound bursts.
        self.tokens = (self.tokens + new_tokens).min(self.rate * 2);
        self.last_refill = now;
    }
}

/// Node-wide outbound limiter shared by every channel.
pub struct OutboundBandwidthLimiter {
    buckets: [Mutex<Bucket>; 2],
}

impl OutboundBandwidthLimiter {
    pub fn new(limits: BandwidthLimits) -> Self {
        Self {
            buckets: [
                Mutex::new(Bucket::new(limits.generic_bytes_per_sec)),
                Mutex::new(Bucket::new(limits.bootstrap_bytes_per_sec)),
            ],
        }
    }

    /// Whether `size` bytes of `traffic_type` may pass now. Consumes the
    /// tokens on success.
    pub fn should_pass(&self, size: u64, traffic_type: TrafficType) -> bool {
        self.buckets[traffic_type.index()]
            .lock()
            .unwrap()
            .try_consume(size)
    }
}

impl Default for OutboundBandwidthLimiter {
    fn default() -> Self {
        Self::new(BandwidthLimits::default())
    }
}
