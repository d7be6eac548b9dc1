//! Online representative weight tracking.
//!
//! Quorum and hinting thresholds are computed against the weight of
//! representatives seen voting recently, smoothed with a trend so temporary
//! dips do not collapse the thresholds.

use std::collections::HashMap;

use lattice_types::{Account, Amount};

/// EMA decay, percent kept per sample.
const TREND_DECAY_PCT: u128 = 95;

/// Tracks which representatives are online and the trended online weight.
pub struct OnlineReps {
    /// Representative -> timestamp of its most recent vote.
    last_seen: HashMap<Account, u64>,
    /// Representatives seen within this many seconds count as online.
    window_secs: u64,
    trended: Amount,
    minimum: Amount,
}

impl OnlineReps {
    pub fn new(window_secs: u64, minimum: Amount) -> Self {
        Self {
            last_seen: HashMap::new(),
            window_secs,
            trended: minimum,
            minimum,
        }
    }

    /// Record that a representative voted at `now`.
    pub fn observe(&mut self, rep: Account, now: u64) {
        let entry = self.last_seen.entry(rep).or_insert(0);
        if now > *entry {
            *entry = now;
        }
    }

    /// Sum the weight of representatives seen within the window.
    pub fn online(&self, weights: &HashMap<Account, Amount>, now: u64) -> Amount {
        let cutoff = now.saturating_sub(self.window_secs);
        self.last_seen
            .iter()
            .filter(|(_, &seen)| seen >= cutoff)
            .map(|(rep, _)| weights.get(rep).copied().unwrap_or(Amount::ZERO))
            .sum()
    }

    /// Fold a fresh online-weight sample into the trend.
    pub fn sample(&mut self, online: Amount) {
        let smoothed = Amount::raw(
            self.trended.number() / 100 * TREND_DECAY_PCT
                + online.number() / 100 * (100 - TREND_DECAY_PCT),
        );
        self.trended = smoothed.max(self.minimum);
    }

    /// The trended online weight, never below the configured floor.
    pub fn trended(&self) -> Amount {
        self.trended
    }
}
