//! Representative tiers for vote admission control.
//!
//! The vote processor drops low-tier representatives first as its queue
//! fills. Tiers are recomputed periodically from the weight table against
//! the trended online weight: tier 1 holds at least 5%, tier 2 at least 1%,
//! tier 3 at least 0.1%.

use std::collections::{HashMap, HashSet};

use lattice_types::{Account, Amount};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RepTier {
    /// Below the tier-3 cutoff; not a representative worth queue space
    /// under pressure.
    None,
    Tier3,
    Tier2,
    Tier1,
}

/// Snapshot of representative tiers.
pub struct RepTiers {
    tier_1: HashSet<Account>,
    tier_2: HashSet<Account>,
    tier_3: HashSet<Account>,
}

impl RepTiers {
    pub fn new() -> Self {
        Self {
            tier_1: HashSet::new(),
            tier_2: HashSet::new(),
            tier_3: HashSet::new(),
        }
    }

    /// Recompute every tier from current weights. Tiers nest: a tier-1
    /// representative is also in tiers 2 and 3.
    pub fn calculate_weights(&mut self, weights: &HashMap<Account, Amount>, trended: Amount) {
        self.tier_1.clear();
        self.tier_2.clear();
        self.tier_3.clear();
        let supply = trended.number();
        if supply == 0 {
            return;
        }
        for (&rep, &weight) in weights {
            let w = weight.number();
            if w >= supply / 1000 {
                self.tier_3.insert(rep);
            }
            if w >= supply / 100 {
                self.tier_2.insert(rep);
            }
            if w >= supply / 20 {
                self.tier_1.insert(rep);
            }
        }
    }

    pub fn tier(&self, rep: &Account) -> RepTier {
        if self.tier_1.contains(rep) {
            RepTier::Tier1
        } else if self.tier_2.contains(rep) {
            RepTier::Tier2
        } else if self.tier_3.contains(rep) {
            RepTier::Tier3
        } else {
            RepTier::None
        }
    }
}

impl Default for RepTiers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rep(byte: u8) -> Account {
        Account::new([byte; 32])
    }

    #[test]
    fn tiers_by_weight_share() {
        let mut tiers = RepTiers::new();
        let trended = Amount::raw(100_000);
        let mut weights = HashMap::new();
        weights.insert(rep(1), Amount::raw(10_000)); // 10% -> tier 1
        weights.insert(rep(2), Amount::raw(2_000)); // 2% -> tier 2
        weights.insert(rep(3), Amount::raw(200)); // 0.2% -> tier 3
        weights.insert(rep(4), Amount::raw(10)); // 0.01% -> none

        tiers.calculate_weights(&weights, trended);
        assert_eq!(tiers.tier(&rep(1)), RepTier::Tier1);
        assert_eq!(tiers.tier(&rep(2)), RepTier::Tier2);
        assert_eq!(tiers.tier(&rep(3)), RepTier::Tier3);
        assert_eq!(tiers.tier(&rep(4)), RepTier::None);
    }

    #[test]
    fn recalculation_replaces_old_tiers() {
        let mut tiers = RepTiers::new();
        let mut weights = HashMap::new();
        weights.insert(rep(1), Amount::raw(10_000));
        tiers.calculate_weights(&weights, Amount::raw(100_000));
        assert_eq!(tiers.tier(&rep(1)), RepTier::Tier1);

        weights.insert(rep(1), Amount::raw(10));
        tiers.calculate_weights(&weights, Amount::raw(100_000));
        assert_eq!(tiers.tier(&rep(1)), RepTier::None);
    }

    #[test]
    fn zero_supply_means_no_tiers() {
        let mut tiers = RepTiers::new();
        let mut weights = HashMap::new();
        weights.insert(rep(1), Amount::raw(10_000));
        tiers.calculate_weights(&weights, Amount::ZERO);
        assert_eq!(tiers.tier(&rep(1)), RepTier::None);
    }
}
