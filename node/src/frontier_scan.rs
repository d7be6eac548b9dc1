//! Frontier scan — range-partitioned exploration of the account space.
//!
//! The 256-bit account space is divided into equal consecutive ranges, one
//! head each. `next` serves the least-recently-used head's position to a
//! requester; `process` folds a frontier response back in, and once a head
//! has seen enough responses its position jumps to a collected candidate.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lattice_types::{Account, BlockHash};
use lattice_utils::{DetailType, StatType, Stats};

#[derive(Clone, Debug)]
pub struct FrontierScanConfig {
    /// Number of heads the account space is divided into.
    pub head_parallelism: u64,
    /// Responses a head must collect before its position advances.
    pub consideration_count: usize,
    /// Candidate rank the position advances to.
    pub candidates_target: usize,
    /// A head that served a request is not served again within this window
    /// unless it is still collecting responses.
    pub cooldown: Duration,
}

impl Default for FrontierScanConfig {
    fn default() -> Self {
        Self {
            head_parallelism: 128,
            consideration_count: 4,
            candidates_target: 1000,
            cooldown: Duration::from_secs(5),
        }
    }
}

/// One slice of the account space.
pub struct FrontierHead {
    pub start: Account,
    /// Exclusive upper bound (the final head's bound is the max account).
    pub end: Account,
    /// Position the next request starts from; `start <= next < end`.
    pub next: Account,
    pub requests: usize,
    pub completed: usize,
    pub candidates: BTreeSet<Account>,
    pub timestamp: Option<Instant>,
}

/// The scanner over all heads.
pub struct FrontierScan {
    config: FrontierScanConfig,
    stats: Arc<Stats>,
    heads: Vec<FrontierHead>,
}

impl FrontierScan {
    pub fn new(config: FrontierScanConfig, stats: Arc<Stats>) -> Self {
        let heads = (0..config.head_parallelism)
            .map(|i| {
                let (start, end) = Account::range_bounds(i, config.head_parallelism);
                FrontierHead {
                    start,
                    end,
                    next: start,
                    requests: 0,
                    completed: 0,
                    candidates: BTreeSet::new(),
                    timestamp: None,
                }
            })
            .collect();
        Self {
            config,
            stats,
            heads,
        }
    }

    /// The position of the next head to query: least recently served first,
    /// fewest requests on ties. Returns the zero account when every head is
    /// saturated and inside its cooldown.
    pub fn next(&mut self) -> Account {
        let now = Instant::now();
        let cooldown = self.config.cooldown;
        let consideration_count = self.config.consideration_count;

        let mut order: Vec<usize> = (0..self.heads.len()).collect();
        order.sort_by_key(|&i| (self.heads[i].timestamp, self.heads[i].requests));

        for i in order {
            let head = &mut self.heads[i];
            let by_requests = head.requests < consideration_count;
            let by_timestamp = head
                .timestamp
                .map(|t| now.duration_since(t) >= cooldown)
                .unwrap_or(true);
            if by_requests || by_timestamp {
                self.stats.inc(
                    StatType::FrontierScan,
                    if by_requests {
                        DetailType::NextByRequests
                    } else {
                        DetailType::NextByTimestamp
                    },
                );
                debug_assert!(head.next >= head.start);
                debug_assert!(head.next < head.end);

                let result = head.next;
                head.requests += 1;
                head.timestamp = Some(now);
                return result;
            }
        }

        self.stats.inc(StatType::FrontierScan, DetailType::NextNone);
        Account::ZERO
    }

    /// Fold a frontier response for the range containing `start` into its
    /// head. Returns `true` when the head's position advanced.
    pub fn process(&mut self, start: Account, response: &[(Account, BlockHash)]) -> bool {
        debug_assert!(response.iter().all(|(account, _)| *account >= start));
        self.stats.inc(StatType::FrontierScan, DetailType::Process);

        // The head whose range contains `start`: the last head with
        // head.start <= start.
        let index = match self
            .heads
            .iter()
            .position(|head| head.start > start)
        {
            Some(0) => 0,
            Some(position) => position - 1,
            None => self.heads.len() - 1,
        };
        let candidates_target = self.config.candidates_target;
        let consideration_count = self.config.consideration_count;
        let head = &mut self.heads[index];

        head.completed += 1;
        for (account, _) in response {
            // Only candidates that would actually advance the position.
            if *account > head.next {
                head.candidates.insert(*account);
            }
        }

        let mut done = false;
        if head.completed >= consideration_count && !head.candidates.is_empty() {
            self.stats.inc(StatType::FrontierScan, DetailType::Done);

            let advance_to = head
                .candidates
                .iter()
                .take(head.candidates.len().min(candidates_target))
                .last()
                .copied()
                .expect("candidates is non-empty");
            debug_assert!(head.next < advance_to);
            head.next = advance_to;
            head.candidates.clear();
            head.requests = 0;
            head.completed = 0;
            head.timestamp = None;

            if head.next >= head.end {
                // Range exhausted; wrap to the start.
                self.stats.inc(StatType::FrontierScan, DetailType::DoneRange);
                head.next = head.start;
            }
            done = true;
        }
        done
    }

    /// Scan progress per head, in millionths of the range covered.
    pub fn progress(&self) -> Vec<u64> {
        self.heads
            .iter()
            .map(|head| {
                let start = head.start.as_bytes()[0] as u64;
                let next = head.next.as_bytes()[0] as u64;
                let end = head.end.as_bytes()[0] as u64;
                if end > start {
                    (next - start) * 1_000_000 / (end - start)
                } else {
                    0
                }
            })
            .collect()
    }

    pub fn head_count(&self) -> usize {
        self.heads.len()
    }

    #[cfg(test)]
    fn head(&self, index: usize) -> &FrontierHead {
        &self.heads[index]
    }
}
