//! Unchecked map — blocks waiting on a missing dependency.
//!
//! Keyed by whatever the block is waiting for: its previous block, its
//! source block, or (for epoch opens) its account. When the dependency
//! arrives, `trigger` drains the waiters through the satisfied observer,
//! which the node wires back into the block processor.

use std::collections::HashMap;
use std::sync::Mutex;

use lattice_types::{Block, HashOrAccount};

type SatisfiedFn = Box<dyn Fn(Block) + Send + Sync>;

struct Inner {
    entries: HashMap<HashOrAccount, Vec<Block>>,
    count: usize,
}

/// Dependency-keyed block buffer.
pub struct UncheckedMap {
    inner: Mutex<Inner>,
    satisfied: Mutex<Option<SatisfiedFn>>,
    max_size: usize,
}

impl UncheckedMap {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                count: 0,
            }),
            satisfied: Mutex::new(None),
            max_size,
        }
    }

    /// Observer called with each block whose dependency was satisfied.
    pub fn set_satisfied_observer(&self, observer: SatisfiedFn) {
        *self.satisfied.lock().unwrap() = Some(observer);
    }

    /// Buffer `block` until `dependency` is seen. Silently dropped at
    /// capacity (spam bound).
    pub fn put(&self, dependency: HashOrAccount, block: Block) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.count >= self.max_size {
            return false;
        }
        inner.entries.entry(dependency).or_default().push(block);
        inner.count += 1;
        true
    }

    /// The dependency is now known: drain its waiters through the
    /// satisfied observer and return them.
    pub fn trigger(&self, dependency: &HashOrAccount) -> Vec<Block> {
        let drained = {
            let mut inner = self.inner.lock().unwrap();
            match inner.entries.remove(dependency) {
                Some(blocks) => {
                    inner.count -= blocks.len();
                    blocks
                }
                None => Vec::new(),
            }
        };
        if let Some(observer) = self.satisfied.lock().unwrap().as_ref() {
            for block in &drained {
                observer(block.clone());
            }
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
