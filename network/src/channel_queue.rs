//! Per-channel send queue.
//!
//! One FIFO per traffic class. Accept threshold and full threshold differ so
//! the no-socket-drop policy can keep admitting important traffic after the
//! soft limit. Dequeue is round-robin across classes with a per-class
//! priority credit.

use std::collections::VecDeque;

use crate::channel::{Callback, SendError};
use crate::traffic_type::TrafficType;

/// Soft per-class limit: `max()` reports true at or above this size.
pub const MAX_QUEUE_SIZE: usize = 128;

/// An enqueued send: the wire bytes and the completion callback.
pub struct Entry {
    pub buffer: Vec<u8>,
    pub callback: Option<Callback>,
}

impl Entry {
    /// Run the callback with the outcome of this send.
    pub fn complete(mut self, result: Result<usize, SendError>) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }
}

/// The two per-class FIFOs with round-robin scheduling state.
pub struct ChannelQueue {
    queues: [VecDeque<Entry>; 2],
    /// Index of the class currently being drained.
    current: usize,
    /// Entries taken from the current class since the last seek.
    counter: usize,
}

impl ChannelQueue {
    pub fn new() -> Self {
        Self {
            queues: [VecDeque::new(), VecDeque::new()],
            current: 0,
            counter: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(|queue| queue.is_empty())
    }

    pub fn len(&self) -> usize {
        self.queues.iter().map(|queue| queue.len()).sum()
    }

    pub fn len_of(&self, traffic_type: TrafficType) -> usize {
        self.queues[traffic_type.index()].len()
    }

    /// At or above the soft limit.
    pub fn max(&self, traffic_type: TrafficType) -> bool {
        self.len_of(traffic_type) >= MAX_QUEUE_SIZE
    }

    /// At or above the hard limit; nothing more is accepted.
    pub fn full(&self, traffic_type: TrafficType) -> bool {
        self.len_of(traffic_type) >= MAX_QUEUE_SIZE * 2
    }

    /// Admission is checked by the caller against `max`/`full`.
    pub fn push(&mut self, traffic_type: TrafficType, entry: Entry) {
        debug_assert!(!self.full(traffic_type));
        self.queues[traffic_type.index()].push_back(entry);
    }

    /// Entries a class may deliver before yielding to the next class.
    fn priority(traffic_type: TrafficType) -> usize {
        match traffic_type {
            TrafficType::Generic => 1,
            TrafficType::Bootstrap => 1,
        }
    }

    fn current_type(&self) -> TrafficType {
        TrafficType::ALL[self.current]
    }

    fn should_seek(&self) -> bool {
        let queue = &self.queues[self.current];
        queue.is_empty() || self.counter >= Self::priority(self.current_type())
    }

    fn seek_next(&mut self) {
        self.counter = 0;
        loop {
            self.current = (self.current + 1) % self.queues.len();
            if !self.queues[self.current].is_empty() {
                return;
            }
        }
    }

    /// Take the next entry. The queue must not be empty.
    pub fn next(&mut self) -> (TrafficType, Entry) {
        debug_assert!(!self.is_empty());
        if self.should_seek() {
            self.seek_next();
        }
        self.counter += 1;
        let traffic_type = self.current_type();
        let entry = self.queues[self.current]
            .pop_front()
            .expect("seek_next always lands on a non-empty queue");
        (traffic_type, entry)
    }

    /// Take up to `max_count` entries, honoring round-robin order.
    pub fn next_batch(&mut self, max_count: usize) -> Vec<(TrafficType, Entry)> {
        let mut batch = Vec::new();
        while !self.is_empty() && batch.len() < max_count {
            batch.push(self.next());
        }
        batch
    }
}

impl Default for ChannelQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(tag: u8) -> Entry {
        Entry {
            buffer: vec![tag],
            callback: None,
        }
    }

    #[test]
    fn new_queue_is_empty() {
        let queue = ChannelQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert!(!queue.max(TrafficType::Generic));
        assert!(!queue.full(TrafficType::Generic));
    }

    #[test]
    fn thresholds_per_class() {
        let mut queue = ChannelQueue::new();
        for i in 0..MAX_QUEUE_SIZE {
            queue.push(TrafficType::Generic, entry(i as u8));
        }
        assert!(queue.max(TrafficType::Generic));
        assert!(!queue.full(TrafficType::Generic));
        assert!(!queue.max(TrafficType::Bootstrap));

        for i in 0..MAX_QUEUE_SIZE {
            queue.push(TrafficType::Generic, entry(i as u8));
        }
        assert!(queue.full(TrafficType::Generic));
    }

    #[test]
    fn fifo_within_class() {
        let mut queue = ChannelQueue::new();
        queue.push(TrafficType::Generic, entry(1));
        queue.push(TrafficType::Generic, entry(2));
        queue.push(TrafficType::Generic, entry(3));

        let batch = queue.next_batch(8);
        let tags: Vec<u8> = batch.iter().map(|(_, e)| e.buffer[0]).collect();
        assert_eq!(tags, vec![1, 2, 3]);
    }

    #[test]
    fn round_robin_across_classes() {
        let mut queue = ChannelQueue::new();
        queue.push(TrafficType::Generic, entry(1));
        queue.push(TrafficType::Generic, entry(2));
        queue.push(TrafficType::Bootstrap, entry(10));
        queue.push(TrafficType::Bootstrap, entry(11));

        let batch = queue.next_batch(8);
        let types: Vec<TrafficType> = batch.iter().map(|(t, _)| *t).collect();
        // Priority credit is 1 for both classes, so they alternate.
        assert_eq!(
            types,
            vec![
                TrafficType::Generic,
                TrafficType::Bootstrap,
                TrafficType::Generic,
                TrafficType::Bootstrap,
            ]
        );
    }

    #[test]
    fn next_batch_respects_max_count() {
        let mut queue = ChannelQueue::new();
        for i in 0..10 {
            queue.push(TrafficType::Generic, entry(i));
        }
        assert_eq!(queue.next_batch(4).len(), 4);
        assert_eq!(queue.len(), 6);
    }

    #[test]
    fn exhausted_class_yields_to_other() {
        let mut queue = ChannelQueue::new();
        queue.push(TrafficType::Bootstrap, entry(10));
        queue.push(TrafficType::Bootstrap, entry(11));

        let batch = queue.next_batch(8);
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|(t, _)| *t == TrafficType::Bootstrap));
    }
}
