//! Generic bounded batch-processing queue.
//!
//! A reusable primitive: producers `add` elements, a pool of workers drains
//! them in batches through a caller-supplied callback. The queue is bounded
//! and drops on overflow (counted), never blocks producers. Used by the
//! pipelines that want parallel batch workers without bespoke thread code.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use lattice_utils::{DetailType, StatType, Stats};
use tracing::error;

type BatchFn<T> = Arc<dyn Fn(Vec<T>) + Send + Sync>;

struct Shared<T> {
    stats: Arc<Stats>,
    stat_type: StatType,
    queue: Mutex<VecDeque<T>>,
    condition: Condvar,
    stopped: AtomicBool,
    process_batch: Mutex<Option<BatchFn<T>>>,
    max_queue_size: usize,
    max_batch_size: usize,
}

/// Bounded multi-worker batch queue.
pub struct ProcessingQueue<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    num_threads: usize,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Send + 'static> ProcessingQueue<T> {
    pub fn new(
        stats: Arc<Stats>,
        stat_type: StatType,
        num_threads: usize,
        max_queue_size: usize,
        max_batch_size: usize,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                stats,
                stat_type,
                queue: Mutex::new(VecDeque::new()),
                condition: Condvar::new(),
                stopped: AtomicBool::new(false),
                process_batch: Mutex::new(None),
                max_queue_size,
                max_batch_size,
            }),
            num_threads,
            threads: Mutex::new(Vec::new()),
        }
    }

    /// Install the batch callback. Must be set before `start`.
    pub fn set_process_batch(&self, process_batch: impl Fn(Vec<T>) + Send + Sync + 'static) {
        *self.shared.process_batch.lock().unwrap() = Some(Arc::new(process_batch));
    }

    /// Enqueue one element. Dropped (and counted) when the queue is at
    /// capacity; never blocks.
    pub fn add(&self, item: T) {
        {
            let mut queue = self.shared.queue.lock().unwrap();
            if queue.len() >= self.shared.max_queue_size {
                drop(queue);
                self.shared
                    .stats
                    .inc(self.shared.stat_type, DetailType::Overfill);
                return;
            }
            queue.push_back(item);
        }
        self.shared.condition.notify_one();
    }

    pub fn size(&self) -> usize {
        self.shared.queue.lock().unwrap().len()
    }

    /// Launch the worker pool.
    pub fn start(&self) {
        let mut threads = self.threads.lock().unwrap();
        for i in 0..self.num_threads {
            let shared = Arc::clone(&self.shared);
            let handle = std::thread::Builder::new()
                .name(format!("proc_queue_{i}"))
                .spawn(move || run(shared))
                .expect("failed to spawn processing queue worker");
            threads.push(handle);
        }
    }

    /// Stop and join the workers. In-flight batches complete; undrained
    /// elements are dropped.
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        self.shared.condition.notify_all();
        let mut threads = self.threads.lock().unwrap();
        for handle in threads.drain(..) {
            if handle.join().is_err() {
                error!("processing queue worker panicked during shutdown");
            }
        }
        self.shared.queue.lock().unwrap().clear();
    }
}

impl<T: Send + 'static> Drop for ProcessingQueue<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<T: Send + 'static>(shared: Arc<Shared<T>>) {
    loop {
        let batch = {
            let mut queue = shared.queue.lock().unwrap();
            loop {
                if shared.stopped.load(Ordering::SeqCst) {
                    return;
                }
                if !queue.is_empty() {
                    let take = queue.len().min(shared.max_batch_size);
                    break queue.drain(..take).collect::<Vec<T>>();
                }
                queue = shared.condition.wait(queue).unwrap();
            }
        };

        let callback = shared.process_batch.lock().unwrap().clone();
        if let Some(callback) = callback {
            // A panicking batch must not take the worker down with it.
            if catch_unwind(AssertUnwindSafe(|| callback(batch))).is_err() {
                error!("process_batch panicked; worker continues");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    fn queue(
        num_threads: usize,
        max_queue_size: usize,
        max_batch_size: usize,
    ) -> ProcessingQueue<i32> {
        ProcessingQueue::new(
            Arc::new(Stats::new()),
            StatType::ProcessingQueue,
            num_threads,
            max_queue_size,
            max_batch_size,
        )
    }

    fn wait_until(deadline: Duration, predicate: impl Fn() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if predicate() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        predicate()
    }

    #[test]
    fn construction() {
        let queue = queue(4, 8 * 1024, 1024);
        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn process_one() {
        let queue = queue(4, 8 * 1024, 1024);
        let processed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&processed);
        queue.set_process_batch(move |batch| {
            counter.fetch_add(batch.len(), Ordering::SeqCst);
        });
        queue.start();

        queue.add(1);

        assert!(wait_until(Duration::from_secs(5), || {
            processed.load(Ordering::SeqCst) == 1
        }));
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(processed.load(Ordering::SeqCst), 1);
        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn process_many() {
        let queue = queue(4, 8 * 1024, 1024);
        let processed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&processed);
        queue.set_process_batch(move |batch| {
            counter.fetch_add(batch.len(), Ordering::SeqCst);
        });
        queue.start();

        const COUNT: usize = 1024;
        for _ in 0..COUNT {
            queue.add(1);
        }

        assert!(wait_until(Duration::from_secs(5), || {
            processed.load(Ordering::SeqCst) == COUNT
        }));
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(processed.load(Ordering::SeqCst), COUNT);
        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn max_queue_size() {
        let stats = Arc::new(Stats::new());
        let queue: ProcessingQueue<i32> = ProcessingQueue::new(
            Arc::clone(&stats),
            StatType::ProcessingQueue,
            4,
            1024,
            128,
        );
        // Workers not started: everything past capacity is dropped.
        const COUNT: usize = 2 * 1024;
        for _ in 0..COUNT {
            queue.add(1);
        }
        assert_eq!(queue.size(), 1024);
        assert_eq!(
            stats.count(StatType::ProcessingQueue, DetailType::Overfill),
            (COUNT - 1024) as u64
        );
    }

    #[test]
    fn max_batch_size() {
        let queue = queue(4, 1024, 128);
        // Fill before starting so workers see a full queue.
        for _ in 0..1024 {
            queue.add(1);
        }

        let max_batch = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&max_batch);
        queue.set_process_batch(move |batch| {
            observed.fetch_max(batch.len(), Ordering::SeqCst);
        });
        queue.start();

        assert!(wait_until(Duration::from_secs(5), || {
            max_batch.load(Ordering::SeqCst) == 128
        }));
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(max_batch.load(Ordering::SeqCst), 128);
        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn parallel() {
        let queue = queue(16, 1024, 1);
        let processed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&processed);
        queue.set_process_batch(move |batch| {
            std::thread::sleep(Duration::from_secs(2));
            counter.fetch_add(batch.len(), Ordering::SeqCst);
        });
        queue.start();

        const COUNT: usize = 16;
        for _ in 0..COUNT {
            queue.add(1);
        }

        // 16 workers, 16 single-item batches, 2s of sleep each: parallel
        // execution finishes in ~2s. Allow margin for slow machines.
        assert!(wait_until(Duration::from_secs(3), || {
            processed.load(Ordering::SeqCst) == COUNT
        }));
        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn panicking_batch_does_not_kill_worker() {
        let queue = queue(1, 1024, 1);
        let processed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&processed);
        queue.set_process_batch(move |batch| {
            if batch[0] < 0 {
                panic!("bad batch");
            }
            counter.fetch_add(1, Ordering::SeqCst);
        });
        queue.start();

        queue.add(-1);
        queue.add(1);

        assert!(wait_until(Duration::from_secs(5), || {
            processed.load(Ordering::SeqCst) == 1
        }));
    }

    #[test]
    fn stop_drops_undrained_elements() {
        let queue = queue(1, 1024, 16);
        for _ in 0..100 {
            queue.add(1);
        }
        queue.stop();
        assert_eq!(queue.size(), 0);
    }
}
