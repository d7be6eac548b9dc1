//! A single peer channel and its serialized send task.
//!
//! All writes to a peer go through the channel's queue and are drained by
//! one cooperative task, so socket access is single-threaded without a lock
//! around the write itself. The task polls for socket readiness and
//! bandwidth credit between batch items; preemption happens only at awaits.

use std::net::SocketAddrV6;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::trace;

use lattice_types::Account;
use lattice_utils::{DetailType, Direction, StatType, Stats};

use crate::bandwidth::OutboundBandwidthLimiter;
use crate::channel_queue::{ChannelQueue, Entry};
use crate::socket::ChannelSocket;
use crate::traffic_type::TrafficType;

/// Items drained from the queue per scheduling round.
const SEND_BATCH_MAX: usize = 8;
/// Bandwidth is acquired in chunks this large.
const BANDWIDTH_CHUNK: usize = 128 * 1024;
/// Poll period for socket readiness and bandwidth credit.
const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Upper bound on waiting for a send notification; guards against a lost
/// wakeup wedging the task.
const SEND_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Failure reported to a send callback.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("channel queue has no buffer space")]
    NoBufferSpace,

    #[error("peer host unreachable")]
    HostUnreachable,

    #[error("send cancelled")]
    Aborted,

    #[error("socket closed")]
    SocketClosed,

    #[error("io: {0}")]
    Io(std::io::Error),
}

pub type Callback = Box<dyn FnOnce(Result<usize, SendError>) + Send>;

/// What to do when the send queue is under pressure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropPolicy {
    /// Drop once the soft limit is reached.
    CanDrop,
    /// Keep admitting until the hard limit.
    NoSocketDrop,
}

struct Timestamps {
    last_packet_sent: Instant,
    last_bootstrap_attempt: Option<Instant>,
    last_keepalive_sent: Option<Instant>,
}

/// One connected peer.
pub struct Channel {
    endpoint: SocketAddrV6,
    node_id: Account,
    network_version: u8,
    /// Channels attached to ephemeral server connections; excluded from
    /// peer sampling unless asked for.
    pub temporary: bool,
    socket: Weak<ChannelSocket>,
    queue: Mutex<ChannelQueue>,
    sending: Notify,
    closed: AtomicBool,
    timestamps: Mutex<Timestamps>,
    stats: Arc<Stats>,
    limiter: Arc<OutboundBandwidthLimiter>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Channel {
    pub fn new(
        endpoint: SocketAddrV6,
        node_id: Account,
        network_version: u8,
        socket: Weak<ChannelSocket>,
        stats: Arc<Stats>,
        limiter: Arc<OutboundBandwidthLimiter>,
    ) -> Arc<Self> {
        // Endpoints are always v6; IPv4 peers arrive as v4-mapped addresses.
        Arc::new(Self {
            endpoint,
            node_id,
            network_version,
            temporary: false,
            socket,
            queue: Mutex::new(ChannelQueue::new()),
            sending: Notify::new(),
            closed: AtomicBool::new(false),
            timestamps: Mutex::new(Timestamps {
                last_packet_sent: Instant::now(),
                last_bootstrap_attempt: None,
                last_keepalive_sent: None,
            }),
            stats,
            limiter,
            task: Mutex::new(None),
        })
    }

    pub fn endpoint(&self) -> SocketAddrV6 {
        self.endpoint
    }

    pub fn node_id(&self) -> Account {
        self.node_id
    }

    pub fn network_version(&self) -> u8 {
        self.network_version
    }

    pub fn alive(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
            && self.socket.upgrade().map(|s| s.alive()).unwrap_or(false)
    }

    pub fn last_packet_sent(&self) -> Instant {
        self.timestamps.lock().unwrap().last_packet_sent
    }

    pub fn set_last_packet_sent(&self, when: Instant) {
        self.timestamps.lock().unwrap().last_packet_sent = when;
    }

    pub fn last_bootstrap_attempt(&self) -> Option<Instant> {
        self.timestamps.lock().unwrap().last_bootstrap_attempt
    }

    pub fn set_last_bootstrap_attempt(&self, when: Instant) {
        self.timestamps.lock().unwrap().last_bootstrap_attempt = Some(when);
    }

    pub fn last_keepalive_sent(&self) -> Option<Instant> {
        self.timestamps.lock().unwrap().last_keepalive_sent
    }

    pub fn set_last_keepalive_sent(&self, when: Instant) {
        self.timestamps.lock().unwrap().last_keepalive_sent = Some(when);
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Enqueue `buffer` for sending. Returns `false` (and completes the
    /// callback with `NoBufferSpace`) when the policy demands a drop.
    pub fn send_buffer(
        &self,
        buffer: Vec<u8>,
        callback: Option<Callback>,
        policy: DropPolicy,
        traffic_type: TrafficType,
    ) -> bool {
        let (accepted, callback) = {
            let mut queue = self.queue.lock().unwrap();
            let admit = !queue.max(traffic_type)
                || (policy == DropPolicy::NoSocketDrop && !queue.full(traffic_type));
            if admit {
                queue.push(traffic_type, Entry { buffer, callback });
                (true, None)
            } else {
                (false, callback)
            }
        };
        if accepted {
            self.sending.notify_one();
            return true;
        }
        let detail = match policy {
            DropPolicy::NoSocketDrop => DetailType::TcpWriteNoSocketDrop,
            DropPolicy::CanDrop => DetailType::TcpWriteDrop,
        };
        self.stats.inc_dir(StatType::Tcp, detail, Direction::Out);
        if let Some(callback) = callback {
            callback(Err(SendError::NoBufferSpace));
        }
        false
    }

    /// Spawn the send task on the current tokio runtime.
    pub fn start(self: &Arc<Self>) {
        let channel = Arc::clone(self);
        let handle = tokio::spawn(async move {
            channel.run_sending().await;
            trace!(endpoint = %channel.endpoint, "channel send task finished");
        });
        *self.task.lock().unwrap() = Some(handle);
    }

    /// Cancel the send task, fail queued callbacks, and close the socket.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.lock().unwrap().take() {
            // Cancellation is the expected way down for a send task.
            task.abort();
        }
        let abandoned = {
            let mut queue = self.queue.lock().unwrap();
            queue.next_batch(usize::MAX)
        };
        for (_, entry) in abandoned {
            entry.complete(Err(SendError::Aborted));
        }
        if let Some(socket) = self.socket.upgrade() {
            socket.close();
        }
    }

    async fn run_sending(self: &Arc<Self>) {
        // Unused bandwidth credit carries across sends within this task.
        let mut allocated_bandwidth: u64 = 0;
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            let batch = {
                let mut queue = self.queue.lock().unwrap();
                queue.next_batch(SEND_BATCH_MAX)
            };
            if batch.is_empty() {
                let _ = tokio::time::timeout(SEND_WAIT_TIMEOUT, self.sending.notified()).await;
                continue;
            }
            for (traffic_type, entry) in batch {
                self.send_one(traffic_type, entry, &mut allocated_bandwidth)
                    .await;
            }
        }
    }

    async fn send_one(&self, traffic_type: TrafficType, entry: Entry, allocated: &mut u64) {
        let Some(socket) = self.socket.upgrade() else {
            entry.complete(Err(SendError::SocketClosed));
            return;
        };

        self.wait_available_socket(&socket).await;
        self.wait_available_bandwidth(traffic_type, entry.buffer.len() as u64, allocated)
            .await;

        match socket.write(&entry.buffer).await {
            Ok(written) => {
                self.set_last_packet_sent(Instant::now());
                entry.complete(Ok(written));
            }
            Err(error) => {
                if error.kind() == std::io::ErrorKind::HostUnreachable {
                    self.stats.inc_dir(
                        StatType::Error,
                        DetailType::UnreachableHost,
                        Direction::Out,
                    );
                }
                entry.complete(Err(SendError::Io(error)));
            }
        }
    }

    async fn wait_available_socket(&self, socket: &ChannelSocket) {
        while socket.full() && socket.alive() {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Acquire bandwidth credit in large chunks so the limiter is consulted
    /// infrequently even on busy channels.
    async fn wait_available_bandwidth(
        &self,
        traffic_type: TrafficType,
        size: u64,
        allocated: &mut u64,
    ) {
        while *allocated < size {
            while !self.limiter.should_pass(BANDWIDTH_CHUNK as u64, traffic_type) {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
            *allocated += BANDWIDTH_CHUNK as u64;
        }
        *allocated -= size;
    }
}
