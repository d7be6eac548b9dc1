//! The channel registry.
//!
//! One entry per connected peer, keyed by TCP endpoint, with secondary
//! indices by node id and IP subnet. All index updates go through the
//! single insert/erase path. Lookups and enumerations copy what they need
//! under the lock and release it before any I/O.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::{Ipv6Addr, SocketAddrV6};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use lattice_store::{Store, Table};
use lattice_types::Account;
use lattice_utils::{unix_now_secs, DetailType, Direction, StatType, Stats};

use crate::bandwidth::OutboundBandwidthLimiter;
use crate::channel::{Channel, DropPolicy};
use crate::excluded_peers::ExcludedPeers;
use crate::message::Keepalive;
use crate::socket::ChannelSocket;
use crate::traffic_type::TrafficType;

#[derive(Clone, Debug)]
pub struct ChannelRegistryConfig {
    pub max_peers_per_ip: usize,
    pub max_peers_per_subnetwork: usize,
    pub protocol_version_min: u8,
    pub keepalive_period: Duration,
    pub merge_period: Duration,
    pub allow_local_peers: bool,
}

impl Default for ChannelRegistryConfig {
    fn default() -> Self {
        Self {
            max_peers_per_ip: 5,
            max_peers_per_subnetwork: 16,
            protocol_version_min: 1,
            keepalive_period: Duration::from_secs(60),
            merge_period: Duration::from_millis(250),
            allow_local_peers: false,
        }
    }
}

/// Per-channel server-side state the registry polls during merge rounds.
pub struct ResponseServer {
    last_keepalive: Mutex<Option<Keepalive>>,
}

impl ResponseServer {
    pub fn new() -> Self {
        Self {
            last_keepalive: Mutex::new(None),
        }
    }

    /// Called by the read path when a keepalive arrives from the peer.
    pub fn set_keepalive(&self, keepalive: Keepalive) {
        *self.last_keepalive.lock().unwrap() = Some(keepalive);
    }

    pub fn take_keepalive(&self) -> Option<Keepalive> {
        self.last_keepalive.lock().unwrap().take()
    }
}

impl Default for ResponseServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Subnet key: /24 for v4-mapped addresses, /64 for native v6.
type SubnetKey = [u8; 9];

fn subnet_key(address: &Ipv6Addr) -> SubnetKey {
    let mut key = [0u8; 9];
    if let Some(v4) = address.to_ipv4_mapped() {
        key[0] = 4;
        key[1..4].copy_from_slice(&v4.octets()[..3]);
    } else {
        key[0] = 6;
        key[1..9].copy_from_slice(&address.octets()[..8]);
    }
    key
}

/// Endpoints that can never be peers: unspecified address, port zero, and
/// loopback unless local peers are allowed.
pub fn not_a_peer(endpoint: &SocketAddrV6, allow_local: bool) -> bool {
    if endpoint.ip().is_unspecified() || endpoint.port() == 0 {
        return true;
    }
    let is_local = endpoint.ip().is_loopback()
        || endpoint
            .ip()
            .to_ipv4_mapped()
            .map(|v4| v4.is_loopback())
            .unwrap_or(false);
    is_local && !allow_local
}

fn zero_endpoint() -> SocketAddrV6 {
    SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, 0, 0, 0)
}

struct Entry {
    channel: Arc<Channel>,
    socket: Arc<ChannelSocket>,
    server: Arc<ResponseServer>,
}

#[derive(Default)]
struct State {
    by_endpoint: HashMap<SocketAddrV6, Entry>,
    by_node_id: HashMap<Account, SocketAddrV6>,
    by_subnet: HashMap<SubnetKey, HashSet<SocketAddrV6>>,
    /// Insertion order; grants random access for sampling and merge rounds.
    order: Vec<SocketAddrV6>,
    attempts: HashMap<SocketAddrV6, Instant>,
    /// Peers from the most recently consumed keepalive, merged one per tick.
    merge_backlog: VecDeque<SocketAddrV6>,
    merge_index: usize,
}

impl State {
    fn insert(&mut self, endpoint: SocketAddrV6, entry: Entry) {
        self.by_node_id.insert(entry.channel.node_id(), endpoint);
        self.by_subnet
            .entry(subnet_key(endpoint.ip()))
            .or_default()
            .insert(endpoint);
        self.order.push(endpoint);
        self.by_endpoint.insert(endpoint, entry);
        self.attempts.remove(&endpoint);
    }

    fn remove(&mut self, endpoint: &SocketAddrV6) -> Option<Entry> {
        let entry = self.by_endpoint.remove(endpoint)?;
        if self.by_node_id.get(&entry.channel.node_id()) == Some(endpoint) {
            self.by_node_id.remove(&entry.channel.node_id());
        }
        let subnet = subnet_key(endpoint.ip());
        if let Some(members) = self.by_subnet.get_mut(&subnet) {
            members.remove(endpoint);
            if members.is_empty() {
                self.by_subnet.remove(&subnet);
            }
        }
        self.order.retain(|e| e != endpoint);
        Some(entry)
    }
}

/// Registry of open TCP peers and the timer loops that keep them alive.
pub struct ChannelRegistry {
    config: ChannelRegistryConfig,
    stats: Arc<Stats>,
    store: Arc<Store>,
    limiter: Arc<OutboundBandwidthLimiter>,
    excluded: Arc<ExcludedPeers>,
    state: Mutex<State>,
    channel_observer: Mutex<Option<Box<dyn Fn(Arc<Channel>) + Send + Sync>>>,
    /// Candidates produced by merge rounds, consumed by the peer connector.
    merged_peers: Mutex<VecDeque<SocketAddrV6>>,
    stopped: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ChannelRegistry {
    pub fn new(
        config: ChannelRegistryConfig,
        stats: Arc<Stats>,
        store: Arc<Store>,
        limiter: Arc<OutboundBandwidthLimiter>,
        excluded: Arc<ExcludedPeers>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            stats,
            store,
            limiter,
            excluded,
            state: Mutex::new(State::default()),
            channel_observer: Mutex::new(None),
            merged_peers: Mutex::new(VecDeque::new()),
            stopped: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn set_channel_observer(&self, observer: Box<dyn Fn(Arc<Channel>) + Send + Sync>) {
        *self.channel_observer.lock().unwrap() = Some(observer);
    }

    /// Register a freshly handshaken peer. Rejects duplicates by endpoint
    /// and node-id reuse within the same subnet (spoofing resistance).
    pub fn create(
        &self,
        socket: Arc<ChannelSocket>,
        server: Arc<ResponseServer>,
        endpoint: SocketAddrV6,
        node_id: Account,
        network_version: u8,
    ) -> Option<Arc<Channel>> {
        if self.stopped.load(Ordering::SeqCst)
            || not_a_peer(&endpoint, self.config.allow_local_peers)
        {
            return None;
        }
        let channel = {
            let mut state = self.state.lock().unwrap();
            if state.by_endpoint.contains_key(&endpoint) {
                return None;
            }
            let subnet = subnet_key(endpoint.ip());
            let spoofed = state
                .by_subnet
                .get(&subnet)
                .map(|members| {
                    members.iter().any(|member| {
                        state
                            .by_endpoint
                            .get(member)
                            .map(|entry| entry.channel.node_id() == node_id)
                            .unwrap_or(false)
                    })
                })
                .unwrap_or(false);
            if spoofed {
                return None;
            }
            let channel = Channel::new(
                endpoint,
                node_id,
                network_version,
                Arc::downgrade(&socket),
                Arc::clone(&self.stats),
                Arc::clone(&self.limiter),
            );
            state.insert(
                endpoint,
                Entry {
                    channel: Arc::clone(&channel),
                    socket,
                    server,
                },
            );
            channel
        };
        debug!(endpoint = %endpoint, "channel created");
        if let Some(observer) = self.channel_observer.lock().unwrap().as_ref() {
            observer(Arc::clone(&channel));
        }
        Some(channel)
    }

    pub fn erase(&self, endpoint: &SocketAddrV6) {
        if let Some(entry) = self.state.lock().unwrap().remove(endpoint) {
            entry.channel.close();
        }
    }

    pub fn find_channel(&self, endpoint: &SocketAddrV6) -> Option<Arc<Channel>> {
        self.state
            .lock()
            .unwrap()
            .by_endpoint
            .get(endpoint)
            .map(|entry| Arc::clone(&entry.channel))
    }

    pub fn find_node_id(&self, node_id: &Account) -> Option<Arc<Channel>> {
        let state = self.state.lock().unwrap();
        let endpoint = state.by_node_id.get(node_id)?;
        state
            .by_endpoint
            .get(endpoint)
            .map(|entry| Arc::clone(&entry.channel))
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().by_endpoint.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample up to `count` distinct live channels uniformly at random,
    /// with at most `2 * count` draws.
    pub fn random_set(
        &self,
        count: usize,
        min_version: u8,
        include_temporary: bool,
    ) -> Vec<Arc<Channel>> {
        let state = self.state.lock().unwrap();
        let mut result: Vec<Arc<Channel>> = Vec::with_capacity(count);
        let mut seen: HashSet<SocketAddrV6> = HashSet::with_capacity(count);
        if state.order.is_empty() {
            return result;
        }
        let mut rng = rand::thread_rng();
        for _ in 0..count * 2 {
            if result.len() >= count {
                break;
            }
            let endpoint = state.order[rng.gen_range(0..state.order.len())];
            let Some(entry) = state.by_endpoint.get(&endpoint) else {
                continue;
            };
            if !entry.channel.alive() {
                continue;
            }
            if entry.channel.network_version() < min_version {
                continue;
            }
            if entry.channel.temporary && !include_temporary {
                continue;
            }
            if seen.insert(endpoint) {
                result.push(Arc::clone(&entry.channel));
            }
        }
        result
    }

    /// Fill the keepalive peer slots; unused slots get the zero address.
    pub fn random_fill(&self, target: &mut [SocketAddrV6; 8]) {
        let peers = self.random_set(target.len(), 0, false);
        target.fill(zero_endpoint());
        for (slot, channel) in target.iter_mut().zip(peers.iter()) {
            *slot = channel.endpoint();
        }
    }

    /// All channels at or above `min_version`.
    pub fn list(&self, min_version: u8, include_temporary: bool) -> Vec<Arc<Channel>> {
        let state = self.state.lock().unwrap();
        state
            .order
            .iter()
            .filter_map(|endpoint| state.by_endpoint.get(endpoint))
            .filter(|entry| entry.channel.network_version() >= min_version)
            .filter(|entry| include_temporary || !entry.channel.temporary)
            .map(|entry| Arc::clone(&entry.channel))
            .collect()
    }

    /// Stamp `last_packet_sent` after a successful write to `endpoint`.
    pub fn update(&self, endpoint: &SocketAddrV6) {
        if let Some(channel) = self.find_channel(endpoint) {
            channel.set_last_packet_sent(Instant::now());
        }
    }

    /// The eligible channel that has waited longest for a bootstrap
    /// attempt; stamps its attempt time. Zero endpoint when none qualify.
    pub fn bootstrap_peer(&self) -> SocketAddrV6 {
        let state = self.state.lock().unwrap();
        let candidate = state
            .by_endpoint
            .values()
            .filter(|entry| {
                entry.channel.network_version() >= self.config.protocol_version_min
            })
            .min_by_key(|entry| entry.channel.last_bootstrap_attempt());
        match candidate {
            Some(entry) => {
                entry.channel.set_last_bootstrap_attempt(Instant::now());
                entry.channel.endpoint()
            }
            None => zero_endpoint(),
        }
    }

    fn max_ip_connections(&self, endpoint: &SocketAddrV6) -> bool {
        let state = self.state.lock().unwrap();
        let ip = endpoint.ip();
        let channels = state
            .by_endpoint
            .keys()
            .filter(|existing| existing.ip() == ip)
            .count();
        let attempts = state
            .attempts
            .keys()
            .filter(|existing| existing.ip() == ip)
            .count();
        let result = channels >= self.config.max_peers_per_ip
            || attempts >= self.config.max_peers_per_ip;
        if result {
            self.stats
                .inc_dir(StatType::Tcp, DetailType::MaxPerIp, Direction::Out);
        }
        result
    }

    fn max_subnetwork_connections(&self, endpoint: &SocketAddrV6) -> bool {
        let subnet = subnet_key(endpoint.ip());
        let state = self.state.lock().unwrap();
        let channels = state
            .by_subnet
            .get(&subnet)
            .map(|members| members.len())
            .unwrap_or(0);
        let attempts = state
            .attempts
            .keys()
            .filter(|existing| subnet_key(existing.ip()) == subnet)
            .count();
        let result = channels >= self.config.max_peers_per_subnetwork
            || attempts >= self.config.max_peers_per_subnetwork;
        if result {
            self.stats
                .inc_dir(StatType::Tcp, DetailType::MaxPerSubnetwork, Direction::Out);
        }
        result
    }

    /// Record the intent to connect out to `endpoint`. Returns `true` on
    /// rejection: excluded, over fan-out caps, already connected, or an
    /// attempt already recorded.
    pub fn reachout(&self, endpoint: &SocketAddrV6) -> bool {
        if self.excluded.check(endpoint) {
            self.stats
                .inc_dir(StatType::Tcp, DetailType::TcpExcluded, Direction::Out);
            return true;
        }
        if self.max_ip_connections(endpoint) || self.max_subnetwork_connections(endpoint) {
            return true;
        }
        if self.find_channel(endpoint).is_some() {
            return true;
        }
        self.state
            .lock()
            .unwrap()
            .attempts
            .insert(*endpoint, Instant::now())
            .is_some()
    }

    /// Close idle and outdated channels, drop dead sockets, forget stale
    /// attempts.
    pub fn purge(&self, cutoff: Instant) {
        let removed: Vec<Entry> = {
            let mut state = self.state.lock().unwrap();
            let doomed: Vec<SocketAddrV6> = state
                .by_endpoint
                .iter()
                .filter(|(_, entry)| {
                    !entry.channel.alive()
                        || entry.channel.last_packet_sent() < cutoff
                        || entry.channel.network_version() < self.config.protocol_version_min
                })
                .map(|(endpoint, _)| *endpoint)
                .collect();
            state.attempts.retain(|_, attempted| *attempted >= cutoff);
            doomed
                .iter()
                .filter_map(|endpoint| state.remove(endpoint))
                .collect()
        };
        for entry in removed {
            trace!(endpoint = %entry.channel.endpoint(), "purging channel");
            entry.channel.close();
        }
    }

    /// Persist every known endpoint to the peers table. Snapshots under the
    /// lock, writes outside it.
    pub fn store_all(&self, clear: bool) -> bool {
        let endpoints: Vec<SocketAddrV6> = {
            let state = self.state.lock().unwrap();
            state.by_endpoint.keys().copied().collect()
        };
        if endpoints.is_empty() {
            return false;
        }
        let txn = self.store.tx_begin_write(&[Table::Peers]);
        if clear {
            self.store.peer().clear(&txn);
        }
        let now = unix_now_secs();
        for endpoint in endpoints {
            self.store.peer().put(&txn, endpoint.into(), now);
        }
        true
    }

    /// One keepalive round: every channel that has not been greeted within
    /// the keepalive period gets a message with eight random peers.
    pub fn keepalive_once(&self) {
        let mut peers = [zero_endpoint(); 8];
        self.random_fill(&mut peers);
        let message = Keepalive::new(peers).to_bytes();

        let now = Instant::now();
        let due: Vec<Arc<Channel>> = {
            let state = self.state.lock().unwrap();
            state
                .by_endpoint
                .values()
                .filter(|entry| match entry.channel.last_keepalive_sent() {
                    Some(sent) => now.duration_since(sent) >= self.config.keepalive_period,
                    None => true,
                })
                .map(|entry| Arc::clone(&entry.channel))
                .collect()
        };
        for channel in due {
            channel.send_buffer(
                message.clone(),
                None,
                DropPolicy::CanDrop,
                TrafficType::Generic,
            );
            channel.set_last_keepalive_sent(now);
            self.stats
                .inc_dir(StatType::Tcp, DetailType::KeepaliveSent, Direction::Out);
        }
    }

    /// One merge round: either merge one backlogged peer, or poll the next
    /// channel (round-robin) for a received keepalive to backlog.
    pub fn merge_once(&self) {
        let next = {
            let mut state = self.state.lock().unwrap();
            if let Some(peer) = state.merge_backlog.pop_front() {
                Some(peer)
            } else if state.order.is_empty() {
                None
            } else {
                let mut found = None;
                let len = state.order.len();
                for _ in 0..len {
                    state.merge_index = (state.merge_index + 1) % len;
                    let endpoint = state.order[state.merge_index];
                    if let Some(entry) = state.by_endpoint.get(&endpoint) {
                        if let Some(keepalive) = entry.server.take_keepalive() {
                            found = Some(keepalive);
                            break;
                        }
                    }
                }
                if let Some(keepalive) = found {
                    for peer in keepalive.endpoints() {
                        state.merge_backlog.push_back(peer);
                    }
                    state.merge_backlog.pop_front()
                } else {
                    None
                }
            }
        };
        if let Some(peer) = next {
            self.merge_peer(peer);
        }
    }

    /// Offer a learned endpoint to the known-peers list.
    pub fn merge_peer(&self, endpoint: SocketAddrV6) {
        if not_a_peer(&endpoint, self.config.allow_local_peers) {
            return;
        }
        if self.excluded.check(&endpoint) || self.find_channel(&endpoint).is_some() {
            return;
        }
        let mut merged = self.merged_peers.lock().unwrap();
        if merged.contains(&endpoint) {
            return;
        }
        merged.push_back(endpoint);
        self.stats
            .inc_dir(StatType::Tcp, DetailType::MergePeer, Direction::In);
    }

    /// Next merged peer candidate for the connector.
    pub fn take_merged_peer(&self) -> Option<SocketAddrV6> {
        self.merged_peers.lock().unwrap().pop_front()
    }

    /// Launch the keepalive and merge timers on the current tokio runtime.
    pub fn start(self: &Arc<Self>) {
        let keepalive = Arc::clone(self);
        let keepalive_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(keepalive.config.keepalive_period);
            loop {
                ticker.tick().await;
                if keepalive.stopped.load(Ordering::SeqCst) {
                    return;
                }
                keepalive.keepalive_once();
            }
        });
        let merge = Arc::clone(self);
        let merge_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(merge.config.merge_period);
            loop {
                ticker.tick().await;
                if merge.stopped.load(Ordering::SeqCst) {
                    return;
                }
                merge.merge_once();
            }
        });
        self.tasks
            .lock()
            .unwrap()
            .extend([keepalive_task, merge_task]);
    }

    /// Stop the timers and close every channel.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
        let entries: Vec<Entry> = {
            let mut state = self.state.lock().unwrap();
            let endpoints: Vec<SocketAddrV6> = state.by_endpoint.keys().copied().collect();
            endpoints
                .iter()
                .filter_map(|endpoint| state.remove(endpoint))
                .collect()
        };
        for entry in entries {
            entry.channel.close();
            entry.socket.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bandwidth::BandwidthLimits;

    fn registry(config: ChannelRegistryConfig) -> Arc<ChannelRegistry> {
        ChannelRegistry::new(
            config,
            Arc::new(Stats::new()),
            Arc::new(Store::new()),
            Arc::new(OutboundBandwidthLimiter::new(BandwidthLimits {
                generic_bytes_per_sec: 0,
                bootstrap_bytes_per_sec: 0,
            })),
            Arc::new(ExcludedPeers::new()),
        )
    }

    fn test_config() -> ChannelRegistryConfig {
        ChannelRegistryConfig {
            allow_local_peers: true,
            ..ChannelRegistryConfig::default()
        }
    }

    fn endpoint(byte: u8, port: u16) -> SocketAddrV6 {
        // Distinct native-v6 addresses; byte lands in the subnet prefix's
        // low half so different bytes mean different /64 subnets.
        let mut octets = [0u8; 16];
        octets[0] = 0x20;
        octets[7] = byte;
        octets[15] = 1;
        SocketAddrV6::new(octets.into(), port, 0, 0)
    }

    fn same_subnet_endpoint(byte: u8, host: u8, port: u16) -> SocketAddrV6 {
        let mut octets = [0u8; 16];
        octets[0] = 0x20;
        octets[7] = byte;
        octets[15] = host;
        SocketAddrV6::new(octets.into(), port, 0, 0)
    }

    fn node_id(byte: u8) -> Account {
        Account::new([byte; 32])
    }

    fn dummy_socket() -> Arc<ChannelSocket> {
        let (_rx, tx) = tokio::io::duplex(1024);
        let (_, write_half) = tokio::io::split(tx);
        Arc::new(ChannelSocket::new(Box::new(write_half)))
    }

    fn add_channel(
        registry: &ChannelRegistry,
        endpoint: SocketAddrV6,
        id: Account,
        version: u8,
    ) -> (Arc<Channel>, Arc<ChannelSocket>, Arc<ResponseServer>) {
        let socket = dummy_socket();
        let server = Arc::new(ResponseServer::new());
        let channel = registry
            .create(
                Arc::clone(&socket),
                Arc::clone(&server),
                endpoint,
                id,
                version,
            )
            .expect("channel should be created");
        (channel, socket, server)
    }

    #[tokio::test]
    async fn create_and_find() {
        let registry = registry(test_config());
        let e = endpoint(1, 7075);
        let (channel, _socket, _server) = add_channel(&registry, e, node_id(1), 3);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.find_channel(&e).unwrap().endpoint(), e);
        assert_eq!(
            registry.find_node_id(&node_id(1)).unwrap().endpoint(),
            channel.endpoint()
        );
    }

    #[tokio::test]
    async fn duplicate_endpoint_rejected() {
        let registry = registry(test_config());
        let e = endpoint(1, 7075);
        let _kept = add_channel(&registry, e, node_id(1), 3);
        assert!(registry
            .create(dummy_socket(), Arc::new(ResponseServer::new()), e, node_id(2), 3)
            .is_none());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn same_subnet_same_node_id_rejected() {
        let registry = registry(test_config());
        let _kept = add_channel(&registry, same_subnet_endpoint(1, 1, 7075), node_id(1), 3);

        // Same /64, same node id: spoofing attempt.
        assert!(registry
            .create(
                dummy_socket(),
                Arc::new(ResponseServer::new()),
                same_subnet_endpoint(1, 2, 7075),
                node_id(1),
                3,
            )
            .is_none());

        // Same /64 with a different node id is fine.
        assert!(registry
            .create(
                dummy_socket(),
                Arc::new(ResponseServer::new()),
                same_subnet_endpoint(1, 3, 7075),
                node_id(2),
                3,
            )
            .is_some());
    }

    #[tokio::test]
    async fn erase_removes_all_indices() {
        let registry = registry(test_config());
        let e = endpoint(1, 7075);
        let _kept = add_channel(&registry, e, node_id(1), 3);

        registry.erase(&e);
        assert_eq!(registry.len(), 0);
        assert!(registry.find_channel(&e).is_none());
        assert!(registry.find_node_id(&node_id(1)).is_none());
    }

    #[tokio::test]
    async fn random_set_filters_version_and_caps_draws() {
        let registry = registry(test_config());
        let mut kept = Vec::new();
        for i in 1..=6u8 {
            kept.push(add_channel(&registry, endpoint(i, 7075), node_id(i), i));
        }

        let sampled = registry.random_set(10, 4, false);
        assert!(!sampled.is_empty());
        assert!(sampled.iter().all(|c| c.network_version() >= 4));
        // Distinct endpoints only.
        let endpoints: HashSet<SocketAddrV6> = sampled.iter().map(|c| c.endpoint()).collect();
        assert_eq!(endpoints.len(), sampled.len());
    }

    #[tokio::test]
    async fn random_fill_pads_with_zero() {
        let registry = registry(test_config());
        let _kept = add_channel(&registry, endpoint(1, 7075), node_id(1), 3);

        let mut slots = [zero_endpoint(); 8];
        registry.random_fill(&mut slots);
        let filled = slots.iter().filter(|e| !e.ip().is_unspecified()).count();
        assert_eq!(filled, 1);
    }

    #[tokio::test]
    async fn bootstrap_peer_rotates_oldest() {
        let registry = registry(test_config());
        let e1 = endpoint(1, 7075);
        let e2 = endpoint(2, 7075);
        let _kept1 = add_channel(&registry, e1, node_id(1), 3);
        let _kept2 = add_channel(&registry, e2, node_id(2), 3);

        let first = registry.bootstrap_peer();
        let second = registry.bootstrap_peer();
        assert_ne!(first, second);
        assert!([e1, e2].contains(&first));
        assert!([e1, e2].contains(&second));
        // Both stamped; the next pick is the older of the two again.
        let third = registry.bootstrap_peer();
        assert_eq!(third, first);
    }

    #[tokio::test]
    async fn bootstrap_peer_requires_min_version() {
        let mut config = test_config();
        config.protocol_version_min = 5;
        let registry = registry(config);
        let _kept = add_channel(&registry, endpoint(1, 7075), node_id(1), 3);
        assert_eq!(registry.bootstrap_peer(), zero_endpoint());
    }

    #[tokio::test]
    async fn reachout_rejects_duplicates_and_connected() {
        let registry = registry(test_config());
        let fresh = endpoint(1, 7075);
        assert!(!registry.reachout(&fresh));
        // Second attempt to the same endpoint is an error.
        assert!(registry.reachout(&fresh));

        let connected = endpoint(2, 7075);
        let _kept = add_channel(&registry, connected, node_id(2), 3);
        assert!(registry.reachout(&connected));
    }

    #[tokio::test]
    async fn reachout_honors_ip_cap() {
        let mut config = test_config();
        config.max_peers_per_ip = 1;
        let registry = registry(config);
        let first = endpoint(1, 7075);
        let mut second = first;
        second.set_port(7076);
        assert!(!registry.reachout(&first));
        assert!(registry.reachout(&second));
    }

    #[tokio::test]
    async fn reachout_rejects_excluded() {
        let excluded = Arc::new(ExcludedPeers::new());
        let registry = ChannelRegistry::new(
            test_config(),
            Arc::new(Stats::new()),
            Arc::new(Store::new()),
            Arc::new(OutboundBandwidthLimiter::default()),
            Arc::clone(&excluded),
        );
        let banned = endpoint(1, 7075);
        excluded.add(&banned);
        excluded.add(&banned);
        assert!(registry.reachout(&banned));
    }

    #[tokio::test]
    async fn purge_removes_idle_and_outdated() {
        let mut config = test_config();
        config.protocol_version_min = 2;
        let registry = registry(config);
        let idle = endpoint(1, 7075);
        let fresh = endpoint(2, 7075);
        let outdated = endpoint(3, 7075);
        let (idle_channel, _s1, _v1) = add_channel(&registry, idle, node_id(1), 3);
        let _kept = add_channel(&registry, fresh, node_id(2), 3);
        let _old = add_channel(&registry, outdated, node_id(3), 1);

        idle_channel.set_last_packet_sent(Instant::now() - Duration::from_secs(600));
        registry.purge(Instant::now() - Duration::from_secs(300));

        assert!(registry.find_channel(&idle).is_none());
        assert!(registry.find_channel(&outdated).is_none());
        assert!(registry.find_channel(&fresh).is_some());
    }

    #[tokio::test]
    async fn store_all_persists_endpoints() {
        let store = Arc::new(Store::new());
        let registry = ChannelRegistry::new(
            test_config(),
            Arc::new(Stats::new()),
            Arc::clone(&store),
            Arc::new(OutboundBandwidthLimiter::default()),
            Arc::new(ExcludedPeers::new()),
        );
        assert!(!registry.store_all(true));

        let _kept1 = add_channel(&registry, endpoint(1, 7075), node_id(1), 3);
        let _kept2 = add_channel(&registry, endpoint(2, 7076), node_id(2), 3);
        assert!(registry.store_all(true));

        let txn = store.tx_begin_read();
        assert_eq!(store.peer().count(&txn), 2);
    }

    #[tokio::test]
    async fn keepalive_once_greets_only_due_channels() {
        let registry = registry(test_config());
        let (due, _s1, _v1) = add_channel(&registry, endpoint(1, 7075), node_id(1), 3);
        let (recent, _s2, _v2) = add_channel(&registry, endpoint(2, 7075), node_id(2), 3);
        recent.set_last_keepalive_sent(Instant::now());

        registry.keepalive_once();
        assert_eq!(due.queue_len(), 1);
        assert_eq!(recent.queue_len(), 0);
        assert!(due.last_keepalive_sent().is_some());
    }

    #[tokio::test]
    async fn merge_consumes_one_peer_per_round() {
        let registry = registry(test_config());
        let (_c, _s, server) = add_channel(&registry, endpoint(1, 7075), node_id(1), 3);

        let mut peers = [zero_endpoint(); 8];
        peers[0] = endpoint(10, 7075);
        peers[1] = endpoint(11, 7075);
        server.set_keepalive(Keepalive::new(peers));

        // First round consumes the keepalive and merges the first peer.
        registry.merge_once();
        assert_eq!(registry.take_merged_peer(), Some(endpoint(10, 7075)));
        // Second round merges the next backlogged peer.
        registry.merge_once();
        assert_eq!(registry.take_merged_peer(), Some(endpoint(11, 7075)));
        // Zero-address slots are discarded without producing candidates.
        registry.merge_once();
        assert_eq!(registry.take_merged_peer(), None);
    }

    #[tokio::test]
    async fn stop_closes_everything() {
        let registry = registry(test_config());
        let (channel, socket, _v) = add_channel(&registry, endpoint(1, 7075), node_id(1), 3);
        registry.stop();
        assert_eq!(registry.len(), 0);
        assert!(!socket.alive());
        assert!(!channel.alive());
    }
}
