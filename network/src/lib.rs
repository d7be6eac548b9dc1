//! TCP channel fabric for the Lattice node.
//!
//! The registry owns one channel per connected peer. Each channel runs a
//! serialized cooperative send task over its own queue, with two traffic
//! classes, bandwidth shaping, and drop-with-callback backpressure. The
//! registry enforces per-IP and per-subnet fan-out limits, performs
//! keepalive and peer-list merging, and persists known peers.

pub mod bandwidth;
pub mod channel;
pub mod channel_queue;
pub mod excluded_peers;
pub mod message;
pub mod registry;
pub mod socket;
pub mod traffic_type;

pub use bandwidth::{BandwidthLimits, OutboundBandwidthLimiter};
pub use channel::{Channel, DropPolicy, SendError};
pub use channel_queue::ChannelQueue;
pub use excluded_peers::ExcludedPeers;
pub use message::Keepalive;
pub use registry::{not_a_peer, ChannelRegistry, ChannelRegistryConfig, ResponseServer};
pub use socket::ChannelSocket;
pub use traffic_type::TrafficType;
