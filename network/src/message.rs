//! Keepalive wire payload.

use std::net::SocketAddrV6;

use serde::{Deserialize, Serialize};

use lattice_store::EndpointKey;

/// A keepalive: eight peer endpoints, zero-address padded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keepalive {
    pub peers: [EndpointKey; 8],
}

impl Keepalive {
    pub fn new(endpoints: [SocketAddrV6; 8]) -> Self {
        Self {
            peers: endpoints.map(EndpointKey::from),
        }
    }

    pub fn endpoints(&self) -> [SocketAddrV6; 8] {
        self.peers.map(SocketAddrV6::from)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("keepalive is always serializable")
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        bincode::deserialize(bytes).ok()
    }
}
