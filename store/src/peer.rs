//! Peer table: endpoints persisted across restarts.

use std::collections::HashMap;
use std::net::SocketAddrV6;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::transaction::{Table, Transaction, WriteTransaction};

/// The persisted form of a peer endpoint: 16 address bytes + port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointKey {
    pub address: [u8; 16],
    pub port: u16,
}

impl From<SocketAddrV6> for EndpointKey {
    fn from(endpoint: SocketAddrV6) -> Self {
        Self {
            address: endpoint.ip().octets(),
            port: endpoint.port(),
        }
    }
}

impl From<EndpointKey> for SocketAddrV6 {
    fn from(key: EndpointKey) -> Self {
        SocketAddrV6::new(key.address.into(), key.port, 0, 0)
    }
}

/// Recently seen peers, so the node can reconnect on restart without relying
/// solely on bootstrap peers.
pub struct PeerTable {
    inner: RwLock<HashMap<EndpointKey, u64>>,
}

impl PeerTable {
    pub(crate) fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or refresh a peer with its last-seen timestamp.
    pub fn put(&self, txn: &WriteTransaction, key: EndpointKey, timestamp: u64) {
        debug_assert!(txn.covers(Table::Peers));
        self.inner.write().unwrap().insert(key, timestamp);
    }

    pub fn del(&self, txn: &WriteTransaction, key: &EndpointKey) {
        debug_assert!(txn.covers(Table::Peers));
        self.inner.write().unwrap().remove(key);
    }

    /// Remove every stored peer.
    pub fn clear(&self, txn: &WriteTransaction) {
        debug_assert!(txn.covers(Table::Peers));
        self.inner.write().unwrap().clear();
    }

    pub fn iter(&self, _txn: &dyn Transaction) -> Vec<(EndpointKey, u64)> {
        self.inner
            .read()
            .unwrap()
            .iter()
            .map(|(key, timestamp)| (*key, *timestamp))
            .collect()
    }

    pub fn count(&self, _txn: &dyn Transaction) -> usize {
        self.inner.read().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    fn endpoint(last_byte: u8, port: u16) -> SocketAddrV6 {
        let mut octets = [0u8; 16];
        octets[15] = last_byte;
        SocketAddrV6::new(octets.into(), port, 0, 0)
    }

    #[test]
    fn endpoint_key_round_trips() {
        let original = endpoint(7, 7075);
        let key = EndpointKey::from(original);
        assert_eq!(SocketAddrV6::from(key), original);
    }

    #[test]
    fn put_iter_clear() {
        let store = Store::new();
        let txn = store.tx_begin_write(&[Table::Peers]);
        store.peer().put(&txn, endpoint(1, 7075).into(), 100);
        store.peer().put(&txn, endpoint(2, 7075).into(), 200);
        drop(txn);

        let read = store.tx_begin_read();
        assert_eq!(store.peer().count(&read), 2);
        let mut peers = store.peer().iter(&read);
        peers.sort_by_key(|(_, ts)| *ts);
        assert_eq!(peers[0].1, 100);
        drop(read);

        let txn = store.tx_begin_write(&[Table::Peers]);
        store.peer().clear(&txn);
        drop(txn);

        let read = store.tx_begin_read();
        assert_eq!(store.peer().count(&read), 0);
    }

    #[test]
    fn put_overwrites_timestamp() {
        let store = Store::new();
        let txn = store.tx_begin_write(&[Table::Peers]);
        let key: EndpointKey = endpoint(1, 7075).into();
        store.peer().put(&txn, key, 100);
        store.peer().put(&txn, key, 300);
        drop(txn);

        let read = store.tx_begin_read();
        assert_eq!(store.peer().iter(&read), vec![(key, 300)]);
    }
}
