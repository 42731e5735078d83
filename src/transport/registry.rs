//! Registry of live connections.

use std::sync::Arc;

use dashmap::DashMap;

use crate::guard::{LivenessRegistry, Probe};
use crate::transport::connection::{Connection, ConnectionId, ConnectionInfo, Outbound};

/// Concurrent map of registered connections.
///
/// A connection is present exactly while its socket task is running and it
/// has not been evicted.
#[derive(Default)]
pub struct Registry {
    connections: DashMap<ConnectionId, Arc<Connection>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, connection: Connection) -> Arc<Connection> {
        let connection = Arc::new(connection);
        self.connections
            .insert(connection.id(), Arc::clone(&connection));
        connection
    }

    /// Remove a connection. Only the first caller for a given id gets it back.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.remove(&id).map(|(_, conn)| conn)
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|entry| *entry.key()).collect()
    }

    /// Clone out every connection so callers never hold shard locks while
    /// doing work.
    pub fn all(&self) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn infos(&self) -> Vec<ConnectionInfo> {
        self.all().iter().map(|conn| conn.info()).collect()
    }
}

impl LivenessRegistry for Registry {
    fn connection_ids(&self) -> Vec<ConnectionId> {
        self.ids()
    }

    fn begin_probe(&self, id: ConnectionId) -> Option<Probe> {
        self.get(id).map(|conn| conn.begin_probe())
    }

    fn ping(&self, id: ConnectionId) -> bool {
        self.get(id).is_some_and(|conn| conn.send(Outbound::Ping))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;
    use tokio::sync::mpsc;

    fn insert(registry: &Registry) -> (ConnectionId, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ConnectionId::new();
        registry.insert(Connection::new(id, IpAddr::from([127, 0, 0, 1]), tx));
        (id, rx)
    }

    #[test]
    fn remove_is_single_winner() {
        let registry = Registry::new();
        let (id, _rx) = insert(&registry);

        assert!(registry.remove(id).is_some());
        assert!(registry.remove(id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn ping_goes_through_outbound_queue() {
        let registry = Registry::new();
        let (id, mut rx) = insert(&registry);

        assert!(registry.ping(id));
        assert_eq!(rx.try_recv().unwrap(), Outbound::Ping);
        assert!(!registry.ping(ConnectionId::new()));
    }

    #[test]
    fn probe_reports_unknown_connection() {
        let registry = Registry::new();
        let (id, _rx) = insert(&registry);

        assert!(registry.begin_probe(id).unwrap().was_alive);
        assert!(!registry.begin_probe(id).unwrap().was_alive);
        assert!(registry.begin_probe(ConnectionId::new()).is_none());
    }
}
