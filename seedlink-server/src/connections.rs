//! Registry of open connections, reported by `INFO CONNECTIONS`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use seedlink4_protocol::ProtocolVersion;

/// Per-connection metadata.
#[derive(Clone, Debug)]
pub(crate) struct ConnectionInfo {
    pub addr: SocketAddr,
    pub connected_at: SystemTime,
    pub protocol: Option<ProtocolVersion>,
    pub user_agent: Option<String>,
    pub state: &'static str,
}

struct RegistryInner {
    next_id: AtomicU64,
    connections: Mutex<HashMap<u64, ConnectionInfo>>,
}

/// Thread-safe connection registry. Clone is cheap (Arc).
#[derive(Clone)]
pub(crate) struct ConnectionRegistry(Arc<RegistryInner>);

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self(Arc::new(RegistryInner {
            next_id: AtomicU64::new(1),
            connections: Mutex::new(HashMap::new()),
        }))
    }

    fn connections(&self) -> std::sync::MutexGuard<'_, HashMap<u64, ConnectionInfo>> {
        self.0.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new connection. It is listed until the guard is dropped.
    pub fn register(&self, addr: SocketAddr) -> ConnectionGuard {
        let id = self.0.next_id.fetch_add(1, Ordering::Relaxed);
        let info = ConnectionInfo {
            addr,
            connected_at: SystemTime::now(),
            protocol: None,
            user_agent: None,
            state: "Init",
        };
        self.connections().insert(id, info);
        ConnectionGuard {
            registry: self.clone(),
            id,
        }
    }

    /// All open connections, oldest first.
    pub fn snapshot(&self) -> Vec<ConnectionInfo> {
        let mut all: Vec<(u64, ConnectionInfo)> = self
            .connections()
            .iter()
            .map(|(id, info)| (*id, info.clone()))
            .collect();
        all.sort_by_key(|(id, _)| *id);
        all.into_iter().map(|(_, info)| info).collect()
    }
}

/// Keeps one connection listed. Dropping it removes the entry.
pub(crate) struct ConnectionGuard {
    registry: ConnectionRegistry,
    id: u64,
}

impl ConnectionGuard {
    /// Update this connection's metadata.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut ConnectionInfo),
    {
        if let Some(info) = self.registry.connections().get_mut(&self.id) {
            f(info);
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.connections().remove(&self.id);
    }
}
