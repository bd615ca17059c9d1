//! Session assignment strategies.

mod least_conn;
mod round_robin;

pub use least_conn::LeastConnections;
pub use round_robin::RoundRobin;

use crate::backend::Registry;
use std::net::SocketAddr;

/// Outcome of selecting a backend for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// The session was already bound; nothing changed.
    Existing(SocketAddr),
    /// The session was new and is now bound to this backend.
    Assigned(SocketAddr),
    /// No backend is registered.
    Unavailable,
}

impl Selection {
    /// The selected backend, if any.
    pub fn address(&self) -> Option<SocketAddr> {
        match self {
            Selection::Existing(address) | Selection::Assigned(address) => Some(*address),
            Selection::Unavailable => None,
        }
    }
}

/// Load of one backend at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendLoad {
    pub address: SocketAddr,
    pub sessions: usize,
}

/// Trait for session assignment strategies.
///
/// Every operation is atomic with respect to the others: implementations
/// update the registry and any derived structure under one lock.
pub trait Strategy: Send + Sync {
    /// Short name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Register a backend. Returns `false` if it is already registered.
    fn add_server(&self, address: SocketAddr) -> bool;

    /// Deregister a backend, unbinding its sessions. Returns how many
    /// sessions were released, or `None` if the address is unknown.
    fn retire_server(&self, address: SocketAddr) -> Option<usize>;

    /// Deregister a backend, unbinding its sessions. Returns `false` if the
    /// address is unknown.
    fn remove_server(&self, address: SocketAddr) -> bool {
        self.retire_server(address).is_some()
    }

    /// End a session, returning the backend it was bound to.
    fn release_session(&self, session_id: &str) -> Option<SocketAddr>;

    /// End a session. Returns `false` if the session is not bound.
    fn end_session(&self, session_id: &str) -> bool {
        self.release_session(session_id).is_some()
    }

    /// Pick the backend for a session, binding it if it is new.
    fn select_server(&self, session_id: &str) -> Selection;

    /// Current load of every backend, ordered by address.
    fn snapshot(&self) -> Vec<BackendLoad>;
}

/// Collect a registry's backends as an address-ordered snapshot.
pub(crate) fn snapshot_of(registry: &Registry) -> Vec<BackendLoad> {
    let mut loads: Vec<BackendLoad> = registry
        .backends()
        .map(|backend| BackendLoad {
            address: backend.address(),
            sessions: backend.load(),
        })
        .collect();
    loads.sort_by_key(|load| load.address);
    loads
}
