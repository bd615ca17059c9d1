//! Registry of live backends and their session bindings.

use crate::backend::Backend;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use tracing::warn;

/// Tracks live backends and the sessions bound to each.
///
/// The registry is the source of truth for load: a backend's load is always
/// the size of its session set here. It also keeps the reverse
/// session -> backend lookup so affinity checks are O(1).
#[derive(Debug, Default)]
pub struct Registry {
    /// Backends keyed by address.
    backends: HashMap<SocketAddr, Backend>,
    /// Reverse lookup from session id to owning backend.
    sessions: HashMap<String, SocketAddr>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a backend with zero sessions.
    ///
    /// Returns `false` without touching anything if the address is already
    /// registered. An existing backend is never reset.
    pub fn register(&mut self, address: SocketAddr) -> bool {
        if self.backends.contains_key(&address) {
            return false;
        }
        self.backends.insert(address, Backend::new(address));
        true
    }

    /// Remove a backend and unbind every session it holds.
    ///
    /// Unbound sessions are not migrated. Returns `false` if the address is
    /// unknown.
    pub fn deregister(&mut self, address: SocketAddr) -> bool {
        let Some(backend) = self.backends.remove(&address) else {
            return false;
        };

        for session_id in backend.sessions() {
            if self.sessions.remove(session_id).is_none() {
                warn!(
                    backend = %address,
                    session = %session_id,
                    "session bound to backend had no reverse lookup entry"
                );
            }
        }

        true
    }

    /// Look up a backend by address.
    pub fn backend(&self, address: &SocketAddr) -> Option<&Backend> {
        self.backends.get(address)
    }

    /// Session ids bound to a backend, if it is registered.
    pub fn sessions_of(&self, address: &SocketAddr) -> Option<&HashSet<String>> {
        self.backends.get(address).map(Backend::sessions)
    }

    /// Resolve the backend a session is bound to.
    pub fn resolve(&self, session_id: &str) -> Option<&Backend> {
        self.sessions
            .get(session_id)
            .and_then(|address| self.backends.get(address))
    }

    /// Bind a new session to a registered backend.
    ///
    /// Returns `false` if the session is already bound (bindings are never
    /// moved while they exist) or the backend is unknown.
    pub fn bind(&mut self, session_id: &str, address: SocketAddr) -> bool {
        if self.sessions.contains_key(session_id) {
            return false;
        }
        let Some(backend) = self.backends.get_mut(&address) else {
            return false;
        };

        backend.add_session(session_id.to_string());
        self.sessions.insert(session_id.to_string(), address);
        true
    }

    /// Drop a session's binding, returning the backend it was bound to.
    pub fn unbind(&mut self, session_id: &str) -> Option<SocketAddr> {
        let address = self.sessions.remove(session_id)?;
        if let Some(backend) = self.backends.get_mut(&address) {
            backend.remove_session(session_id);
        }
        Some(address)
    }

    /// Iterate over all registered backends in no particular order.
    pub fn backends(&self) -> impl Iterator<Item = &Backend> {
        self.backends.values()
    }

    /// Number of registered backends.
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Whether no backend is registered.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Number of bound sessions across all backends.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
