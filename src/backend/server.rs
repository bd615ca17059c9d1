//! A registered backend server and the sessions bound to it.

use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;

/// A backend server eligible to receive sessions.
///
/// A backend is identified by its address alone. Two records with the same
/// address compare equal and hash identically no matter which sessions they
/// currently hold, so set and map membership never shifts as load changes.
#[derive(Debug, Clone)]
pub struct Backend {
    /// Network address, unique across the registry.
    address: SocketAddr,
    /// Session ids currently bound to this backend.
    sessions: HashSet<String>,
}

impl Backend {
    /// Create a backend with no sessions.
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            sessions: HashSet::new(),
        }
    }

    /// The backend's address.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Number of sessions currently bound to this backend.
    pub fn load(&self) -> usize {
        self.sessions.len()
    }

    /// Session ids currently bound to this backend.
    pub fn sessions(&self) -> &HashSet<String> {
        &self.sessions
    }

    /// Whether the given session is bound here.
    #[cfg(test)]
    pub(crate) fn has_session(&self, session_id: &str) -> bool {
        self.sessions.contains(session_id)
    }

    pub(crate) fn add_session(&mut self, session_id: String) -> bool {
        self.sessions.insert(session_id)
    }

    pub(crate) fn remove_session(&mut self, session_id: &str) -> bool {
        self.sessions.remove(session_id)
    }
}

impl PartialEq for Backend {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for Backend {}

impl Hash for Backend {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}
