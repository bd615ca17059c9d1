//! Round-robin assignment with session affinity.

use super::{BackendLoad, Selection, Strategy, snapshot_of};
use crate::backend::Registry;
use parking_lot::Mutex;
use std::net::SocketAddr;

/// Round-robin strategy.
///
/// Bound sessions stick to their backend exactly as with least connections.
/// New sessions rotate through backends in registration order, ignoring load.
pub struct RoundRobin {
    state: Mutex<Rotation>,
}

#[derive(Debug, Default)]
struct Rotation {
    registry: Registry,
    /// Registered backends in registration order.
    order: Vec<SocketAddr>,
    /// Position of the next backend to hand out.
    cursor: usize,
}

impl RoundRobin {
    /// Create a round-robin strategy with no backends.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(Rotation::default()),
        }
    }
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for RoundRobin {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn add_server(&self, address: SocketAddr) -> bool {
        let mut state = self.state.lock();
        if !state.registry.register(address) {
            return false;
        }
        state.order.push(address);
        true
    }

    fn retire_server(&self, address: SocketAddr) -> Option<usize> {
        let mut state = self.state.lock();
        let released = state.registry.backend(&address)?.load();
        if !state.registry.deregister(address) {
            return None;
        }

        if let Some(pos) = state.order.iter().position(|a| *a == address) {
            state.order.remove(pos);
            // Keep pointing at the backend that would have come next
            if pos < state.cursor {
                state.cursor -= 1;
            }
        }
        Some(released)
    }

    fn release_session(&self, session_id: &str) -> Option<SocketAddr> {
        self.state.lock().registry.unbind(session_id)
    }

    fn select_server(&self, session_id: &str) -> Selection {
        let mut state = self.state.lock();

        if let Some(backend) = state.registry.resolve(session_id) {
            return Selection::Existing(backend.address());
        }
        if state.order.is_empty() {
            return Selection::Unavailable;
        }

        let idx = state.cursor % state.order.len();
        let address = state.order[idx];
        state.cursor = (idx + 1) % state.order.len();
        state.registry.bind(session_id, address);

        Selection::Assigned(address)
    }

    fn snapshot(&self) -> Vec<BackendLoad> {
        snapshot_of(&self.state.lock().registry)
    }
}
