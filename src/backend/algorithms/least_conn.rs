//! Least-connections assignment with session affinity.

use super::{BackendLoad, Selection, Strategy, snapshot_of};
use crate::backend::{Backend, LeastConnectionsIndex, Registry};
use parking_lot::Mutex;
use std::net::SocketAddr;

/// Least-connections strategy.
///
/// Sessions that are already bound go straight back to their backend. New
/// sessions go to a backend with the fewest bound sessions, found through a
/// [`LeastConnectionsIndex`]. Ties resolve to the lowest address.
pub struct LeastConnections {
    pool: Mutex<Pool>,
}

/// Registry plus the index derived from it, always mutated together.
#[derive(Debug, Default)]
struct Pool {
    registry: Registry,
    index: LeastConnectionsIndex,
}

impl Pool {
    /// Apply a change to one backend's sessions, keeping its bucket in sync.
    ///
    /// The backend leaves the index under its current load before `mutate`
    /// runs and re-enters under its new load afterwards.
    fn rebalance<R>(&mut self, address: SocketAddr, mutate: impl FnOnce(&mut Registry) -> R) -> R {
        if let Some(backend) = self.registry.backend(&address) {
            unindex(&mut self.index, backend);
        }
        let result = mutate(&mut self.registry);
        if let Some(backend) = self.registry.backend(&address) {
            self.index.insert(backend);
        }
        result
    }
}

/// Remove a backend from the index, aborting if the two have diverged.
fn unindex(index: &mut LeastConnectionsIndex, backend: &Backend) {
    if let Err(e) = index.remove(backend) {
        panic!("least-connections index out of sync with registry: {e}");
    }
}

impl LeastConnections {
    /// Create a least-connections strategy with no backends.
    pub fn new() -> Self {
        Self {
            pool: Mutex::new(Pool::default()),
        }
    }
}

impl Default for LeastConnections {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for LeastConnections {
    fn name(&self) -> &'static str {
        "least_connections"
    }

    fn add_server(&self, address: SocketAddr) -> bool {
        let mut pool = self.pool.lock();
        let Pool { registry, index } = &mut *pool;

        if !registry.register(address) {
            return false;
        }
        if let Some(backend) = registry.backend(&address) {
            index.insert(backend);
        }
        true
    }

    fn retire_server(&self, address: SocketAddr) -> Option<usize> {
        let mut pool = self.pool.lock();
        let Pool { registry, index } = &mut *pool;

        let backend = registry.backend(&address)?;
        let released = backend.load();
        unindex(index, backend);
        registry.deregister(address).then_some(released)
    }

    fn release_session(&self, session_id: &str) -> Option<SocketAddr> {
        let mut pool = self.pool.lock();

        let address = pool.registry.resolve(session_id).map(Backend::address)?;
        pool.rebalance(address, |registry| registry.unbind(session_id))
    }

    fn select_server(&self, session_id: &str) -> Selection {
        let mut pool = self.pool.lock();

        if let Some(backend) = pool.registry.resolve(session_id) {
            return Selection::Existing(backend.address());
        }

        let Some(address) = pool.index.minimum() else {
            return Selection::Unavailable;
        };
        let bound = pool.rebalance(address, |registry| registry.bind(session_id, address));
        debug_assert!(bound, "least-loaded backend {address} rejected new session");

        Selection::Assigned(address)
    }

    fn snapshot(&self) -> Vec<BackendLoad> {
        snapshot_of(&self.pool.lock().registry)
    }
}
