//! Session router: the entry point the front end talks to.

use crate::backend::algorithms::{LeastConnections, RoundRobin};
use crate::backend::{BackendLoad, Selection, Strategy};
use crate::config::{Algorithm, BalancerConfig};
use crate::metrics::{ControlOperation, MetricsCollector, SelectionOutcome};
use parking_lot::RwLock;
use std::net::SocketAddr;
use tracing::{debug, info, warn};

/// Routes sessions to backend servers using the configured strategy.
///
/// Wraps a [`Strategy`] with logging and metrics. All pool changes and
/// session assignments go through here.
pub struct SessionRouter {
    /// The assignment strategy.
    strategy: Box<dyn Strategy>,
    /// Metrics collector.
    metrics: MetricsCollector,
    /// Per-backend gauge updates commute, except dropping a backend's series.
    /// Updates hold this shared; removing a backend holds it exclusively so a
    /// racing update cannot recreate the series it drops.
    gauges: RwLock<()>,
}

impl SessionRouter {
    /// Create a router from configuration and register its static servers.
    pub fn new(config: &BalancerConfig, metrics: MetricsCollector) -> Self {
        let strategy: Box<dyn Strategy> = match config.algorithm {
            Algorithm::LeastConnections => Box::new(LeastConnections::new()),
            Algorithm::RoundRobin => Box::new(RoundRobin::new()),
        };

        let router = Self::with_strategy(strategy, metrics);
        for server in &config.servers {
            router.register(*server);
        }
        router
    }

    /// Create a router around an existing strategy.
    pub fn with_strategy(strategy: Box<dyn Strategy>, metrics: MetricsCollector) -> Self {
        Self {
            strategy,
            metrics,
            gauges: RwLock::new(()),
        }
    }

    /// Name of the strategy in use.
    pub fn algorithm(&self) -> &'static str {
        self.strategy.name()
    }

    /// Register a backend.
    pub fn register(&self, address: SocketAddr) -> bool {
        let added = {
            let _gauges = self.gauges.read();
            let added = self.strategy.add_server(address);
            if added {
                self.metrics.backend_added(address);
            }
            added
        };
        self.metrics
            .record_control(ControlOperation::Register, added);

        if added {
            info!(server = %address, "backend registered");
        } else {
            debug!(server = %address, "backend already registered");
        }
        added
    }

    /// Deregister a backend. Its sessions become unbound.
    pub fn unregister(&self, address: SocketAddr) -> bool {
        let released = {
            let _gauges = self.gauges.write();
            let released = self.strategy.retire_server(address);
            if let Some(released) = released {
                self.metrics.backend_removed(address, released);
            }
            released
        };
        self.metrics
            .record_control(ControlOperation::Unregister, released.is_some());

        match released {
            Some(released) => {
                info!(server = %address, released, "backend unregistered");
                true
            }
            None => {
                debug!(server = %address, "unregister for unknown backend");
                false
            }
        }
    }

    /// End a session, freeing its slot on the backend.
    pub fn end_session(&self, session_id: &str) -> bool {
        let released = {
            let _gauges = self.gauges.read();
            let released = self.strategy.release_session(session_id);
            if let Some(server) = released {
                self.metrics.session_released(server);
            }
            released
        };
        self.metrics
            .record_control(ControlOperation::EndSession, released.is_some());

        match released {
            Some(server) => {
                debug!(session = session_id, server = %server, "session ended");
                true
            }
            None => {
                debug!(session = session_id, "end for unknown session");
                false
            }
        }
    }

    /// Select the backend for a session.
    pub fn select(&self, session_id: &str) -> Selection {
        let selection = {
            let _gauges = self.gauges.read();
            let selection = self.strategy.select_server(session_id);
            if let Selection::Assigned(server) = selection {
                self.metrics.session_bound(server);
            }
            selection
        };

        match selection {
            Selection::Existing(server) => {
                self.metrics.record_selection(SelectionOutcome::Affinity);
                debug!(session = session_id, server = %server, "session routed to bound backend");
            }
            Selection::Assigned(server) => {
                self.metrics.record_selection(SelectionOutcome::Assigned);
                debug!(session = session_id, server = %server, "session assigned to backend");
            }
            Selection::Unavailable => {
                self.metrics.record_selection(SelectionOutcome::Unavailable);
                warn!(session = session_id, "could not assign session, no backends available");
            }
        }

        selection
    }

    /// Current load of every backend.
    pub fn snapshot(&self) -> Vec<BackendLoad> {
        self.strategy.snapshot()
    }
}
