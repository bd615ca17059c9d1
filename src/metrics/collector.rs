//! Metrics collector using prometheus-client.
//!
//! Provides metrics for session selections, control operations, pool size,
//! per-backend load and request latency.

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Labels for selection metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct SelectionLabels {
    pub outcome: SelectionOutcome,
}

/// How a selection was resolved.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum SelectionOutcome {
    /// Session was already bound.
    Affinity,
    /// New session bound to a backend.
    Assigned,
    /// No backend registered.
    Unavailable,
}

/// Labels for control operation metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ControlLabels {
    pub operation: ControlOperation,
    pub result: ControlResult,
}

/// A pool-changing operation.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum ControlOperation {
    Register,
    Unregister,
    EndSession,
}

/// Whether a control operation changed anything.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum ControlResult {
    Applied,
    Rejected,
}

/// Labels for per-backend metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct BackendLabels {
    pub server: String,
}

/// Labels for request latency.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RouteLabels {
    pub route: RouteKind,
}

/// Which kind of front end endpoint served a request.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum RouteKind {
    Control,
    Select,
}

/// Collects and stores all metrics.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<MetricsCollectorInner>,
}

struct MetricsCollectorInner {
    /// Selections by outcome.
    selections_total: Family<SelectionLabels, Counter>,
    /// Control operations by operation and result.
    control_operations_total: Family<ControlLabels, Counter>,
    /// Registered backends.
    backends: Gauge,
    /// Bound sessions across all backends.
    sessions: Gauge,
    /// Bound sessions per backend.
    backend_sessions: Family<BackendLabels, Gauge>,
    /// Front end request duration histogram (in seconds).
    request_duration_seconds: Family<RouteLabels, Histogram>,
    /// The prometheus registry.
    registry: Registry,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let selections_total = Family::<SelectionLabels, Counter>::default();
        let control_operations_total = Family::<ControlLabels, Counter>::default();
        let backends: Gauge = Gauge::default();
        let sessions: Gauge = Gauge::default();
        let backend_sessions = Family::<BackendLabels, Gauge>::default();
        let request_duration_seconds =
            Family::<RouteLabels, Histogram>::new_with_constructor(|| {
                // 50us up to roughly 1.6s
                Histogram::new(exponential_buckets(0.00005, 2.0, 16))
            });

        registry.register(
            "roomlb_selections",
            "Session selections by outcome",
            selections_total.clone(),
        );
        registry.register(
            "roomlb_control_operations",
            "Register, unregister and end-session operations",
            control_operations_total.clone(),
        );
        registry.register(
            "roomlb_backends",
            "Number of registered backends",
            backends.clone(),
        );
        registry.register(
            "roomlb_sessions",
            "Number of bound sessions",
            sessions.clone(),
        );
        registry.register(
            "roomlb_backend_sessions",
            "Number of sessions bound to each backend",
            backend_sessions.clone(),
        );
        registry.register(
            "roomlb_request_duration_seconds",
            "Front end request duration in seconds",
            request_duration_seconds.clone(),
        );

        Self {
            inner: Arc::new(MetricsCollectorInner {
                selections_total,
                control_operations_total,
                backends,
                sessions,
                backend_sessions,
                request_duration_seconds,
                registry,
            }),
        }
    }

    /// Get the prometheus registry for encoding.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Record how a selection was resolved.
    pub fn record_selection(&self, outcome: SelectionOutcome) {
        self.inner
            .selections_total
            .get_or_create(&SelectionLabels { outcome })
            .inc();
    }

    /// Record a control operation and whether it changed the pool.
    pub fn record_control(&self, operation: ControlOperation, applied: bool) {
        let result = if applied {
            ControlResult::Applied
        } else {
            ControlResult::Rejected
        };
        self.inner
            .control_operations_total
            .get_or_create(&ControlLabels { operation, result })
            .inc();
    }

    /// Record a newly registered backend.
    pub fn backend_added(&self, address: SocketAddr) {
        self.inner.backends.inc();
        // Create the series so an idle backend reports zero
        let _ = self.inner.backend_sessions.get_or_create(&backend_labels(address));
    }

    /// Record a deregistered backend and the sessions released with it.
    pub fn backend_removed(&self, address: SocketAddr, released: usize) {
        self.inner.backends.dec();
        self.inner.sessions.dec_by(released as i64);
        self.inner.backend_sessions.remove(&backend_labels(address));
    }

    /// Record a session bound to `address`.
    pub fn session_bound(&self, address: SocketAddr) {
        self.inner.sessions.inc();
        self.inner
            .backend_sessions
            .get_or_create(&backend_labels(address))
            .inc();
    }

    /// Record a session released from `address`.
    pub fn session_released(&self, address: SocketAddr) {
        self.inner.sessions.dec();
        self.inner
            .backend_sessions
            .get_or_create(&backend_labels(address))
            .dec();
    }

    /// Record how long a front end request took.
    pub fn record_request(&self, route: RouteKind, duration: Duration) {
        self.inner
            .request_duration_seconds
            .get_or_create(&RouteLabels { route })
            .observe(duration.as_secs_f64());
    }
}

fn backend_labels(address: SocketAddr) -> BackendLabels {
    BackendLabels {
        server: address.to_string(),
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus_client::encoding::text::encode;

    fn encoded(collector: &MetricsCollector) -> String {
        let mut buffer = String::new();
        encode(&mut buffer, collector.registry()).unwrap();
        buffer
    }

    #[test]
    fn test_record_selection() {
        let collector = MetricsCollector::new();
        collector.record_selection(SelectionOutcome::Assigned);
        collector.record_selection(SelectionOutcome::Affinity);
        collector.record_selection(SelectionOutcome::Affinity);

        let text = encoded(&collector);
        assert!(text.contains("roomlb_selections_total{outcome=\"Affinity\"} 2"));
        assert!(text.contains("roomlb_selections_total{outcome=\"Assigned\"} 1"));
    }

    #[test]
    fn test_record_control() {
        let collector = MetricsCollector::new();
        collector.record_control(ControlOperation::Register, true);
        collector.record_control(ControlOperation::Register, false);

        let text = encoded(&collector);
        assert!(text.contains("roomlb_control_operations_total"));
        assert!(text.contains("result=\"Rejected\""));
    }

    #[test]
    fn test_pool_gauges_follow_changes() {
        let collector = MetricsCollector::new();
        let a: SocketAddr = "127.0.0.1:8001".parse().unwrap();
        let b: SocketAddr = "127.0.0.1:8002".parse().unwrap();

        collector.backend_added(a);
        collector.backend_added(b);
        collector.session_bound(a);
        collector.session_bound(a);
        collector.session_bound(b);

        let text = encoded(&collector);
        assert!(text.contains("roomlb_backends 2"));
        assert!(text.contains("roomlb_sessions 3"));
        assert!(text.contains("roomlb_backend_sessions{server=\"127.0.0.1:8001\"} 2"));

        collector.session_released(a);
        collector.backend_removed(b, 1);
        let text = encoded(&collector);
        assert!(text.contains("roomlb_backends 1"));
        assert!(text.contains("roomlb_sessions 1"));
        assert!(text.contains("roomlb_backend_sessions{server=\"127.0.0.1:8001\"} 1"));
        assert!(!text.contains("127.0.0.1:8002"));
    }

    #[test]
    fn test_new_backend_reports_zero_sessions() {
        let collector = MetricsCollector::new();
        collector.backend_added("127.0.0.1:8001".parse().unwrap());
        assert!(encoded(&collector).contains("roomlb_backend_sessions{server=\"127.0.0.1:8001\"} 0"));
    }

    #[test]
    fn test_record_request() {
        let collector = MetricsCollector::new();
        collector.record_request(RouteKind::Select, Duration::from_micros(120));
        assert!(encoded(&collector).contains("roomlb_request_duration_seconds"));
    }
}
