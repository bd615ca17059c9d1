//! Metrics collection and exposition.

mod collector;
mod server;

pub use collector::{
    ControlOperation, ControlResult, MetricsCollector, RouteKind, SelectionOutcome,
};
pub use server::MetricsServer;
