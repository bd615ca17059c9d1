//! roomlb - session-affine load balancer
//!
//! This crate assigns long-lived sessions (game rooms, collaborative
//! documents) to backend servers:
//! - Sticky affinity: a session keeps its backend until it ends
//! - Least-connections assignment for new sessions, or round robin
//! - Runtime backend registration over HTTP control endpoints
//! - Prometheus metrics

pub mod backend;
pub mod config;
pub mod frontend;
pub mod metrics;
pub mod util;

pub use config::Config;
