//! Request ID generation for request tracing.
//!
//! Every front end request is tagged with an id that appears in its log span
//! and in the `x-request-id` response header.

use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Counter for short request IDs.
static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Longest client-supplied id accepted as-is.
const MAX_INBOUND_LEN: usize = 128;

/// Request ID carried through logs and response headers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    /// Create a new random UUID-based request ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a short counter-based ID, unique within this process.
    ///
    /// Format: `req-{counter}` with the counter as 16 hex digits.
    pub fn short() -> Self {
        let count = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("req-{:016x}", count))
    }

    /// Reuse an id supplied by the client, if it is reasonable.
    ///
    /// Empty, oversized or non-printable values are rejected so they never
    /// reach logs or headers verbatim.
    pub fn from_inbound(value: &str) -> Option<Self> {
        let acceptable = !value.is_empty()
            && value.len() <= MAX_INBOUND_LEN
            && value.bytes().all(|b| b.is_ascii_graphic());
        acceptable.then(|| Self(value.to_string()))
    }

    /// Get the request ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
