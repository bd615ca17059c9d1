//! Backend pool management and session assignment.
//!
//! The [`Registry`] owns backends and their session bindings, the
//! [`LeastConnectionsIndex`] is a derived view over it, and the strategies in
//! [`algorithms`] keep both in step under a single lock.

pub mod algorithms;
mod index;
mod registry;
mod router;
mod server;

pub use algorithms::{BackendLoad, Selection, Strategy};
pub use index::{LeastConnectionsIndex, NotIndexed};
pub use registry::Registry;
pub use router::SessionRouter;
pub use server::Backend;
