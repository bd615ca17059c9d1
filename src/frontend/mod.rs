//! Session front end.
//!
//! Accepts client connections, answers session lookups with the selected
//! backend, and exposes control endpoints for the backend pool.

mod handler;
mod listener;

pub use handler::{REQUEST_ID_HEADER, RequestError, SELECTED_BACKEND_HEADER};
pub use listener::FrontendListener;
