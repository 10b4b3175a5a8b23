//! HTTP interface.
//!
//! Exposes the clinic workflows as a JSON API under `/api/` and the gated
//! web views at the root. `app_router()` returns a composable `Router`;
//! `start_server()` binds and serves it.

pub mod access;
pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::app_router;
pub use server::{start_server, ApiServer, ServerSession};
pub use types::ApiContext;
