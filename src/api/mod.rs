//! HTTP/JSON API.
//!
//! Exposes the core operations as axum endpoints under `/api/`. The
//! calling principal is forwarded by a trusted gateway in request headers.
//!
//! The router is composable: `api_router()` returns a `Router` that can be
//! mounted on any axum server instance.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{start_api_server, ApiServer, ApiServerInfo, ServerError};
pub use types::ApiContext;
