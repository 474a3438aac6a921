//! REST front-end
//!
//! JSON-over-HTTP access to the shared SSH session. Every route except
//! `/health` requires the configured API key and counts against a per-IP
//! request budget.

mod error;
mod handlers;
mod router;
mod server;

pub use error::ApiError;
pub use server::ApiServer;
