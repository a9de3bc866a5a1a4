//! HTTP API exposing pool readiness

mod server;
mod handlers;
mod types;

pub use server::Server;
pub use types::*;
