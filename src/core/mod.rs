//! Core application primitives (HTTP server, admin console)

pub mod admin;
pub mod http;

pub use admin::{AdminGate, GateDecision};
pub use http::{create_router, start_server, AppState, HealthStatus};
