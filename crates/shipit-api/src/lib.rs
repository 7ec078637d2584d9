//! HTTP API server for Shipit.
//!
//! REST endpoints for projects, stages, deploys and outbound webhooks, a
//! WebSocket for live deploy output, and the inbound CI integration endpoint.

pub mod error;
pub mod extract;
pub mod routes;
pub mod services;
pub mod state;
pub mod ws;

pub use state::AppState;
