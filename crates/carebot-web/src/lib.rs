//! carebot-web: HTTP surface for the carebot chat pipeline.
//!   - Chat ask + aggregated upstream health
//!   - Audit tooling (export, high-risk feed, compliance report, retention)
//!   - Security alert stream (SSE)
//!   - Prometheus metrics

pub mod auth;
pub mod error;
pub mod handlers;
pub mod router;
pub mod sse;
pub mod state;
