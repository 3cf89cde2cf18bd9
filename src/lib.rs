//! Outflow - HTTP response emission
//!
//! Builds and sends HTTP responses over a flow-controlled transport: status
//! and header state, backpressure-aware body streaming, file serving with an
//! off-thread reader, and the usual response helpers (cookies, redirects,
//! JSON, content negotiation).

pub mod config;
pub mod error;
pub mod http;
pub mod server;
