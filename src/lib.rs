//! Gymdesk Backend Library
//!
//! Request-time authentication and authorization for the gym back office:
//! bearer tokens, the per-request authentication filter, authority checks and
//! brute-force login lockout. Business resources plug in behind the router
//! and consume the `AuthenticationContext` it produces.

pub mod app;
pub mod auth;
pub mod config;
pub mod middleware;

pub use config::Config;
