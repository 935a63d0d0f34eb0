//! Middleware for observability.
//!
//! Authentication lives in `auth::middleware`; this module only carries the
//! request logger layered inside it.

pub mod logging;

pub use logging::request_logging;
