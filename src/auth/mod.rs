//! Authentication Module
//! Mission: Bearer tokens, per-request identity, authority checks and login lockout

pub mod api;
pub mod attempts;
pub mod context;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod permission;
pub mod responders;
pub mod tracker;
pub mod user_store;

pub use api::AuthState;
pub use attempts::{InMemoryAttemptStore, LoginAttemptRecord, LoginAttemptStore, SqliteAttemptStore};
pub use context::AuthenticationContext;
pub use jwt::{AuthError, TokenCodec};
pub use middleware::{auth_middleware, AuthFilter, AuthorityResolver, ClaimsAuthorities};
pub use permission::{require_authority, AccessError, PermissionChecker, RequiredAuthority};
pub use responders::{error_body, ErrorBody, FailureKind, FailureResponse};
pub use tracker::{spawn_sweeper, FailureOutcome, LockoutPolicy, LoginAttemptError, LoginAttemptTracker};
pub use user_store::UserStore;
