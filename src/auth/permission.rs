//! Permission Checker
//! Mission: Decide whether the current request may perform a protected operation

use crate::auth::{
    context::{extract_context, AuthenticationContext},
    responders::FailureResponse,
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Authorization failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("no authenticated identity")]
    Unauthenticated,
    #[error("identity lacks the required authority")]
    Forbidden,
}

/// Evaluates authority requirements against one request's context.
///
/// Borrowing the context ties every check to the request that owns it.
pub struct PermissionChecker<'a> {
    ctx: &'a AuthenticationContext,
}

impl<'a> PermissionChecker<'a> {
    pub fn new(ctx: &'a AuthenticationContext) -> Self {
        Self { ctx }
    }

    /// Require `authority`, e.g. `ROLE_TRAINER`
    pub fn require(&self, authority: &str) -> Result<(), AccessError> {
        let Some(identity) = self.ctx.identity() else {
            debug!(required = %authority, "Access denied: unauthenticated");
            return Err(AccessError::Unauthenticated);
        };

        if !self.ctx.authorities().contains(authority) {
            warn!(
                username = %identity,
                required = %authority,
                "Access denied: missing authority"
            );
            return Err(AccessError::Forbidden);
        }

        debug!(username = %identity, required = %authority, "Access granted");
        Ok(())
    }

    /// Require at least one of `authorities`
    pub fn require_any(&self, authorities: &[&str]) -> Result<(), AccessError> {
        let Some(identity) = self.ctx.identity() else {
            return Err(AccessError::Unauthenticated);
        };

        if authorities.iter().any(|a| self.ctx.authorities().contains(*a)) {
            Ok(())
        } else {
            warn!(
                username = %identity,
                required = ?authorities,
                "Access denied: none of the required authorities"
            );
            Err(AccessError::Forbidden)
        }
    }
}

/// Authority demanded by every route behind [`require_authority`]
#[derive(Debug, Clone)]
pub struct RequiredAuthority(pub Arc<str>);

impl RequiredAuthority {
    pub fn new(authority: &str) -> Self {
        Self(Arc::from(authority))
    }
}

/// Route-level guard: rejects the request unless its context holds the authority
pub async fn require_authority(
    State(required): State<RequiredAuthority>,
    req: Request,
    next: Next,
) -> Response {
    let decision = match extract_context(&req) {
        Some(ctx) => PermissionChecker::new(ctx).require(&required.0),
        None => Err(AccessError::Unauthenticated),
    };

    match decision {
        Ok(()) => next.run(req).await,
        Err(e) => FailureResponse::new(e.into(), req.uri().path()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use std::collections::BTreeSet;
    use tower::ServiceExt;

    fn trainer() -> AuthenticationContext {
        AuthenticationContext::authenticated("anna", BTreeSet::from(["ROLE_TRAINER".to_string()]))
    }

    #[test]
    fn test_require_unauthenticated() {
        let ctx = AuthenticationContext::anonymous();
        assert_eq!(
            PermissionChecker::new(&ctx).require("ROLE_TRAINER"),
            Err(AccessError::Unauthenticated)
        );
    }

    #[test]
    fn test_require_forbidden_and_granted() {
        let ctx = trainer();
        let checker = PermissionChecker::new(&ctx);
        assert_eq!(checker.require("ROLE_TRAINER"), Ok(()));
        assert_eq!(checker.require("ROLE_ADMIN"), Err(AccessError::Forbidden));
        // repeated checks see the same context
        assert_eq!(checker.require("ROLE_TRAINER"), Ok(()));
    }

    #[test]
    fn test_require_any() {
        let ctx = trainer();
        let checker = PermissionChecker::new(&ctx);
        assert!(checker.require_any(&["ROLE_ADMIN", "ROLE_TRAINER"]).is_ok());
        assert_eq!(
            checker.require_any(&["ROLE_ADMIN", "ROLE_TRAINEE"]),
            Err(AccessError::Forbidden)
        );
    }

    fn guarded() -> Router {
        Router::new().route("/admin", get(|| async { "ok" })).route_layer(
            middleware::from_fn_with_state(RequiredAuthority::new("ROLE_ADMIN"), require_authority),
        )
    }

    #[tokio::test]
    async fn test_guard_rejects_without_context() {
        let response = guarded()
            .oneshot(axum::http::Request::get("/admin").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_guard_forbids_and_admits() {
        let mut req = axum::http::Request::get("/admin").body(Body::empty()).unwrap();
        req.extensions_mut().insert(trainer());
        let response = guarded().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let mut req = axum::http::Request::get("/admin").body(Body::empty()).unwrap();
        req.extensions_mut().insert(AuthenticationContext::authenticated(
            "root",
            BTreeSet::from(["ROLE_ADMIN".to_string()]),
        ));
        let response = guarded().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
