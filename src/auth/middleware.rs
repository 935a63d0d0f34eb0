//! Authentication Filter
//! Mission: Turn the bearer credential of each request into an AuthenticationContext
//!
//! The filter never rejects a request. It writes exactly one context into the
//! request extensions (authenticated or anonymous) and always continues, so
//! public routes stay reachable; protected routes are refused later by the
//! permission checker.

use crate::auth::{
    context::AuthenticationContext,
    jwt::TokenCodec,
    models::Claims,
    user_store::UserStore,
};
use anyhow::Result;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Resolves the authorities a validated subject currently holds
pub trait AuthorityResolver: Send + Sync {
    /// `Ok(None)` means the subject is no longer known and must not be authenticated
    fn resolve(&self, claims: &Claims) -> Result<Option<BTreeSet<String>>>;
}

/// Trusts the authority set embedded in the token
pub struct ClaimsAuthorities;

impl AuthorityResolver for ClaimsAuthorities {
    fn resolve(&self, claims: &Claims) -> Result<Option<BTreeSet<String>>> {
        Ok(Some(claims.authorities.clone()))
    }
}

/// Looks up the subject's current role, so role changes apply to live tokens
impl AuthorityResolver for UserStore {
    fn resolve(&self, claims: &Claims) -> Result<Option<BTreeSet<String>>> {
        Ok(self
            .get_user_by_username(&claims.sub)?
            .map(|user| user.authorities()))
    }
}

/// Per-request authentication pipeline
pub struct AuthFilter {
    codec: Arc<TokenCodec>,
    resolver: Arc<dyn AuthorityResolver>,
}

impl AuthFilter {
    pub fn new(codec: Arc<TokenCodec>, resolver: Arc<dyn AuthorityResolver>) -> Self {
        Self { codec, resolver }
    }

    /// Build the context for a request carrying `headers`, evaluated at `now`
    pub fn authenticate(&self, headers: &HeaderMap, now: DateTime<Utc>) -> AuthenticationContext {
        let Some(token) = bearer_token(headers) else {
            return AuthenticationContext::anonymous();
        };

        let claims = match self.codec.validate(token, now) {
            Ok(claims) => claims,
            Err(e) => {
                // detail stays in the log; clients only see a generic 401
                debug!(reason = %e, "Bearer token rejected");
                return AuthenticationContext::anonymous();
            }
        };

        match self.resolver.resolve(&claims) {
            Ok(Some(authorities)) => AuthenticationContext::authenticated(claims.sub, authorities),
            Ok(None) => {
                warn!(username = %claims.sub, "Token subject no longer exists");
                AuthenticationContext::anonymous()
            }
            Err(e) => {
                error!(username = %claims.sub, "Authority lookup failed: {:#}", e);
                AuthenticationContext::anonymous()
            }
        }
    }
}

/// Token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Auth middleware that populates the request's AuthenticationContext
pub async fn auth_middleware(
    State(filter): State<Arc<AuthFilter>>,
    mut req: Request,
    next: Next,
) -> Response {
    let ctx = filter.authenticate(req.headers(), Utc::now());
    // replaces anything an earlier layer or the client smuggled in
    req.extensions_mut().insert(ctx);
    next.run(req).await
}
