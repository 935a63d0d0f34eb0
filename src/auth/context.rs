//! Authentication Context
//! Mission: Carry the resolved identity and authorities of one request, and nothing else
//!
//! The context lives in the request's extensions. It is created by the
//! authentication filter, travels with the request through the handler chain
//! and is dropped together with the request. There is no global or
//! thread-local slot, so pooled worker threads cannot observe another
//! request's identity.

use async_trait::async_trait;
use axum::{extract::FromRequestParts, extract::Request, http::request::Parts};
use std::collections::BTreeSet;
use std::convert::Infallible;

/// Resolved identity and authority set for the current request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthenticationContext {
    identity: Option<String>,
    authorities: BTreeSet<String>,
}

impl AuthenticationContext {
    /// Context of a request that presented no valid credential
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(identity: impl Into<String>, authorities: BTreeSet<String>) -> Self {
        Self {
            identity: Some(identity.into()),
            authorities,
        }
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn authorities(&self) -> &BTreeSet<String> {
        &self.authorities
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    pub fn has_authority(&self, authority: &str) -> bool {
        self.is_authenticated() && self.authorities.contains(authority)
    }
}

/// Context of `req`, if the authentication filter has run
pub fn extract_context(req: &Request) -> Option<&AuthenticationContext> {
    req.extensions().get::<AuthenticationContext>()
}

/// Handlers take the context as an extractor. A request that bypassed the
/// filter yields the anonymous context.
#[async_trait]
impl<S> FromRequestParts<S> for AuthenticationContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<AuthenticationContext>()
            .cloned()
            .unwrap_or_default())
    }
}
