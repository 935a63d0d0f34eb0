//! Router assembly
//!
//! Layer order, outermost first: trace → CORS → authentication filter →
//! request logging → route guards → handlers.

use crate::{
    auth::{
        api as auth_api, auth_middleware, models::UserRole, require_authority, AuthFilter,
        AuthState, RequiredAuthority,
    },
    middleware::request_logging,
};
use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the application router
pub fn router(auth_state: AuthState, filter: Arc<AuthFilter>) -> Router {
    let auth_routes = Router::new()
        .route("/api/auth/login", post(auth_api::login))
        .route("/api/auth/me", get(auth_api::get_current_user));

    // guarded as a whole; handlers re-check with PermissionChecker
    let admin_routes = Router::new()
        .route(
            "/api/admin/users",
            get(auth_api::list_users).post(auth_api::create_user),
        )
        .route_layer(middleware::from_fn_with_state(
            RequiredAuthority::new(&UserRole::Admin.authority()),
            require_authority,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(auth_routes)
        .merge(admin_routes)
        .with_state(auth_state)
        .layer(middleware::from_fn(request_logging))
        .layer(middleware::from_fn_with_state(filter, auth_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
