//! Authentication API Endpoints
//! Mission: Provide login, identity and user administration endpoints

use crate::auth::{
    context::AuthenticationContext,
    jwt::TokenCodec,
    models::{
        CreateUserRequest, LoginRequest, LoginResponse, PrincipalResponse, UserResponse, UserRole,
    },
    permission::PermissionChecker,
    responders::{FailureKind, FailureResponse},
    tracker::LoginAttemptTracker,
    user_store::{is_duplicate_username, UserStore},
};
use axum::{
    extract::{OriginalUri, State},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Minimum accepted password length for new accounts
const MIN_PASSWORD_LEN: usize = 8;

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub user_store: Arc<UserStore>,
    pub codec: Arc<TokenCodec>,
    pub tracker: Arc<LoginAttemptTracker>,
}

impl AuthState {
    pub fn new(
        user_store: Arc<UserStore>,
        codec: Arc<TokenCodec>,
        tracker: Arc<LoginAttemptTracker>,
    ) -> Self {
        Self {
            user_store,
            codec,
            tracker,
        }
    }
}

/// Login endpoint - POST /api/auth/login
///
/// Lockout is checked before the credential, and a correct credential
/// presented during lockout is still refused.
pub async fn login(
    State(state): State<AuthState>,
    OriginalUri(uri): OriginalUri,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, FailureResponse> {
    let fail = |kind: FailureKind| FailureResponse::new(kind, uri.path());
    let username = payload.username.trim();
    if username.is_empty() || payload.password.is_empty() {
        return Err(fail(FailureKind::BadRequest("Username and password are required")));
    }

    info!("🔐 Login attempt: {}", username);
    let now = Utc::now();

    if state
        .tracker
        .is_blocked(username, now)
        .map_err(|e| fail(e.into()))?
    {
        warn!("Login refused, account locked: {}", username);
        return Err(fail(FailureKind::StillLocked));
    }

    let valid = state
        .user_store
        .verify_password(username, &payload.password)
        .map_err(|e| {
            error!("Credential check failed for {}: {:#}", username, e);
            fail(FailureKind::Internal)
        })?;

    if !valid {
        state
            .tracker
            .record_failure(username, now)
            .map_err(|e| fail(e.into()))?;
        warn!("❌ Failed login attempt: {}", username);
        return Err(fail(FailureKind::InvalidCredentials));
    }

    state
        .tracker
        .record_success(username, now)
        .map_err(|e| fail(e.into()))?;

    let user = state
        .user_store
        .get_user_by_username(username)
        .map_err(|e| {
            error!("User lookup failed for {}: {:#}", username, e);
            fail(FailureKind::Internal)
        })?
        .ok_or_else(|| fail(FailureKind::InvalidCredentials))?;

    let issued = state
        .codec
        .issue(&user.username, &user.authorities(), now)
        .map_err(|e| {
            error!("Token issuance failed for {}: {:#}", username, e);
            fail(FailureKind::Internal)
        })?;

    info!(
        "✅ Login successful: {} ({})",
        user.username,
        user.role.as_str()
    );

    Ok(Json(LoginResponse {
        token: issued.token,
        token_type: "Bearer".to_string(),
        expires_in: issued.expires_in,
        username: user.username,
        authorities: issued.claims.authorities,
    }))
}

/// Get current principal - GET /api/auth/me
pub async fn get_current_user(
    ctx: AuthenticationContext,
    OriginalUri(uri): OriginalUri,
) -> Result<Json<PrincipalResponse>, FailureResponse> {
    let Some(username) = ctx.identity() else {
        return Err(FailureResponse::new(FailureKind::Unauthenticated, uri.path()));
    };

    Ok(Json(PrincipalResponse {
        username: username.to_string(),
        authorities: ctx.authorities().clone(),
    }))
}

/// List all users - GET /api/admin/users (Admin only)
pub async fn list_users(
    State(state): State<AuthState>,
    ctx: AuthenticationContext,
    OriginalUri(uri): OriginalUri,
) -> Result<Json<Vec<UserResponse>>, FailureResponse> {
    let fail = |kind: FailureKind| FailureResponse::new(kind, uri.path());
    PermissionChecker::new(&ctx)
        .require(&UserRole::Admin.authority())
        .map_err(|e| fail(e.into()))?;

    let users = state.user_store.list_users().map_err(|e| {
        error!("Failed to list users: {:#}", e);
        fail(FailureKind::Internal)
    })?;

    Ok(Json(users.iter().map(UserResponse::from_user).collect()))
}

/// Create user - POST /api/admin/users (Admin only)
pub async fn create_user(
    State(state): State<AuthState>,
    ctx: AuthenticationContext,
    OriginalUri(uri): OriginalUri,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Json<UserResponse>, FailureResponse> {
    let fail = |kind: FailureKind| FailureResponse::new(kind, uri.path());
    PermissionChecker::new(&ctx)
        .require(&UserRole::Admin.authority())
        .map_err(|e| fail(e.into()))?;

    if payload.username.trim().is_empty() {
        return Err(fail(FailureKind::BadRequest("Username is required")));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(fail(FailureKind::BadRequest(
            "Password must be at least 8 characters",
        )));
    }

    let user = state
        .user_store
        .create_user(payload.username.trim(), &payload.password, payload.role)
        .map_err(|e| {
            if is_duplicate_username(&e) {
                warn!("User already exists: {}", payload.username.trim());
                fail(FailureKind::Conflict("Username already exists"))
            } else {
                error!("Failed to create user: {:#}", e);
                fail(FailureKind::Internal)
            }
        })?;

    info!(
        admin = ctx.identity().unwrap_or_default(),
        "User created: {} ({})",
        user.username,
        user.role.as_str()
    );

    Ok(Json(UserResponse::from_user(&user)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        attempts::{InMemoryAttemptStore, LoginAttemptRecord, LoginAttemptStore},
        tracker::LockoutPolicy,
    };
    use axum::http::{StatusCode, Uri};
    use axum::response::IntoResponse;
    use std::collections::BTreeSet;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn state(temp: &NamedTempFile, max_attempts: u32) -> AuthState {
        state_with_attempts(temp, max_attempts, Arc::new(InMemoryAttemptStore::new()))
    }

    fn state_with_attempts(
        temp: &NamedTempFile,
        max_attempts: u32,
        attempts: Arc<dyn LoginAttemptStore>,
    ) -> AuthState {
        let store = UserStore::with_hash_cost(temp.path().to_str().unwrap(), 4).unwrap();
        store
            .create_user("anna", "trainer-pass", UserRole::Trainer)
            .unwrap();
        let codec =
            TokenCodec::new("api-test-secret", Duration::from_secs(3600), Duration::ZERO).unwrap();
        let tracker = LoginAttemptTracker::new(
            attempts,
            LockoutPolicy::new(max_attempts, Duration::from_secs(60)),
        )
        .unwrap();
        AuthState::new(Arc::new(store), Arc::new(codec), Arc::new(tracker))
    }

    fn login_uri() -> OriginalUri {
        OriginalUri(Uri::from_static("/api/auth/login"))
    }

    fn request(username: &str, password: &str) -> Json<LoginRequest> {
        Json(LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    fn status_of(err: FailureResponse) -> StatusCode {
        err.into_response().status()
    }

    #[tokio::test]
    async fn test_login_issues_token() {
        let temp = NamedTempFile::new().unwrap();
        let state = state(&temp, 3);

        let Json(response) = login(State(state.clone()), login_uri(), request("anna", "trainer-pass"))
            .await
            .unwrap();
        assert_eq!(response.token_type, "Bearer");
        assert_eq!(response.expires_in, 3600);
        assert!(response.authorities.contains("ROLE_TRAINER"));

        let claims = state.codec.validate(&response.token, Utc::now()).unwrap();
        assert_eq!(claims.sub, "anna");
    }

    #[tokio::test]
    async fn test_wrong_password_then_lockout() {
        let temp = NamedTempFile::new().unwrap();
        let state = state(&temp, 2);

        for _ in 0..2 {
            let err = login(State(state.clone()), login_uri(), request("anna", "nope"))
                .await
                .unwrap_err();
            assert_eq!(err.kind, FailureKind::InvalidCredentials);
        }

        // correct password is refused while locked
        let err = login(State(state.clone()), login_uri(), request("anna", "trainer-pass"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::StillLocked);
        assert_eq!(status_of(err), StatusCode::LOCKED);
    }

    /// Attempt store that is down; reads optionally still succeed
    struct UnavailableAttemptStore {
        reads_work: bool,
    }

    impl LoginAttemptStore for UnavailableAttemptStore {
        fn get(&self, _username: &str) -> anyhow::Result<Option<LoginAttemptRecord>> {
            if self.reads_work {
                Ok(None)
            } else {
                anyhow::bail!("attempt store offline")
            }
        }

        fn compare_and_update(
            &self,
            _username: &str,
            _expected: Option<&LoginAttemptRecord>,
            _new: Option<&LoginAttemptRecord>,
        ) -> anyhow::Result<bool> {
            anyhow::bail!("attempt store offline")
        }

        fn scan(&self) -> anyhow::Result<Vec<LoginAttemptRecord>> {
            anyhow::bail!("attempt store offline")
        }
    }

    #[tokio::test]
    async fn test_attempt_store_failure_refuses_login() {
        let temp = NamedTempFile::new().unwrap();
        let state = state_with_attempts(
            &temp,
            3,
            Arc::new(UnavailableAttemptStore { reads_work: false }),
        );

        // correct credentials still get no token
        let err = login(State(state), login_uri(), request("anna", "trainer-pass"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::LoginUnavailable);
        assert_eq!(status_of(err), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_unrecorded_failure_is_not_reported_as_bad_credentials() {
        let temp = NamedTempFile::new().unwrap();
        let state = state_with_attempts(
            &temp,
            3,
            Arc::new(UnavailableAttemptStore { reads_work: true }),
        );

        let err = login(State(state), login_uri(), request("anna", "nope"))
            .await
            .unwrap_err();
        assert_eq!(status_of(err), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_unknown_user_is_tracked_too() {
        let temp = NamedTempFile::new().unwrap();
        let state = state(&temp, 1);

        let err = login(State(state.clone()), login_uri(), request("ghost", "x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::InvalidCredentials);
        assert!(state.tracker.is_blocked("ghost", Utc::now()).unwrap());
    }

    #[tokio::test]
    async fn test_empty_credentials_rejected() {
        let temp = NamedTempFile::new().unwrap();
        let err = login(State(state(&temp, 3)), login_uri(), request("  ", "x"))
            .await
            .unwrap_err();
        assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_me_requires_identity() {
        let uri = || OriginalUri(Uri::from_static("/api/auth/me"));
        let err = get_current_user(AuthenticationContext::anonymous(), uri())
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Unauthenticated);

        let ctx = AuthenticationContext::authenticated("anna", UserRole::Trainer.authorities());
        let Json(me) = get_current_user(ctx, uri()).await.unwrap();
        assert_eq!(me.username, "anna");
    }

    #[tokio::test]
    async fn test_create_user_conflict_only_for_existing_username() {
        let temp = NamedTempFile::new().unwrap();
        let state = state(&temp, 3);
        let uri = || OriginalUri(Uri::from_static("/api/admin/users"));
        let admin =
            AuthenticationContext::authenticated("root", BTreeSet::from(["ROLE_ADMIN".to_string()]));
        let anna = || {
            Json(CreateUserRequest {
                username: "anna".to_string(),
                password: "another-pass".to_string(),
                role: UserRole::Trainee,
            })
        };

        let err = create_user(State(state.clone()), admin.clone(), uri(), anna())
            .await
            .unwrap_err();
        assert_eq!(status_of(err), StatusCode::CONFLICT);

        rusqlite::Connection::open(temp.path())
            .unwrap()
            .execute("DROP TABLE users", [])
            .unwrap();
        let err = create_user(State(state), admin, uri(), anna()).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Internal);
        assert_eq!(status_of(err), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_admin_endpoints_enforce_authority() {
        let temp = NamedTempFile::new().unwrap();
        let state = state(&temp, 3);
        let uri = || OriginalUri(Uri::from_static("/api/admin/users"));

        let trainer = AuthenticationContext::authenticated("anna", UserRole::Trainer.authorities());
        let err = list_users(State(state.clone()), trainer, uri()).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Forbidden);

        let admin = AuthenticationContext::authenticated(
            "root",
            BTreeSet::from(["ROLE_ADMIN".to_string()]),
        );
        let Json(created) = create_user(
            State(state.clone()),
            admin.clone(),
            uri(),
            Json(CreateUserRequest {
                username: "john".to_string(),
                password: "trainee-pass".to_string(),
                role: UserRole::Trainee,
            }),
        )
        .await
        .unwrap();
        assert_eq!(created.role, UserRole::Trainee);

        let Json(users) = list_users(State(state), admin, uri()).await.unwrap();
        assert_eq!(users.len(), 2);
    }
}
