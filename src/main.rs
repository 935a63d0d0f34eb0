//! Gymdesk - back-office API server
//! Mission: Serve the authentication pipeline in front of the gym CRM resources

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gymdesk_backend::{
    app,
    auth::{spawn_sweeper, AuthFilter, AuthState, LoginAttemptTracker, SqliteAttemptStore, TokenCodec, UserStore},
    Config,
};

#[derive(Parser, Debug)]
#[command(name = "gymdesk", about = "Gym back-office API server")]
struct Args {
    /// Port to listen on (overrides PORT)
    #[arg(long)]
    port: Option<u16>,

    /// SQLite database for credentials and login attempts (overrides AUTH_DB_PATH)
    #[arg(long)]
    db_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();
    let mut config = Config::from_env().context("Invalid configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(db_path) = args.db_path {
        config.auth_db_path = db_path;
    }

    let user_store = Arc::new(UserStore::new(&config.auth_db_path)?);
    if let Some(admin) = &config.bootstrap_admin {
        user_store.bootstrap_admin(&admin.username, &admin.password)?;
    }

    let codec = Arc::new(TokenCodec::new(
        &config.jwt_secret,
        config.token_ttl,
        config.clock_skew,
    )?);
    let attempt_store = Arc::new(SqliteAttemptStore::new(&config.auth_db_path)?);
    let tracker = Arc::new(LoginAttemptTracker::new(attempt_store, config.lockout.clone())?);
    let _sweeper = spawn_sweeper(tracker.clone(), config.sweep_interval);

    info!(
        "🔐 Authentication initialized at: {} (max attempts {}, lockout {}s)",
        config.auth_db_path,
        config.lockout.max_attempts,
        config.lockout.lockout_duration.as_secs()
    );

    let filter = Arc::new(AuthFilter::new(codec.clone(), user_store.clone()));
    let auth_state = AuthState::new(user_store, codec, tracker);
    let app = app::router(auth_state, filter);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("🚀 Gymdesk listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gymdesk_backend=debug,gymdesk=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
