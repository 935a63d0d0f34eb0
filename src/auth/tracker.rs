//! Login Attempt Tracker
//! Mission: Brute-force lockout state machine for the login endpoint
//!
//! States per username:
//! - `Clean`: no failures counted
//! - `Warned`: `1 <= attempt_count < max_attempts`
//! - `Locked`: `is_blocked` with `blocked_until` in the future
//!
//! Every transition is a read-compare-write against the [`LoginAttemptStore`],
//! retried when another request changed the record in between, so concurrent
//! failures for one username never lose increments and lock exactly once.
//!
//! ```ignore
//! if tracker.is_blocked(&username, now)? {
//!     return Err(StillLocked);
//! }
//! if credentials_match {
//!     tracker.record_success(&username, now)?; // refuses during lockout
//! } else {
//!     tracker.record_failure(&username, now)?;
//! }
//! ```

use crate::auth::attempts::{LoginAttemptRecord, LoginAttemptStore};
use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Upper bound on compare-and-update retries for one transition
const MAX_CAS_RETRIES: usize = 128;

/// Lockout policy configuration
#[derive(Debug, Clone)]
pub struct LockoutPolicy {
    /// Number of consecutive failed attempts before lockout
    pub max_attempts: u32,

    /// Duration of lockout after max attempts reached
    pub lockout_duration: Duration,
}

impl LockoutPolicy {
    pub fn new(max_attempts: u32, lockout_duration: Duration) -> Self {
        Self {
            max_attempts,
            lockout_duration,
        }
    }

    /// Create a new builder
    pub fn builder() -> LockoutPolicyBuilder {
        LockoutPolicyBuilder::default()
    }
}

/// Builder for LockoutPolicy
#[derive(Debug, Clone, Default)]
pub struct LockoutPolicyBuilder {
    max_attempts: Option<u32>,
    lockout_duration: Option<Duration>,
}

impl LockoutPolicyBuilder {
    /// Set maximum failed attempts before lockout
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Set lockout duration
    pub fn lockout_duration(mut self, duration: Duration) -> Self {
        self.lockout_duration = Some(duration);
        self
    }

    /// Both values are mandatory; there is no built-in security default.
    pub fn build(self) -> anyhow::Result<LockoutPolicy> {
        let max_attempts = self
            .max_attempts
            .context("Lockout policy requires max_attempts")?;
        let lockout_duration = self
            .lockout_duration
            .context("Lockout policy requires lockout_duration")?;
        Ok(LockoutPolicy::new(max_attempts, lockout_duration))
    }
}

/// Login attempt tracking errors
#[derive(Debug, Error)]
pub enum LoginAttemptError {
    /// The username is inside its lockout window
    #[error("account temporarily locked")]
    StillLocked,

    /// The attempt store failed; callers must treat the login as refused
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Result of recording a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Failure counted, still below the threshold
    Counted { attempt_count: u32, remaining: u32 },
    /// This failure reached the threshold and started a lockout
    Locked {
        attempt_count: u32,
        blocked_until: DateTime<Utc>,
    },
}

/// Brute-force protection built on a [`LoginAttemptStore`]
pub struct LoginAttemptTracker {
    store: Arc<dyn LoginAttemptStore>,
    max_attempts: u32,
    lockout_duration: chrono::Duration,
}

impl LoginAttemptTracker {
    pub fn new(store: Arc<dyn LoginAttemptStore>, policy: LockoutPolicy) -> anyhow::Result<Self> {
        anyhow::ensure!(policy.max_attempts > 0, "max_attempts must be positive");
        let lockout_duration = chrono::Duration::from_std(policy.lockout_duration)
            .context("Lockout duration out of range")?;
        anyhow::ensure!(
            lockout_duration > chrono::Duration::zero(),
            "lockout_duration must be positive"
        );

        Ok(Self {
            store,
            max_attempts: policy.max_attempts,
            lockout_duration,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Record a failed login attempt
    pub fn record_failure(
        &self,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome, LoginAttemptError> {
        for _ in 0..MAX_CAS_RETRIES {
            let current = self.store.get(username)?;

            if let Some(record) = &current {
                if record.blocked_at(now) {
                    debug!(username = %username, "Failure ignored during lockout");
                    return Err(LoginAttemptError::StillLocked);
                }
            }

            let mut next = match &current {
                // an ended lockout restarts the count
                Some(record) if !record.is_blocked => record.clone(),
                _ => LoginAttemptRecord::clean(username, now),
            };
            next.attempt_count = next.attempt_count.saturating_add(1);
            next.last_attempt_time = now;

            let outcome = if next.attempt_count >= self.max_attempts {
                let blocked_until = now
                    .checked_add_signed(self.lockout_duration)
                    .ok_or_else(|| anyhow!("lockout window for {} ends out of range", username))?;
                next.blocked_until = Some(blocked_until);
                next.is_blocked = true;
                FailureOutcome::Locked {
                    attempt_count: next.attempt_count,
                    blocked_until,
                }
            } else {
                FailureOutcome::Counted {
                    attempt_count: next.attempt_count,
                    remaining: self.max_attempts - next.attempt_count,
                }
            };

            if self
                .store
                .compare_and_update(username, current.as_ref(), Some(&next))?
            {
                match &outcome {
                    FailureOutcome::Locked {
                        attempt_count,
                        blocked_until,
                    } => log_account_locked(username, *attempt_count, *blocked_until),
                    FailureOutcome::Counted {
                        attempt_count,
                        remaining,
                    } => log_login_failure(username, *attempt_count, *remaining),
                }
                return Ok(outcome);
            }
        }

        Err(contention(username))
    }

    /// Record a successful credential match
    ///
    /// A correct credential presented during lockout does not lift it.
    pub fn record_success(&self, username: &str, now: DateTime<Utc>) -> Result<(), LoginAttemptError> {
        for _ in 0..MAX_CAS_RETRIES {
            let Some(current) = self.store.get(username)? else {
                return Ok(());
            };

            if current.blocked_at(now) {
                warn!(username = %username, "Correct credentials refused during lockout");
                return Err(LoginAttemptError::StillLocked);
            }

            let reset = LoginAttemptRecord::clean(username, now);
            if self
                .store
                .compare_and_update(username, Some(&current), Some(&reset))?
            {
                debug!(
                    username = %username,
                    cleared_attempts = current.attempt_count,
                    "Login attempts reset"
                );
                return Ok(());
            }
        }

        Err(contention(username))
    }

    /// Whether `username` is inside a lockout window at `now`
    pub fn is_blocked(&self, username: &str, now: DateTime<Utc>) -> Result<bool, LoginAttemptError> {
        Ok(self
            .store
            .get(username)?
            .map_or(false, |record| record.blocked_at(now)))
    }

    /// Remove records whose lockout ended before `now`.
    ///
    /// Each removal is conditional on the exact record that was proven
    /// expired, so a record concurrently re-locked or updated is left alone.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, LoginAttemptError> {
        let mut removed = 0;
        for record in self.store.scan()? {
            if !record.lockout_expired(now) {
                continue;
            }
            if self
                .store
                .compare_and_update(&record.username, Some(&record), None)?
            {
                log_account_unlocked(&record.username);
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "🧹 Swept expired lockouts");
        }
        Ok(removed)
    }
}

/// Run `sweep_expired` every `interval` until the runtime shuts down
pub fn spawn_sweeper(tracker: Arc<LoginAttemptTracker>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = tracker.sweep_expired(Utc::now()) {
                error!("Lockout sweep failed: {}", e);
            }
        }
    })
}

fn contention(username: &str) -> LoginAttemptError {
    warn!(username = %username, "Login attempt record kept changing, refusing attempt");
    LoginAttemptError::Storage(anyhow!(
        "too much contention on login attempt record for {}",
        username
    ))
}

fn log_login_failure(username: &str, attempt_count: u32, remaining: u32) {
    warn!(
        username = %username,
        attempt_count,
        remaining_attempts = remaining,
        "Login failed"
    );
}

fn log_account_locked(username: &str, attempt_count: u32, blocked_until: DateTime<Utc>) {
    warn!(
        username = %username,
        attempt_count,
        blocked_until = %blocked_until.to_rfc3339(),
        "🔒 Account locked due to failed login attempts"
    );
}

fn log_account_unlocked(username: &str) {
    info!(username = %username, "Lockout expired, record cleared");
}
