//! Login Attempt Storage
//! Mission: Durable per-username failure counts and lockout windows behind a compare-and-update port
//!
//! The tracker never writes blindly: every mutation names the record it
//! expects to replace, and the store applies it only if that is still the
//! stored value. Any key-value or relational store satisfies the port as long
//! as `compare_and_update` is atomic per username.

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Failure count and lockout window for one username
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAttemptRecord {
    pub username: String,
    pub attempt_count: u32,
    pub last_attempt_time: DateTime<Utc>,
    pub blocked_until: Option<DateTime<Utc>>,
    pub is_blocked: bool,
}

/// Position of a username in the lockout state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Clean,
    Warned,
    Locked,
}

impl LoginAttemptRecord {
    pub fn clean(username: &str, now: DateTime<Utc>) -> Self {
        Self {
            username: username.to_string(),
            attempt_count: 0,
            last_attempt_time: now,
            blocked_until: None,
            is_blocked: false,
        }
    }

    /// Lockout in force at `now`
    pub fn blocked_at(&self, now: DateTime<Utc>) -> bool {
        self.is_blocked && self.blocked_until.map_or(false, |until| now < until)
    }

    /// Lockout window that has already ended at `now`
    pub fn lockout_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_blocked && self.blocked_until.map_or(false, |until| until < now)
    }

    pub fn state(&self, now: DateTime<Utc>) -> AttemptState {
        if self.blocked_at(now) {
            AttemptState::Locked
        } else if self.attempt_count == 0 || self.is_blocked {
            // an ended lockout counts as a clean slate
            AttemptState::Clean
        } else {
            AttemptState::Warned
        }
    }
}

/// Storage port for login attempt records
pub trait LoginAttemptStore: Send + Sync {
    /// Current record for `username`, if any
    fn get(&self, username: &str) -> Result<Option<LoginAttemptRecord>>;

    /// Atomically replace `expected` with `new` for `username`.
    ///
    /// `expected == None` means "no record exists"; `new == None` deletes.
    /// Returns `false` without writing when the stored value differs from `expected`.
    fn compare_and_update(
        &self,
        username: &str,
        expected: Option<&LoginAttemptRecord>,
        new: Option<&LoginAttemptRecord>,
    ) -> Result<bool>;

    /// Every stored record, for maintenance sweeps
    fn scan(&self) -> Result<Vec<LoginAttemptRecord>>;
}

/// In-memory store for single-instance deployments and tests
#[derive(Debug, Default, Clone)]
pub struct InMemoryAttemptStore {
    records: Arc<Mutex<HashMap<String, LoginAttemptRecord>>>,
}

impl InMemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoginAttemptStore for InMemoryAttemptStore {
    fn get(&self, username: &str) -> Result<Option<LoginAttemptRecord>> {
        Ok(self.records.lock().get(username).cloned())
    }

    fn compare_and_update(
        &self,
        username: &str,
        expected: Option<&LoginAttemptRecord>,
        new: Option<&LoginAttemptRecord>,
    ) -> Result<bool> {
        let mut records = self.records.lock();
        if records.get(username) != expected {
            return Ok(false);
        }
        match new {
            Some(record) => {
                records.insert(username.to_string(), record.clone());
            }
            None => {
                records.remove(username);
            }
        }
        Ok(true)
    }

    fn scan(&self) -> Result<Vec<LoginAttemptRecord>> {
        Ok(self.records.lock().values().cloned().collect())
    }
}

/// How long a write waits for another connection to release the database
const BUSY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// SQLite-backed store. Timestamps are persisted as unix milliseconds.
#[derive(Clone)]
pub struct SqliteAttemptStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAttemptStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).context("open login attempt db")?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        // the credential store writes to the same file
        conn.busy_timeout(BUSY_TIMEOUT)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS login_attempts (
                username TEXT PRIMARY KEY,
                attempt_count INTEGER NOT NULL,
                last_attempt_time INTEGER NOT NULL,
                blocked_until INTEGER,
                is_blocked INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;

        info!("🔒 Login attempt store ready at: {}", db_path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn matches(conn: &Connection, expected: &LoginAttemptRecord) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM login_attempts
                 WHERE username = ?1 AND attempt_count = ?2 AND last_attempt_time = ?3
                   AND blocked_until IS ?4 AND is_blocked = ?5",
                params![
                    expected.username,
                    expected.attempt_count,
                    expected.last_attempt_time.timestamp_millis(),
                    expected.blocked_until.map(|t| t.timestamp_millis()),
                    expected.is_blocked,
                ],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .with_context(|| format!("Invalid stored timestamp: {}", ms))
}

fn read_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, u32, i64, Option<i64>, bool)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_record(raw: (String, u32, i64, Option<i64>, bool)) -> Result<LoginAttemptRecord> {
    let (username, attempt_count, last, blocked_until, is_blocked) = raw;
    Ok(LoginAttemptRecord {
        username,
        attempt_count,
        last_attempt_time: from_millis(last)?,
        blocked_until: blocked_until.map(from_millis).transpose()?,
        is_blocked,
    })
}

impl LoginAttemptStore for SqliteAttemptStore {
    fn get(&self, username: &str) -> Result<Option<LoginAttemptRecord>> {
        let conn = self.conn.lock();
        let raw = conn
            .query_row(
                "SELECT username, attempt_count, last_attempt_time, blocked_until, is_blocked
                 FROM login_attempts WHERE username = ?1",
                params![username],
                read_record,
            )
            .optional()
            .context("Failed to load login attempt record")?;
        raw.map(into_record).transpose()
    }

    fn compare_and_update(
        &self,
        username: &str,
        expected: Option<&LoginAttemptRecord>,
        new: Option<&LoginAttemptRecord>,
    ) -> Result<bool> {
        let mut conn = self.conn.lock();
        // take the write lock up front so the busy handler can wait on other writers
        // to the same file instead of failing the read-then-write upgrade
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current_matches = match expected {
            Some(record) => Self::matches(&tx, record)?,
            None => {
                let exists: Option<i64> = tx
                    .query_row(
                        "SELECT 1 FROM login_attempts WHERE username = ?1",
                        params![username],
                        |row| row.get(0),
                    )
                    .optional()?;
                exists.is_none()
            }
        };
        if !current_matches {
            return Ok(false);
        }

        match new {
            Some(record) => {
                tx.execute(
                    "INSERT INTO login_attempts
                        (username, attempt_count, last_attempt_time, blocked_until, is_blocked)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(username) DO UPDATE SET
                        attempt_count = excluded.attempt_count,
                        last_attempt_time = excluded.last_attempt_time,
                        blocked_until = excluded.blocked_until,
                        is_blocked = excluded.is_blocked",
                    params![
                        username,
                        record.attempt_count,
                        record.last_attempt_time.timestamp_millis(),
                        record.blocked_until.map(|t| t.timestamp_millis()),
                        record.is_blocked,
                    ],
                )?;
            }
            None => {
                tx.execute(
                    "DELETE FROM login_attempts WHERE username = ?1",
                    params![username],
                )?;
            }
        }

        tx.commit().context("Failed to commit login attempt update")?;
        Ok(true)
    }

    fn scan(&self) -> Result<Vec<LoginAttemptRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT username, attempt_count, last_attempt_time, blocked_until, is_blocked
             FROM login_attempts",
        )?;
        let raw = stmt
            .query_map([], read_record)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(into_record).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::NamedTempFile;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn locked_record(until: DateTime<Utc>) -> LoginAttemptRecord {
        LoginAttemptRecord {
            username: "john".to_string(),
            attempt_count: 5,
            last_attempt_time: until - Duration::seconds(60),
            blocked_until: Some(until),
            is_blocked: true,
        }
    }

    fn check_store_contract(store: &dyn LoginAttemptStore) {
        assert!(store.get("john").unwrap().is_none());

        let mut first = LoginAttemptRecord::clean("john", at(0));
        first.attempt_count = 1;
        assert!(store.compare_and_update("john", None, Some(&first)).unwrap());
        // a second insert-if-absent loses
        assert!(!store.compare_and_update("john", None, Some(&first)).unwrap());
        assert_eq!(store.get("john").unwrap(), Some(first.clone()));

        let mut second = first.clone();
        second.attempt_count = 2;
        second.last_attempt_time = at(1);
        assert!(store
            .compare_and_update("john", Some(&first), Some(&second))
            .unwrap());
        // stale expectation is refused
        assert!(!store
            .compare_and_update("john", Some(&first), Some(&first))
            .unwrap());

        assert_eq!(store.scan().unwrap(), vec![second.clone()]);

        assert!(store.compare_and_update("john", Some(&second), None).unwrap());
        assert!(store.get("john").unwrap().is_none());
    }

    #[test]
    fn test_in_memory_store_contract() {
        check_store_contract(&InMemoryAttemptStore::new());
    }

    #[test]
    fn test_sqlite_store_contract() {
        let temp = NamedTempFile::new().unwrap();
        let store = SqliteAttemptStore::new(temp.path().to_str().unwrap()).unwrap();
        check_store_contract(&store);
    }

    #[test]
    fn test_sqlite_store_round_trips_lockout() {
        let temp = NamedTempFile::new().unwrap();
        let store = SqliteAttemptStore::new(temp.path().to_str().unwrap()).unwrap();
        let record = locked_record(at(60));

        assert!(store.compare_and_update("john", None, Some(&record)).unwrap());
        let loaded = store.get("john").unwrap().unwrap();
        assert_eq!(loaded, record);
        assert!(store
            .compare_and_update("john", Some(&loaded), None)
            .unwrap());
    }

    #[test]
    fn test_record_states() {
        let record = locked_record(at(60));
        assert_eq!(record.state(at(30)), AttemptState::Locked);
        assert!(record.blocked_at(at(59)));
        assert!(!record.blocked_at(at(60)));
        assert!(!record.lockout_expired(at(60)));
        assert!(record.lockout_expired(at(61)));
        assert_eq!(record.state(at(61)), AttemptState::Clean);

        let mut warned = LoginAttemptRecord::clean("john", at(0));
        assert_eq!(warned.state(at(0)), AttemptState::Clean);
        warned.attempt_count = 2;
        assert_eq!(warned.state(at(0)), AttemptState::Warned);
    }
}
