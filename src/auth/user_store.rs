//! User Storage
//! Mission: Store back-office credentials and roles with SQLite

use crate::auth::models::{User, UserRole};
use anyhow::{Context, Result};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use rusqlite::{params, Connection, Row};
use tracing::{info, warn};
use uuid::Uuid;

/// User storage with SQLite backend
pub struct UserStore {
    db_path: String,
    hash_cost: u32,
}

impl UserStore {
    /// Create a new user store and initialize database
    pub fn new(db_path: &str) -> Result<Self> {
        Self::with_hash_cost(db_path, DEFAULT_COST)
    }

    /// Store with a custom bcrypt cost (tests use the minimum)
    pub fn with_hash_cost(db_path: &str, hash_cost: u32) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
            hash_cost,
        };
        store.init_db()?;
        Ok(store)
    }

    /// Initialize database schema
    fn init_db(&self) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    /// Create the configured admin account if no admin exists yet
    pub fn bootstrap_admin(&self, username: &str, password: &str) -> Result<bool> {
        let conn = Connection::open(&self.db_path)?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE role = 'admin'",
                [],
                |row| row.get(0),
            )
            .context("Failed to check for admin users")?;

        if count > 0 {
            return Ok(false);
        }

        self.create_user(username, password, UserRole::Admin)?;
        warn!("⚠️  Bootstrap admin '{}' created, rotate its password", username);
        Ok(true)
    }

    /// Get user by username
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = Connection::open(&self.db_path)?;

        let mut stmt = conn.prepare(
            "SELECT id, username, password_hash, role, created_at
             FROM users WHERE username = ?1",
        )?;

        match stmt.query_row(params![username], user_from_row) {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Verify username and password
    pub fn verify_password(&self, username: &str, password: &str) -> Result<bool> {
        match self.get_user_by_username(username)? {
            Some(user) => {
                let valid =
                    verify(password, &user.password_hash).context("Failed to verify password")?;
                Ok(valid)
            }
            None => Ok(false),
        }
    }

    /// Create a new user
    pub fn create_user(&self, username: &str, password: &str, role: UserRole) -> Result<User> {
        let password_hash = hash(password, self.hash_cost).context("Failed to hash password")?;

        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash,
            role,
            created_at: Utc::now().to_rfc3339(),
        };

        let conn = Connection::open(&self.db_path)?;
        conn.execute(
            "INSERT INTO users (id, username, password_hash, role, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.id.to_string(),
                user.username,
                user.password_hash,
                user.role.as_str(),
                user.created_at,
            ],
        )
        .context("Failed to insert user")?;

        info!(
            "✅ Created user: {} ({})",
            user.username,
            user.role.as_str()
        );

        Ok(user)
    }

    /// List all users (admin only)
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = Connection::open(&self.db_path)?;

        let mut stmt =
            conn.prepare("SELECT id, username, password_hash, role, created_at FROM users")?;

        let users = stmt
            .query_map([], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(users)
    }

    /// Change the role of an existing user
    pub fn set_role(&self, username: &str, role: UserRole) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;
        let rows_affected = conn.execute(
            "UPDATE users SET role = ?1 WHERE username = ?2",
            params![role.as_str(), username],
        )?;

        if rows_affected == 0 {
            anyhow::bail!("User not found");
        }

        info!("Role of {} changed to {}", username, role.as_str());
        Ok(())
    }
}

/// Whether `err` came from inserting a username that already exists
pub fn is_duplicate_username(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(e, _))
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let id: String = row.get(0)?;
    let role_str: String = row.get(3)?;
    Ok(User {
        id: Uuid::parse_str(&id).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        role: UserRole::from_str(&role_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                format!("unknown role '{}'", role_str).into(),
            )
        })?,
        created_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_test_store() -> (UserStore, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap();
        let store = UserStore::with_hash_cost(db_path, 4).unwrap();
        (store, temp_file)
    }

    #[test]
    fn test_no_default_admin() {
        let (store, _temp) = create_test_store();
        assert!(store.list_users().unwrap().is_empty());
    }

    #[test]
    fn test_bootstrap_admin_once() {
        let (store, _temp) = create_test_store();

        assert!(store.bootstrap_admin("root", "bootstrap-pass").unwrap());
        assert!(!store.bootstrap_admin("root2", "bootstrap-pass").unwrap());

        let admin = store.get_user_by_username("root").unwrap().unwrap();
        assert_eq!(admin.role, UserRole::Admin);
        assert!(store.get_user_by_username("root2").unwrap().is_none());
    }

    #[test]
    fn test_password_verification() {
        let (store, _temp) = create_test_store();
        store
            .create_user("anna", "trainer-pass", UserRole::Trainer)
            .unwrap();

        assert!(store.verify_password("anna", "trainer-pass").unwrap());
        assert!(!store.verify_password("anna", "wrongpassword").unwrap());
        assert!(!store.verify_password("nonexistent", "password").unwrap());
    }

    #[test]
    fn test_create_and_retrieve_user() {
        let (store, _temp) = create_test_store();

        let trainee = store
            .create_user("john", "password123", UserRole::Trainee)
            .unwrap();
        assert_eq!(trainee.role, UserRole::Trainee);

        let retrieved = store.get_user_by_username("john").unwrap().unwrap();
        assert_eq!(retrieved.id, trainee.id);
        assert!(retrieved.authorities().contains("ROLE_TRAINEE"));
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let (store, _temp) = create_test_store();
        store.create_user("anna", "pass", UserRole::Trainer).unwrap();
        let err = store.create_user("anna", "pass", UserRole::Trainee).unwrap_err();
        assert!(is_duplicate_username(&err));
    }

    #[test]
    fn test_other_insert_failures_are_not_duplicates() {
        let (store, temp) = create_test_store();
        Connection::open(temp.path())
            .unwrap()
            .execute("DROP TABLE users", [])
            .unwrap();

        let err = store.create_user("anna", "pass", UserRole::Trainer).unwrap_err();
        assert!(!is_duplicate_username(&err));
    }

    #[test]
    fn test_set_role() {
        let (store, _temp) = create_test_store();
        store.create_user("anna", "pass", UserRole::Trainee).unwrap();
        store.set_role("anna", UserRole::Trainer).unwrap();

        let anna = store.get_user_by_username("anna").unwrap().unwrap();
        assert_eq!(anna.role, UserRole::Trainer);
        assert!(store.set_role("ghost", UserRole::Trainer).is_err());
    }
}
