//! Authentication Models
//! Mission: Define user, claim and login data structures for the back office

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Authority prefix shared by every role-derived authority
pub const ROLE_PREFIX: &str = "ROLE_";

/// User account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // bcrypt hash - never serialize
    pub role: UserRole,
    pub created_at: String,
}

impl User {
    pub fn authorities(&self) -> BTreeSet<String> {
        self.role.authorities()
    }
}

/// User roles for RBAC
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UserRole {
    #[serde(rename = "admin")]
    Admin, // User administration
    #[serde(rename = "trainer")]
    Trainer, // Manages trainings and assigned trainees
    #[serde(rename = "trainee")]
    Trainee, // Own profile and trainings
}

impl UserRole {
    pub fn as_str(&self) -> &str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Trainer => "trainer",
            UserRole::Trainee => "trainee",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(UserRole::Admin),
            "trainer" => Some(UserRole::Trainer),
            "trainee" => Some(UserRole::Trainee),
            _ => None,
        }
    }

    /// Authority string demanded by protected operations, e.g. `ROLE_TRAINER`
    pub fn authority(&self) -> String {
        format!("{}{}", ROLE_PREFIX, self.as_str().to_uppercase())
    }

    pub fn authorities(&self) -> BTreeSet<String> {
        BTreeSet::from([self.authority()])
    }
}

/// JWT Claims payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String, // subject (username)
    pub iat: i64,    // issued at, unix seconds
    pub exp: i64,    // expiration, unix seconds
    #[serde(default)]
    pub authorities: BTreeSet<String>,
}

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: String,
    pub expires_in: u64, // seconds until expiration
    pub username: String,
    pub authorities: BTreeSet<String>,
}

/// Identity of the caller as seen by the authentication pipeline
#[derive(Debug, Serialize, Deserialize)]
pub struct PrincipalResponse {
    pub username: String,
    pub authorities: BTreeSet<String>,
}

/// User response (sanitized)
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub role: UserRole,
    pub created_at: String,
}

impl UserResponse {
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            username: user.username.clone(),
            role: user.role,
            created_at: user.created_at.clone(),
        }
    }
}

/// Create user request
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub role: UserRole,
}
