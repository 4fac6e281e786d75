//! Credential & session store
//!
//! All user records live in memory behind a single store-wide lock and are
//! mirrored to a JSON snapshot that is rewritten in full after every
//! successful mutation. A record carries at most one session token; logging
//! in again overwrites it.
//!
//! Lock discipline:
//! - readers (`load_user`, token lookup) take the lock shared
//! - login/logout mutate and persist while holding it exclusively
//! - password verification runs with no lock held

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Duration, Months, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::token::generate_token;

/// Session lifetime without "remember me"
const SESSION_TTL_SECS: i64 = 3600;

/// Session lifetime with "remember me", in calendar months
const REMEMBER_MONTHS: u32 = 1;

/// Upper bound on a remembered session: one month, at most 31 days.
/// Transport cookies must live at least this long.
pub const REMEMBERED_SESSION_MAX_SECS: u64 = 31 * 24 * 3600;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unknown user and wrong password collapse into this one value
    #[error("Invalid Username or Password")]
    InvalidCredentials,

    #[error("User not found")]
    NoSuchUser,

    #[error("Session not found or expired")]
    NoSuchSession,

    #[error("User file {path} is broken. Delete it and restart the program: {source}")]
    CorruptUserFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("User file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize users: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Failed to generate session token: {0}")]
    TokenGeneration(#[from] rand::Error),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    #[error("Username and password must not be empty")]
    EmptyCredentials,
}

/// A user of the control panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(rename = "Username")]
    pub username: String,

    /// Argon2 PHC string
    #[serde(rename = "Password")]
    pub password_hash: String,

    /// Empty when no session is active
    #[serde(rename = "SessionID", default)]
    pub session_token: String,

    #[serde(rename = "SessionExpires", default)]
    pub session_expiry: DateTime<Utc>,
}

impl UserRecord {
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password_hash: password_hash.into(),
            session_token: String::new(),
            session_expiry: DateTime::<Utc>::default(),
        }
    }

    /// A session is live iff the token is set and expiry is strictly after `now`
    pub fn has_live_session(&self, now: DateTime<Utc>) -> bool {
        !self.session_token.is_empty() && self.session_expiry > now
    }
}

/// On-disk layout: `{"Users": [...]}`
#[derive(Deserialize)]
struct Snapshot {
    #[serde(rename = "Users", default)]
    users: Vec<UserRecord>,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    #[serde(rename = "Users")]
    users: &'a [UserRecord],
}

/// Storage capability used by the request pipeline and handlers
pub trait UserStorage: Send + Sync {
    /// Exact, case-sensitive lookup
    fn load_user(&self, username: &str) -> Result<UserRecord, StoreError>;

    /// Resolve a live session token to its username
    fn load_username_from_session_token(&self, token: &str) -> Result<String, StoreError>;

    /// Verify credentials and issue a new session token
    fn attempt_login(&self, username: &str, password: &str, remember: bool) -> Result<String, StoreError>;

    /// Invalidate the user's session
    fn logout(&self, username: &str) -> Result<(), StoreError>;
}

/// Hash a password with the default Argon2id parameters
pub fn hash_password(password: &str) -> Result<String, StoreError> {
    hash_with(&Argon2::default(), password)
}

/// Hash a password with explicit cost parameters (memory in KiB, passes)
pub fn hash_password_with_cost(password: &str, memory_kib: u32, iterations: u32) -> Result<String, StoreError> {
    let params = Params::new(memory_kib, iterations, 1, None)
        .map_err(|e| StoreError::PasswordHash(e.to_string()))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);
    hash_with(&argon2, password)
}

fn hash_with(argon2: &Argon2<'_>, password: &str) -> Result<String, StoreError> {
    let salt = SaltString::generate(&mut OsRng);
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| StoreError::PasswordHash(e.to_string()))
}

/// Parameters are taken from the PHC string, so any cost verifies here
fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::error!("Stored password hash is malformed: {}", e);
            false
        }
    }
}

/// Default-cost hash verified against when the username is unknown
fn unknown_user_hash() -> Option<&'static str> {
    static HASH: OnceLock<Option<String>> = OnceLock::new();
    HASH.get_or_init(|| match hash_password("kiwi-unknown-user") {
        Ok(hash) => Some(hash),
        Err(e) => {
            tracing::error!("Failed to prepare unknown-user hash: {}", e);
            None
        }
    })
    .as_deref()
}

/// In-memory user registry backed by a JSON snapshot
pub struct UserStore {
    path: Option<PathBuf>,
    users: RwLock<Vec<UserRecord>>,
}

impl UserStore {
    /// Open an existing user file. A missing file is an `Io` error, an
    /// unparseable one is `CorruptUserFile`; neither is ever reset silently.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&content).map_err(|source| StoreError::CorruptUserFile {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::info!("Loaded {} user(s) from {}", snapshot.users.len(), path.display());

        Ok(Self {
            path: Some(path.to_path_buf()),
            users: RwLock::new(snapshot.users),
        })
    }

    /// Create a new user file holding a single user
    pub fn create(path: &Path, username: &str, password: &str) -> Result<Self, StoreError> {
        if username.is_empty() || password.is_empty() {
            return Err(StoreError::EmptyCredentials);
        }

        let record = UserRecord::new(username, hash_password(password)?);
        let store = Self {
            path: Some(path.to_path_buf()),
            users: RwLock::new(vec![record]),
        };

        {
            let users = store.users.read();
            store.persist(&users)?;
        }

        tracing::info!("Created user file {} with user '{}'", path.display(), username);
        Ok(store)
    }

    /// Store that never touches disk
    pub fn in_memory(records: Vec<UserRecord>) -> Self {
        Self {
            path: None,
            users: RwLock::new(records),
        }
    }

    /// Path of the backing snapshot, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of user records
    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }

    pub fn load_username_from_session_token_at(&self, token: &str, now: DateTime<Utc>) -> Result<String, StoreError> {
        if token.is_empty() {
            return Err(StoreError::NoSuchSession);
        }

        self.users
            .read()
            .iter()
            .find(|u| u.session_token == token && u.has_live_session(now))
            .map(|u| u.username.clone())
            .ok_or(StoreError::NoSuchSession)
    }

    pub fn attempt_login_at(
        &self,
        username: &str,
        password: &str,
        remember: bool,
        now: DateTime<Utc>,
    ) -> Result<String, StoreError> {
        let stored_hash = match self.load_user(username) {
            Ok(user) => user.password_hash,
            Err(_) => {
                // Same verify cost as a wrong password, so timing does not reveal the user
                if let Some(hash) = unknown_user_hash() {
                    verify_password(password, hash);
                }
                tracing::warn!("Login rejected: unknown user '{}'", username);
                return Err(StoreError::InvalidCredentials);
            }
        };

        if !verify_password(password, &stored_hash) {
            tracing::warn!("Login rejected: bad password for '{}'", username);
            return Err(StoreError::InvalidCredentials);
        }

        let token = generate_token().map_err(|e| {
            tracing::error!("Session token generation failed: {}", e);
            StoreError::TokenGeneration(e)
        })?;
        let expiry = session_expiry(now, remember);

        self.mutate(username, |user| {
            user.session_token = token.clone();
            user.session_expiry = expiry;
        })?;

        tracing::info!("Login successful for user '{}' (remember: {})", username, remember);
        Ok(token)
    }

    pub fn logout_at(&self, username: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.mutate(username, |user| {
            user.session_token.clear();
            user.session_expiry = now;
        })?;

        tracing::info!("Logged out user '{}'", username);
        Ok(())
    }

    /// Clear token fields whose expiry has passed. Lookups already treat
    /// these as absent; this only keeps the snapshot tidy.
    pub fn purge_expired_sessions_at(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut users = self.users.write();
        let before = users.clone();

        let mut purged = 0;
        for user in users.iter_mut() {
            if !user.session_token.is_empty() && user.session_expiry <= now {
                user.session_token.clear();
                purged += 1;
            }
        }

        if purged > 0 {
            if let Err(e) = self.persist(&users) {
                *users = before;
                return Err(e);
            }
        }

        Ok(purged)
    }

    pub fn purge_expired_sessions(&self) -> Result<usize, StoreError> {
        self.purge_expired_sessions_at(Utc::now())
    }

    /// Apply `change` to one record and persist. The record is restored if
    /// the snapshot cannot be written.
    fn mutate<F>(&self, username: &str, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut UserRecord),
    {
        let mut users = self.users.write();
        let index = users
            .iter()
            .position(|u| u.username == username)
            .ok_or(StoreError::NoSuchUser)?;

        let previous = users[index].clone();
        change(&mut users[index]);

        if let Err(e) = self.persist(&users) {
            tracing::error!("Failed to save user file: {}", e);
            users[index] = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Rewrite the snapshot via a temp file and rename
    fn persist(&self, users: &[UserRecord]) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let content = serde_json::to_string_pretty(&SnapshotRef { users }).map_err(StoreError::Serialize)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, path)?;

        tracing::debug!("Saved user file {}", path.display());
        Ok(())
    }
}

fn session_expiry(now: DateTime<Utc>, remember: bool) -> DateTime<Utc> {
    if remember {
        now.checked_add_months(Months::new(REMEMBER_MONTHS))
            .unwrap_or_else(|| now + Duration::days(30))
    } else {
        now + Duration::seconds(SESSION_TTL_SECS)
    }
}

impl UserStorage for UserStore {
    fn load_user(&self, username: &str) -> Result<UserRecord, StoreError> {
        self.users
            .read()
            .iter()
            .find(|u| u.username == username)
            .cloned()
            .ok_or(StoreError::NoSuchUser)
    }

    fn load_username_from_session_token(&self, token: &str) -> Result<String, StoreError> {
        self.load_username_from_session_token_at(token, Utc::now())
    }

    fn attempt_login(&self, username: &str, password: &str, remember: bool) -> Result<String, StoreError> {
        self.attempt_login_at(username, password, remember, Utc::now())
    }

    fn logout(&self, username: &str) -> Result<(), StoreError> {
        self.logout_at(username, Utc::now())
    }
}
