//! Embedded user/session store backing dashboard authentication.
//!
//! One SQLite file (`<data_dir>/roost.db`), single writer per CLI
//! invocation. Passwords are generated — never taken from input — shown once
//! to the caller and persisted only as argon2 PHC strings.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use argon2::password_hash::rand_core::{OsRng, RngCore};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RoostError};

/// Fixed generated-password length.
pub const PASSWORD_LENGTH: usize = 16;

/// 70-character alphabet for generated passwords.
pub const PASSWORD_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*";

/// Access role for a dashboard user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    View,
    Edit,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::View => write!(f, "view"),
            Self::Edit => write!(f, "edit"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "view" => Ok(Self::View),
            "edit" => Ok(Self::Edit),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role '{other}'. Valid: view, edit, admin")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_by: Option<i64>,
}

/// Listing row — everything but the creator reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// Generate a password: `PASSWORD_LENGTH` chars sampled from
/// `PASSWORD_ALPHABET` using the OS CSPRNG. Never derived from user input.
pub fn generate_password() -> String {
    let mut bytes = [0u8; PASSWORD_LENGTH];
    OsRng.fill_bytes(&mut bytes);
    bytes
        .iter()
        .map(|b| PASSWORD_ALPHABET[*b as usize % PASSWORD_ALPHABET.len()] as char)
        .collect()
}

fn hash_password(plain: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| RoostError::Storage(format!("failed to hash password: {e}")))
}

fn verify_hash(plain: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| RoostError::Storage(format!("invalid password hash format: {e}")))?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

fn validate_email(email: &str) -> Result<()> {
    // Minimal by design: presence of '@', nothing more.
    if email.is_empty() || !email.contains('@') {
        return Err(RoostError::InvalidEmail(email.to_string()));
    }
    Ok(())
}

/// SQLite-backed user store.
///
/// Uses a single `Connection` behind `Arc<Mutex<>>` so it can be shared
/// across async tasks. All blocking SQLite calls go through
/// [`with_conn`](Self::with_conn) which runs them on the Tokio blocking
/// thread-pool; argon2 hashing runs on the same pool because it is
/// deliberately CPU-expensive.
pub struct UserStore {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl UserStore {
    /// Default database path: `<data_dir>/roost.db`
    pub fn db_path(data_dir: &Path) -> PathBuf {
        data_dir.join("roost.db")
    }

    /// Open (or create) the file-backed store at `path`. Schema bootstrap is
    /// idempotent — safe to run on every open.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| RoostError::Storage(format!("failed to create data dir: {e}")))?;
            }
        }
        let conn = Connection::open(&path)
            .map_err(|e| RoostError::Storage(format!("failed to open user database: {e}")))?;
        Self::configure_and_init(conn, path)
    }

    /// Open an in-memory store (tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            RoostError::Storage(format!("failed to open in-memory user database: {e}"))
        })?;
        Self::configure_and_init(conn, PathBuf::from(":memory:"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn configure_and_init(conn: Connection, path: PathBuf) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(|e| RoostError::Storage(format!("failed to set WAL mode: {e}")))?;

        // Required for the sessions ON DELETE CASCADE.
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| RoostError::Storage(format!("failed to enable foreign keys: {e}")))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        };
        store.create_tables()?;
        Ok(store)
    }

    /// Create tables and indexes (idempotent).
    fn create_tables(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RoostError::Storage(format!("failed to acquire database lock: {e}")))?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'view',
                created_at TEXT NOT NULL,
                last_login TEXT,
                created_by INTEGER REFERENCES users(id)
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                expires_at TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);
            ",
        )
        .map_err(|e| RoostError::Storage(format!("failed to create tables: {e}")))?;

        Ok(())
    }

    /// Run a blocking closure against the SQLite connection on the Tokio
    /// blocking thread-pool.
    pub(crate) async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| RoostError::Storage(format!("failed to acquire database lock: {e}")))?;
            f(&conn)
        })
        .await
        .map_err(|e| RoostError::Storage(format!("task join error: {e}")))?
    }

    // ── operations ─────────────────────────────────────────────────────

    /// Create a user with a freshly generated password. Returns the stored
    /// row and the plaintext password — the only time it is ever visible.
    pub async fn create_user(&self, email: &str, role: Role) -> Result<(User, String)> {
        validate_email(email)?;

        let password = generate_password();
        let plain = password.clone();
        let hash = tokio::task::spawn_blocking(move || hash_password(&plain))
            .await
            .map_err(|e| RoostError::Storage(format!("task join error: {e}")))??;

        let email_owned = email.to_string();
        let user = self
            .with_conn(move |conn| {
                let existing: Option<i64> = conn
                    .query_row(
                        "SELECT id FROM users WHERE email = ?1",
                        params![email_owned],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(storage_err)?;
                if existing.is_some() {
                    return Err(RoostError::DuplicateEmail(email_owned));
                }

                conn.execute(
                    "INSERT INTO users (email, password_hash, role, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![email_owned, hash, role.to_string(), Utc::now().to_rfc3339()],
                )
                .map_err(|e| map_constraint(e, &email_owned))?;

                fetch_user_by_id(conn, conn.last_insert_rowid())
            })
            .await?;

        Ok((user, password))
    }

    pub async fn find_user(&self, email: &str) -> Result<Option<User>> {
        let email = email.to_string();
        self.with_conn(move |conn| {
            let id: Option<i64> = conn
                .query_row(
                    "SELECT id FROM users WHERE email = ?1",
                    params![email],
                    |row| row.get(0),
                )
                .optional()
                .map_err(storage_err)?;
            match id {
                Some(id) => fetch_user_by_id(conn, id).map(Some),
                None => Ok(None),
            }
        })
        .await
    }

    pub async fn list_users(&self) -> Result<Vec<UserSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, email, role, created_at, last_login
                     FROM users ORDER BY id",
                )
                .map_err(storage_err)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                })
                .map_err(storage_err)?;

            let mut users = Vec::new();
            for row in rows {
                let (id, email, role, created_at, last_login) = row.map_err(storage_err)?;
                users.push(UserSummary {
                    id,
                    email,
                    role: parse_role(&role)?,
                    created_at: parse_timestamp(&created_at)?,
                    last_login: last_login.as_deref().map(parse_timestamp).transpose()?,
                });
            }
            Ok(users)
        })
        .await
    }

    /// Delete a user. Sessions go with it via the FK cascade.
    pub async fn delete_user(&self, email: &str) -> Result<()> {
        let email = email.to_string();
        self.with_conn(move |conn| {
            let deleted = conn
                .execute("DELETE FROM users WHERE email = ?1", params![email])
                .map_err(storage_err)?;
            if deleted == 0 {
                return Err(RoostError::UserNotFound(email));
            }
            Ok(())
        })
        .await
    }

    /// Replace the user's password hash with a freshly generated password
    /// and revoke every session they hold. Returns the new plaintext once.
    pub async fn reset_password(&self, email: &str) -> Result<String> {
        let password = generate_password();
        let plain = password.clone();
        let hash = tokio::task::spawn_blocking(move || hash_password(&plain))
            .await
            .map_err(|e| RoostError::Storage(format!("task join error: {e}")))??;

        let email_owned = email.to_string();
        self.with_conn(move |conn| {
            let id: Option<i64> = conn
                .query_row(
                    "SELECT id FROM users WHERE email = ?1",
                    params![email_owned],
                    |row| row.get(0),
                )
                .optional()
                .map_err(storage_err)?;
            let Some(id) = id else {
                return Err(RoostError::UserNotFound(email_owned));
            };

            conn.execute(
                "UPDATE users SET password_hash = ?1 WHERE id = ?2",
                params![hash, id],
            )
            .map_err(storage_err)?;
            // Credential reset revokes all existing logins.
            conn.execute("DELETE FROM sessions WHERE user_id = ?1", params![id])
                .map_err(storage_err)?;
            Ok(())
        })
        .await?;

        Ok(password)
    }

    /// Verify a plaintext password against the stored hash.
    pub async fn verify_password(&self, email: &str, password: &str) -> Result<bool> {
        let email = email.to_string();
        let hash: Option<String> = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT password_hash FROM users WHERE email = ?1",
                    params![email],
                    |row| row.get(0),
                )
                .optional()
                .map_err(storage_err)
            })
            .await?;

        let Some(hash) = hash else {
            return Ok(false);
        };
        let password = password.to_string();
        tokio::task::spawn_blocking(move || verify_hash(&password, &hash))
            .await
            .map_err(|e| RoostError::Storage(format!("task join error: {e}")))?
    }

    pub async fn count_users(&self) -> Result<i64> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
                .map_err(storage_err)
        })
        .await
    }

    /// Session creation belongs to the dashboard runtime; it lives here so
    /// the reset/cascade invariants are exercisable end-to-end.
    pub async fn create_session(&self, user_id: i64, ttl: chrono::Duration) -> Result<String> {
        let id = uuid::Uuid::now_v7().to_string();
        let session_id = id.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, user_id, expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    session_id,
                    user_id,
                    (Utc::now() + ttl).to_rfc3339(),
                    Utc::now().to_rfc3339()
                ],
            )
            .map_err(storage_err)?;
            Ok(())
        })
        .await?;
        Ok(id)
    }

    pub async fn count_sessions(&self, user_id: i64) -> Result<i64> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM sessions WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .map_err(storage_err)
        })
        .await
    }

    /// Destroy and recreate the store contents in place (the "recreate"
    /// duplicate-email recovery branch). Drops every user and session.
    pub async fn wipe(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch("DELETE FROM sessions; DELETE FROM users;")
                .map_err(|e| RoostError::Storage(format!("failed to wipe user store: {e}")))
        })
        .await
    }
}

fn storage_err(e: rusqlite::Error) -> RoostError {
    RoostError::Storage(e.to_string())
}

fn map_constraint(e: rusqlite::Error, email: &str) -> RoostError {
    match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            RoostError::DuplicateEmail(email.to_string())
        }
        other => storage_err(other),
    }
}

fn parse_role(s: &str) -> Result<Role> {
    s.parse()
        .map_err(|e: String| RoostError::Storage(format!("corrupt role column: {e}")))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| RoostError::Storage(format!("corrupt timestamp column: {e}")))
}

fn fetch_user_by_id(conn: &Connection, id: i64) -> Result<User> {
    let (id, email, role, created_at, last_login, created_by) = conn
        .query_row(
            "SELECT id, email, role, created_at, last_login, created_by
             FROM users WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                ))
            },
        )
        .map_err(storage_err)?;

    Ok(User {
        id,
        email,
        role: parse_role(&role)?,
        created_at: parse_timestamp(&created_at)?,
        last_login: last_login.as_deref().map(parse_timestamp).transpose()?,
        created_by,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_password_uses_alphabet() {
        let password = generate_password();
        assert_eq!(password.len(), PASSWORD_LENGTH);
        assert!(password
            .bytes()
            .all(|b| PASSWORD_ALPHABET.contains(&b)));
        // Two draws colliding would be a one-in-70^16 event.
        assert_ne!(password, generate_password());
    }

    #[test]
    fn role_parse_roundtrip() {
        for role in [Role::View, Role::Edit, Role::Admin] {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn schema_bootstrap_is_idempotent() {
        let store = UserStore::open_in_memory().expect("open in-memory store");
        store.create_tables().expect("second bootstrap must be a no-op");
        store.create_tables().expect("and the third");
    }

    #[tokio::test]
    async fn create_user_concrete_scenario() {
        let store = UserStore::open_in_memory().unwrap();
        let (user, password) = store.create_user("ops@example.com", Role::View).await.unwrap();

        assert_eq!(password.len(), 16);
        assert!(password.bytes().all(|b| PASSWORD_ALPHABET.contains(&b)));
        assert_eq!(user.email, "ops@example.com");
        assert_eq!(user.role, Role::View);
        assert!(user.last_login.is_none());

        let users = store.list_users().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].email, "ops@example.com");
        assert_eq!(users[0].role, Role::View);
        assert!(users[0].last_login.is_none());
    }

    #[tokio::test]
    async fn duplicate_email_rejected() {
        let store = UserStore::open_in_memory().unwrap();
        store.create_user("a@b.com", Role::Admin).await.unwrap();

        let err = store.create_user("a@b.com", Role::View).await.unwrap_err();
        assert!(matches!(err, RoostError::DuplicateEmail(ref e) if e == "a@b.com"));

        // Exactly one row survives.
        assert_eq!(store.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn email_match_is_case_sensitive() {
        let store = UserStore::open_in_memory().unwrap();
        store.create_user("a@b.com", Role::Admin).await.unwrap();
        // Different case is a different stored value.
        store.create_user("A@b.com", Role::View).await.unwrap();
        assert_eq!(store.count_users().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn invalid_email_rejected() {
        let store = UserStore::open_in_memory().unwrap();
        let err = store.create_user("no-at-sign", Role::View).await.unwrap_err();
        assert!(matches!(err, RoostError::InvalidEmail(_)));
        assert_eq!(store.count_users().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn password_never_stored_in_plaintext() {
        let store = UserStore::open_in_memory().unwrap();
        let (user, password) = store.create_user("a@b.com", Role::Admin).await.unwrap();

        let stored: String = store
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT password_hash FROM users WHERE id = ?1",
                    params![user.id],
                    |row| row.get(0),
                )
                .map_err(storage_err)
            })
            .await
            .unwrap();

        assert_ne!(stored, password);
        assert!(!stored.contains(&password));
        assert!(stored.starts_with("$argon2"));

        assert!(store.verify_password("a@b.com", &password).await.unwrap());
        assert!(!store.verify_password("a@b.com", "wrong-password").await.unwrap());
    }

    #[tokio::test]
    async fn reset_revokes_sessions_and_changes_hash() {
        let store = UserStore::open_in_memory().unwrap();
        let (user, old_password) = store.create_user("a@b.com", Role::Admin).await.unwrap();

        store
            .create_session(user.id, chrono::Duration::hours(24))
            .await
            .unwrap();
        store
            .create_session(user.id, chrono::Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(store.count_sessions(user.id).await.unwrap(), 2);

        let new_password = store.reset_password("a@b.com").await.unwrap();

        assert_eq!(store.count_sessions(user.id).await.unwrap(), 0);
        assert!(!store.verify_password("a@b.com", &old_password).await.unwrap());
        assert!(store.verify_password("a@b.com", &new_password).await.unwrap());
    }

    #[tokio::test]
    async fn delete_cascades_to_sessions() {
        let store = UserStore::open_in_memory().unwrap();
        let (user, _) = store.create_user("a@b.com", Role::Edit).await.unwrap();
        for _ in 0..3 {
            store
                .create_session(user.id, chrono::Duration::hours(1))
                .await
                .unwrap();
        }
        assert_eq!(store.count_sessions(user.id).await.unwrap(), 3);

        store.delete_user("a@b.com").await.unwrap();

        assert_eq!(store.count_users().await.unwrap(), 0);
        assert_eq!(store.count_sessions(user.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_missing_user_errors() {
        let store = UserStore::open_in_memory().unwrap();
        let err = store.delete_user("ghost@example.com").await.unwrap_err();
        assert!(matches!(err, RoostError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn wipe_empties_both_tables() {
        let store = UserStore::open_in_memory().unwrap();
        let (user, _) = store.create_user("a@b.com", Role::Admin).await.unwrap();
        store
            .create_session(user.id, chrono::Duration::hours(1))
            .await
            .unwrap();

        store.wipe().await.unwrap();

        assert_eq!(store.count_users().await.unwrap(), 0);
        assert_eq!(store.count_sessions(user.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn file_backed_store_reopens() {
        let dir = std::env::temp_dir().join(format!("roost-users-test-{}", uuid::Uuid::now_v7()));
        let db_path = dir.join("roost.db");

        {
            let store = UserStore::open(&db_path).unwrap();
            store.create_user("a@b.com", Role::Admin).await.unwrap();
        }

        // Reopen runs the bootstrap again against existing tables.
        let store = UserStore::open(&db_path).unwrap();
        assert_eq!(store.count_users().await.unwrap(), 1);

        drop(store);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
