//! Local SQLite backend.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::{validate_credentials, Account, Backend, MusicRecord, MusicRow, Session, StoredRange};
use crate::error::{PitchError, Result};

const SCHEMA_VERSION: i64 = 1;

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS profiles (
    id TEXT PRIMARY KEY NOT NULL,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS session (
    slot INTEGER PRIMARY KEY CHECK (slot = 0),
    token TEXT NOT NULL,
    user_id TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS pitch (
    user_id TEXT PRIMARY KEY NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
    high_sound TEXT NOT NULL,
    low_sound TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS music (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    profiles_id TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    original_url TEXT NOT NULL,
    cover_url TEXT NOT NULL,
    high_pitch TEXT,
    low_pitch TEXT,
    optimal_pitch INTEGER,
    comparison_pitch INTEGER
);
CREATE INDEX IF NOT EXISTS idx_music_profiles_id ON music(profiles_id);
";

/// Profiles, the active session, vocal ranges and comparison history in one
/// SQLite database. The active session is stored in the database so it
/// survives across runs of the CLI.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Opens or creates the database at `path` and migrates it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening sqlite backend");
        Self::with_connection(Connection::open(path)?)
    }

    /// A throwaway in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| PitchError::persistence("sqlite connection lock poisoned"))
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if version < SCHEMA_VERSION {
        debug!(from = version, to = SCHEMA_VERSION, "migrating sqlite schema");
        conn.execute_batch(SCHEMA_V1)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }
    Ok(())
}

/// Argon2 work runs on the blocking pool.
async fn hash_password(password: &str) -> Result<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| PitchError::persistence(format!("could not hash password: {e}")))
    })
    .await
    .map_err(|e| PitchError::persistence(format!("password hashing task failed: {e}")))?
}

async fn verify_password(password: &str, stored: &str) -> bool {
    let (password, stored) = (password.to_string(), stored.to_string());
    tokio::task::spawn_blocking(move || match PasswordHash::new(&stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    })
    .await
    .unwrap_or(false)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

#[async_trait]
impl Backend for SqliteBackend {
    async fn current_session(&self) -> Result<Option<Session>> {
        let conn = self.conn()?;
        let session = conn
            .query_row(
                "SELECT s.token, p.id, p.email FROM session s
                 JOIN profiles p ON p.id = s.user_id
                 WHERE s.slot = 0",
                [],
                |row| {
                    Ok(Session {
                        access_token: row.get(0)?,
                        user_id: row.get(1)?,
                        email: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(session)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let email = email.trim();
        let profile: Option<(String, String, String)> = self
            .conn()?
            .query_row(
                "SELECT id, email, password_hash FROM profiles WHERE email = ?1 COLLATE NOCASE",
                params![email],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let verified = match &profile {
            Some((_, _, hash)) => verify_password(password, hash).await,
            None => false,
        };
        let (user_id, email) = match profile {
            Some((id, email, _)) if verified => (id, email),
            _ => {
                debug!(email, "sign-in rejected");
                return Err(PitchError::auth("Invalid login credentials"));
            }
        };

        let token = uuid::Uuid::new_v4().to_string();
        self.conn()?.execute(
            "INSERT INTO session (slot, token, user_id) VALUES (0, ?1, ?2)
             ON CONFLICT(slot) DO UPDATE SET token = excluded.token,
                 user_id = excluded.user_id, created_at = CURRENT_TIMESTAMP",
            params![token, user_id],
        )?;
        info!(user_id = %user_id, "signed in");
        Ok(Session {
            user_id,
            email,
            access_token: token,
        })
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Account> {
        validate_credentials(email, password)?;
        let email = email.trim().to_string();
        let hash = hash_password(password).await?;
        let user_id = uuid::Uuid::new_v4().to_string();

        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM profiles WHERE email = ?1 COLLATE NOCASE)",
            params![email],
            |row| row.get(0),
        )?;
        if exists {
            return Err(PitchError::auth("User already registered"));
        }
        match conn.execute(
            "INSERT INTO profiles (id, email, password_hash) VALUES (?1, ?2, ?3)",
            params![user_id, email, hash],
        ) {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(PitchError::auth("User already registered"))
            }
            Err(e) => return Err(e.into()),
        }
        info!(user_id = %user_id, "account created");
        Ok(Account { user_id, email })
    }

    async fn sign_out(&self) -> Result<()> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM session", [])?;
        debug!(removed, "signed out");
        Ok(())
    }

    async fn fetch_range(&self, user_id: &str) -> Result<Option<StoredRange>> {
        let conn = self.conn()?;
        let range = conn
            .query_row(
                "SELECT high_sound, low_sound FROM pitch WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(StoredRange {
                        high_sound: row.get(0)?,
                        low_sound: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(range)
    }

    async fn upsert_range(&self, user_id: &str, range: &StoredRange) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO pitch (user_id, high_sound, low_sound) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET high_sound = excluded.high_sound,
                 low_sound = excluded.low_sound, updated_at = CURRENT_TIMESTAMP",
            params![user_id, range.high_sound, range.low_sound],
        )?;
        Ok(())
    }

    async fn insert_music(&self, record: &MusicRecord) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO music (profiles_id, title, original_url, cover_url,
                 high_pitch, low_pitch, optimal_pitch, comparison_pitch)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.profiles_id,
                record.title,
                record.original_url,
                record.cover_url,
                record.high_pitch,
                record.low_pitch,
                record.optimal_pitch,
                record.comparison_pitch,
            ],
        )?;
        Ok(())
    }

    async fn list_music(&self, user_id: &str) -> Result<Vec<MusicRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, created_at, profiles_id, title, original_url, cover_url,
                    high_pitch, low_pitch, optimal_pitch, comparison_pitch
             FROM music WHERE profiles_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok(MusicRow {
                    id: row.get(0)?,
                    created_at: row.get(1)?,
                    record: MusicRecord {
                        profiles_id: row.get(2)?,
                        title: row.get(3)?,
                        original_url: row.get(4)?,
                        cover_url: row.get(5)?,
                        high_pitch: row.get(6)?,
                        low_pitch: row.get(7)?,
                        optimal_pitch: row.get(8)?,
                        comparison_pitch: row.get(9)?,
                    },
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
