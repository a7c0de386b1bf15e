//! # Authentication / persistence backend
//!
//! The application talks to exactly one backend, constructed at the root of
//! the program and handed to every view as `Arc<dyn Backend>`:
//!
//! - [`SqliteBackend`] keeps profiles, the active session, the `pitch` table
//!   and the `music` history in a local SQLite file.
//! - [`RestBackend`] talks to a hosted auth + PostgREST style service.
//!
//! Single-row reads that find nothing return `Ok(None)`; that is "no data
//! yet", never an error.

pub mod rest;
pub mod sqlite;

pub use rest::{RestBackend, RestConfig};
pub use sqlite::SqliteBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{PitchError, Result};

/// Minimum accepted password length on sign-up.
pub const MIN_PASSWORD_LEN: usize = 6;

/// An authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub email: String,
    pub access_token: String,
}

/// A newly registered account. Registering does not sign the user in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: String,
    pub email: String,
}

/// The single `pitch` row of a user: their vocal range in display form (`mid1C`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRange {
    pub high_sound: String,
    pub low_sound: String,
}

/// One comparison result as written to the `music` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusicRecord {
    pub profiles_id: String,
    pub title: String,
    pub original_url: String,
    pub cover_url: String,
    /// Highest note of the original vocal line.
    pub high_pitch: Option<String>,
    /// Lowest note of the original vocal line.
    pub low_pitch: Option<String>,
    /// Recommended key shift for the user, in semitones.
    pub optimal_pitch: Option<i32>,
    /// Key difference between cover and original, in semitones.
    pub comparison_pitch: Option<i32>,
}

/// A `music` row read back from the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusicRow {
    pub id: i64,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub record: MusicRecord,
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// The active session, if any.
    async fn current_session(&self) -> Result<Option<Session>>;

    /// Signs in with email and password and makes the session active.
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;

    /// Registers a new account.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Account>;

    /// Ends the active session. Signing out with no session is a no-op.
    async fn sign_out(&self) -> Result<()>;

    /// Reads the user's `pitch` row. `Ok(None)` when the user has none yet.
    async fn fetch_range(&self, user_id: &str) -> Result<Option<StoredRange>>;

    /// Creates or replaces the user's single `pitch` row.
    async fn upsert_range(&self, user_id: &str, range: &StoredRange) -> Result<()>;

    /// Appends one row to the `music` history.
    async fn insert_music(&self, record: &MusicRecord) -> Result<()>;

    /// All `music` rows of a user, oldest first.
    async fn list_music(&self, user_id: &str) -> Result<Vec<MusicRow>>;
}

/// Local checks applied before any sign-up reaches a backend.
pub fn validate_credentials(email: &str, password: &str) -> Result<()> {
    let email = email.trim();
    if email.is_empty() {
        return Err(PitchError::validation("email is required"));
    }
    if !email.contains('@') {
        return Err(PitchError::validation(format!("'{email}' is not an email address")));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(PitchError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}
