//! Hosted backend: an auth service plus a PostgREST style table API.
//!
//! Endpoints used, relative to `base_url`:
//!
//! | operation       | request                                                  |
//! |-----------------|----------------------------------------------------------|
//! | sign in         | `POST /auth/v1/token?grant_type=password`                |
//! | sign up         | `POST /auth/v1/signup`                                   |
//! | sign out        | `POST /auth/v1/logout`                                   |
//! | read range      | `GET /rest/v1/pitch?user_id=eq.<id>&select=...`          |
//! | upsert range    | `POST /rest/v1/pitch` + `Prefer: resolution=merge-duplicates` |
//! | append history  | `POST /rest/v1/music`                                    |
//! | list history    | `GET /rest/v1/music?profiles_id=eq.<id>&order=id.asc`    |
//!
//! The session is kept in memory and, when a session file is configured,
//! mirrored to disk as JSON so it survives across runs.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{validate_credentials, Account, Backend, MusicRecord, MusicRow, Session, StoredRange};
use crate::error::{PitchError, Result};

/// Where the hosted backend lives and how to authenticate to it.
#[derive(Debug, Clone)]
pub struct RestConfig {
    pub base_url: String,
    /// Public API key sent as the `apikey` header on every request.
    pub api_key: String,
    pub session_file: Option<PathBuf>,
    pub connect_timeout: Duration,
}

impl RestConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            session_file: None,
            connect_timeout: Duration::from_secs(3),
        }
    }

    /// Persists the session to `path` so it survives between runs.
    pub fn session_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_file = Some(path.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

// -- auth wire types --------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct PasswordGrant<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub user: AuthUser,
}

/// Sign-up replies either with a session envelope (`{access_token, user}`)
/// or with the bare user when email confirmation is pending.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SignUpResponse {
    WithSession { user: AuthUser },
    User(AuthUser),
}

impl SignUpResponse {
    fn into_user(self) -> AuthUser {
        match self {
            SignUpResponse::WithSession { user } => user,
            SignUpResponse::User(user) => user,
        }
    }
}

/// Error body shapes seen from the auth and table APIs.
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ApiErrorBody {
    pub fn text(&self) -> Option<&str> {
        self.error_description
            .as_deref()
            .or(self.msg.as_deref())
            .or(self.message.as_deref())
            .or(self.error.as_deref())
    }
}

#[derive(Debug, Serialize)]
struct PitchUpsert<'a> {
    user_id: &'a str,
    high_sound: &'a str,
    low_sound: &'a str,
}

/// Hosted auth and REST backend.
pub struct RestBackend {
    config: RestConfig,
    client: reqwest::Client,
    session: Mutex<Option<Session>>,
}

impl RestBackend {
    pub fn new(config: RestConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .unwrap_or_default();
        let session = config.session_file.as_ref().and_then(|path| {
            let raw = std::fs::read_to_string(path).ok()?;
            match serde_json::from_str::<Session>(&raw) {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "ignoring unreadable session file");
                    None
                }
            }
        });
        Self {
            config,
            client,
            session: Mutex::new(session),
        }
    }

    fn session_slot(&self) -> Result<MutexGuard<'_, Option<Session>>> {
        self.session
            .lock()
            .map_err(|_| PitchError::auth("session lock poisoned"))
    }

    fn store_session(&self, session: Option<Session>) -> Result<()> {
        if let Some(path) = &self.config.session_file {
            let outcome = match &session {
                Some(s) => serde_json::to_string(s)
                    .map_err(std::io::Error::other)
                    .and_then(|json| std::fs::write(path, json)),
                None => match std::fs::remove_file(path) {
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    other => other,
                },
            };
            if let Err(e) = outcome {
                warn!(error = %e, path = %path.display(), "could not update session file");
            }
        }
        *self.session_slot()? = session;
        Ok(())
    }

    /// Bearer token for table requests: the user's access token when signed in.
    fn bearer(&self) -> Result<String> {
        Ok(self
            .session_slot()?
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.config.api_key.clone()))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> Result<reqwest::RequestBuilder> {
        Ok(self
            .client
            .request(method, self.config.url(path))
            .header("apikey", &self.config.api_key)
            .bearer_auth(self.bearer()?))
    }

    async fn error_text(resp: reqwest::Response) -> String {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        serde_json::from_str::<ApiErrorBody>(&body)
            .ok()
            .and_then(|b| b.text().map(str::to_string))
            .unwrap_or_else(|| format!("HTTP {status}"))
    }

    async fn table_error(resp: reqwest::Response) -> PitchError {
        PitchError::persistence(Self::error_text(resp).await)
    }
}

fn persistence(e: reqwest::Error) -> PitchError {
    PitchError::persistence(e.to_string())
}

fn auth(e: reqwest::Error) -> PitchError {
    PitchError::auth(e.to_string())
}

#[async_trait]
impl Backend for RestBackend {
    async fn current_session(&self) -> Result<Option<Session>> {
        Ok(self.session_slot()?.clone())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let email = email.trim();
        let resp = self
            .client
            .post(self.config.url("/auth/v1/token?grant_type=password"))
            .header("apikey", &self.config.api_key)
            .json(&PasswordGrant { email, password })
            .send()
            .await
            .map_err(auth)?;
        if !resp.status().is_success() {
            return Err(PitchError::auth(Self::error_text(resp).await));
        }
        let token: TokenResponse = resp.json().await.map_err(auth)?;
        let session = Session {
            email: token.user.email.unwrap_or_else(|| email.to_string()),
            user_id: token.user.id,
            access_token: token.access_token,
        };
        self.store_session(Some(session.clone()))?;
        info!(user_id = %session.user_id, "signed in");
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Account> {
        validate_credentials(email, password)?;
        let email = email.trim();
        let resp = self
            .client
            .post(self.config.url("/auth/v1/signup"))
            .header("apikey", &self.config.api_key)
            .json(&PasswordGrant { email, password })
            .send()
            .await
            .map_err(auth)?;
        if !resp.status().is_success() {
            return Err(PitchError::auth(Self::error_text(resp).await));
        }
        let user = resp.json::<SignUpResponse>().await.map_err(auth)?.into_user();
        Ok(Account {
            email: user.email.unwrap_or_else(|| email.to_string()),
            user_id: user.id,
        })
    }

    async fn sign_out(&self) -> Result<()> {
        let signed_in = self.session_slot()?.is_some();
        if signed_in {
            let resp = self
                .request(reqwest::Method::POST, "/auth/v1/logout")?
                .send()
                .await;
            match resp {
                Ok(r) if r.status().is_success() => {}
                Ok(r) => warn!(status = %r.status(), "logout rejected, clearing local session"),
                Err(e) => warn!(error = %e, "logout failed, clearing local session"),
            }
        }
        self.store_session(None)
    }

    async fn fetch_range(&self, user_id: &str) -> Result<Option<StoredRange>> {
        let resp = self
            .request(reqwest::Method::GET, "/rest/v1/pitch")?
            .query(&[
                ("user_id", format!("eq.{user_id}")),
                ("select", "high_sound,low_sound".to_string()),
            ])
            .send()
            .await
            .map_err(persistence)?;
        if !resp.status().is_success() {
            return Err(Self::table_error(resp).await);
        }
        let rows: Vec<StoredRange> = resp.json().await.map_err(persistence)?;
        debug!(user_id, rows = rows.len(), "fetched range");
        Ok(rows.into_iter().next())
    }

    async fn upsert_range(&self, user_id: &str, range: &StoredRange) -> Result<()> {
        let resp = self
            .request(reqwest::Method::POST, "/rest/v1/pitch")?
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .query(&[("on_conflict", "user_id")])
            .json(&PitchUpsert {
                user_id,
                high_sound: &range.high_sound,
                low_sound: &range.low_sound,
            })
            .send()
            .await
            .map_err(persistence)?;
        if !resp.status().is_success() {
            return Err(Self::table_error(resp).await);
        }
        Ok(())
    }

    async fn insert_music(&self, record: &MusicRecord) -> Result<()> {
        let resp = self
            .request(reqwest::Method::POST, "/rest/v1/music")?
            .header("Prefer", "return=minimal")
            .json(record)
            .send()
            .await
            .map_err(persistence)?;
        if !resp.status().is_success() {
            return Err(Self::table_error(resp).await);
        }
        Ok(())
    }

    async fn list_music(&self, user_id: &str) -> Result<Vec<MusicRow>> {
        let resp = self
            .request(reqwest::Method::GET, "/rest/v1/music")?
            .query(&[
                ("profiles_id", format!("eq.{user_id}")),
                ("select", "*".to_string()),
                ("order", "id.asc".to_string()),
            ])
            .send()
            .await
            .map_err(persistence)?;
        if !resp.status().is_success() {
            return Err(Self::table_error(resp).await);
        }
        resp.json().await.map_err(persistence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_trims_trailing_slash() {
        let cfg = RestConfig::new("https://db.example.com/", "key");
        assert_eq!(cfg.url("/rest/v1/music"), "https://db.example.com/rest/v1/music");
    }

    #[test]
    fn token_response_deserializes() {
        let json = r#"{"access_token":"jwt","token_type":"bearer","user":{"id":"u-1","email":"a@b.c"}}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token, "jwt");
        assert_eq!(token.user.id, "u-1");
    }

    #[test]
    fn sign_up_response_both_shapes() {
        let with_session = r#"{"access_token":"jwt","user":{"id":"u-1","email":"a@b.c"}}"#;
        let bare = r#"{"id":"u-2","email":"d@e.f","confirmation_sent_at":"2024-01-01"}"#;
        let a: SignUpResponse = serde_json::from_str(with_session).unwrap();
        let b: SignUpResponse = serde_json::from_str(bare).unwrap();
        assert_eq!(a.into_user().id, "u-1");
        assert_eq!(b.into_user().id, "u-2");
    }

    #[test]
    fn api_error_text_prefers_description() {
        let body: ApiErrorBody = serde_json::from_str(
            r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
        )
        .unwrap();
        assert_eq!(body.text(), Some("Invalid login credentials"));

        let body: ApiErrorBody = serde_json::from_str(r#"{"msg":"User already registered"}"#).unwrap();
        assert_eq!(body.text(), Some("User already registered"));

        assert_eq!(ApiErrorBody::default().text(), None);
    }

    #[test]
    fn pitch_upsert_serializes_columns() {
        let body = PitchUpsert {
            user_id: "u",
            high_sound: "hiC",
            low_sound: "mid1A",
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["user_id"], "u");
        assert_eq!(v["high_sound"], "hiC");
        assert_eq!(v["low_sound"], "mid1A");
    }

    #[tokio::test]
    async fn session_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let session = Session {
            user_id: "u-1".into(),
            email: "a@b.c".into(),
            access_token: "jwt".into(),
        };

        let backend = RestBackend::new(RestConfig::new("http://127.0.0.1:9", "key").session_file(&path));
        assert!(backend.current_session().await.unwrap().is_none());
        backend.store_session(Some(session.clone())).unwrap();

        let reloaded = RestBackend::new(RestConfig::new("http://127.0.0.1:9", "key").session_file(&path));
        assert_eq!(reloaded.current_session().await.unwrap(), Some(session));

        reloaded.store_session(None).unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn sign_up_validates_before_network() {
        let backend = RestBackend::new(RestConfig::new("http://127.0.0.1:9", "key"));
        let err = backend.sign_up("", "secret1").await.unwrap_err();
        assert!(matches!(err, PitchError::Validation(_)));
    }
}
