//! Typed client for the external analysis service (`POST /separate`).
//!
//! The service separates vocals from both tracks, detects their pitch and
//! replies with the key difference between cover and original and, when the
//! request carried the user's range, a recommended key shift. Responses are
//! narrowed into the types below at the boundary; anything that does not fit
//! becomes a [`PitchError::Service`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{PitchError, Result};

/// Message shown when a failed response carries no detail text.
pub const GENERIC_FAILURE: &str = "The analysis service could not compare these tracks.";

// -- wire types -------------------------------------------------------------

/// JSON body of `POST /separate`. Range hints are omitted when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeparateRequest {
    pub original_url: String,
    pub cover_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_high_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_low_note: Option<String>,
}

/// Per-track analysis echoed by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TrackAnalysis {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub max_note: Option<String>,
    #[serde(default)]
    pub min_note: Option<String>,
    #[serde(default)]
    pub central_midi: Option<i32>,
    #[serde(default)]
    pub central_note: Option<String>,
}

/// Success body of `POST /separate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SeparateResponse {
    #[serde(default)]
    pub key_difference: Option<i32>,
    #[serde(default)]
    pub user_key_shift: Option<i32>,
    #[serde(default)]
    pub original: Option<TrackAnalysis>,
    #[serde(default)]
    pub cover: Option<TrackAnalysis>,
}

/// Failure body. `detail` is usually a string but validation failures send
/// a structured value, which is rendered as JSON text.
#[derive(Debug, Deserialize)]
pub struct ServiceErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ServiceErrorBody {
    /// Detail text to show, if the body carried any.
    pub fn message(&self) -> Option<String> {
        match self.detail.as_ref()? {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            serde_json::Value::String(_) | serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

/// Maps a failure body to the message surfaced to the user.
pub fn failure_message(body: &str) -> String {
    serde_json::from_str::<ServiceErrorBody>(body)
        .ok()
        .and_then(|b| b.message())
        .unwrap_or_else(|| GENERIC_FAILURE.to_string())
}

/// Narrows a success body into [`SeparateResponse`].
pub fn parse_success(body: &str) -> Result<SeparateResponse> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| PitchError::service(format!("analysis service sent invalid JSON: {e}")))?;
    if value.is_null() {
        return Err(PitchError::service("analysis service returned no result"));
    }
    serde_json::from_value(value)
        .map_err(|e| PitchError::service(format!("unexpected response from analysis service: {e}")))
}

// -- service seam -----------------------------------------------------------

/// The comparison call. [`AnalysisClient`] implements it over HTTP.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn separate(&self, request: &SeparateRequest) -> Result<SeparateResponse>;
}

/// Connection settings for [`AnalysisClient`].
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Base URL of the service (e.g. `http://127.0.0.1:8000`).
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Whole-request timeout. `None` waits indefinitely; separation of two
    /// full tracks routinely takes minutes.
    pub request_timeout: Option<Duration>,
}

impl AnalysisConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            connect_timeout: Duration::from_secs(3),
            request_timeout: None,
        }
    }
}

/// HTTP implementation of [`AnalysisService`].
pub struct AnalysisClient {
    config: AnalysisConfig,
    client: reqwest::Client,
}

impl AnalysisClient {
    /// Starts a builder with default timeouts.
    pub fn builder(base_url: impl Into<String>) -> AnalysisClientBuilder {
        AnalysisClientBuilder::new(base_url)
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Full URL of the `separate` endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}/separate", self.config.base_url)
    }
}

#[async_trait]
impl AnalysisService for AnalysisClient {
    async fn separate(&self, request: &SeparateRequest) -> Result<SeparateResponse> {
        let url = self.endpoint();
        debug!(url = %url, original = %request.original_url, cover = %request.cover_url, "calling analysis service");
        let resp = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| PitchError::service(format!("could not reach analysis service at {url}: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| PitchError::service(format!("could not read analysis response: {e}")))?;

        if !status.is_success() {
            let message = failure_message(&body);
            warn!(status = status.as_u16(), message = %message, "analysis service reported failure");
            return Err(PitchError::Service(message));
        }
        parse_success(&body)
    }
}

/// Builder for [`AnalysisClient`].
pub struct AnalysisClientBuilder {
    config: AnalysisConfig,
}

impl AnalysisClientBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            config: AnalysisConfig::new(base_url),
        }
    }

    /// Time allowed to establish the TCP connection.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Whole-request timeout. `None` waits indefinitely.
    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Builds the client. Falls back to a default `reqwest` client if the
    /// configured one cannot be built.
    pub fn build(self) -> AnalysisClient {
        let mut builder = reqwest::Client::builder().connect_timeout(self.config.connect_timeout);
        if let Some(timeout) = self.config.request_timeout {
            builder = builder.timeout(timeout);
        }
        AnalysisClient {
            config: self.config,
            client: builder.build().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn request_omits_absent_hints() {
        let req = SeparateRequest {
            original_url: "https://o".into(),
            cover_url: "https://c".into(),
            user_high_note: None,
            user_low_note: None,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["original_url"], "https://o");
        assert!(v.get("user_high_note").is_none());
        assert!(v.get("user_low_note").is_none());
    }

    #[test]
    fn request_includes_hints() {
        let req = SeparateRequest {
            original_url: "o".into(),
            cover_url: "c".into(),
            user_high_note: Some("hiC".into()),
            user_low_note: Some("mid1A".into()),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"user_high_note\":\"hiC\""), "{json}");
        assert!(json.contains("\"user_low_note\":\"mid1A\""), "{json}");
    }

    #[test]
    fn full_success_body_parses() {
        let body = r#"{
            "original": {"title":"T","max_note":"C5","min_note":"A2","central_midi":60,"central_note":"mid2C"},
            "cover": {"title":"T (cover)","max_note":"D5","min_note":"B2","central_midi":62,"central_note":"mid2D"},
            "key_difference": 2,
            "user_key_shift": -1
        }"#;
        let resp = parse_success(body).unwrap();
        assert_eq!(resp.key_difference, Some(2));
        assert_eq!(resp.user_key_shift, Some(-1));
        assert_eq!(resp.original.unwrap().title.as_deref(), Some("T"));
    }

    #[test]
    fn missing_key_shift_parses_as_none() {
        let resp = parse_success(r#"{"key_difference": 0, "original": {"title": "T"}}"#).unwrap();
        assert_eq!(resp.user_key_shift, None);
    }

    #[test]
    fn null_body_is_service_error() {
        assert!(matches!(parse_success("null"), Err(PitchError::Service(_))));
    }

    #[test]
    fn wrong_shape_is_service_error() {
        assert!(matches!(
            parse_success(r#"{"key_difference": "two"}"#),
            Err(PitchError::Service(_))
        ));
        assert!(matches!(parse_success("<html>"), Err(PitchError::Service(_))));
    }

    #[test]
    fn failure_detail_is_verbatim() {
        assert_eq!(failure_message(r#"{"detail":"video unavailable"}"#), "video unavailable");
    }

    #[test]
    fn failure_without_detail_is_generic() {
        assert_eq!(failure_message(r#"{}"#), GENERIC_FAILURE);
        assert_eq!(failure_message("Internal Server Error"), GENERIC_FAILURE);
        assert_eq!(failure_message(r#"{"detail":""}"#), GENERIC_FAILURE);
    }

    #[test]
    fn structured_detail_is_rendered() {
        let msg = failure_message(r#"{"detail":[{"loc":["query","cover_url"],"msg":"field required"}]}"#);
        assert!(msg.contains("field required"), "{msg}");
    }

    // -- HTTP round trips against a one-shot local server ---------------------

    /// Accepts one connection, answers with `status` and `body`, and hands
    /// back the raw request it received.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&received).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().to_string()))
                        .and_then(|v| v.parse::<usize>().ok())
                        .unwrap_or(0);
                    if received.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            let reply = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            String::from_utf8(received).unwrap()
        });
        (format!("http://{addr}"), handle)
    }

    fn hinted_request() -> SeparateRequest {
        SeparateRequest {
            original_url: "https://o".into(),
            cover_url: "https://c".into(),
            user_high_note: Some("hiC".into()),
            user_low_note: Some("mid1A".into()),
        }
    }

    #[tokio::test]
    async fn separate_posts_json_and_parses_success() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"key_difference":2,"user_key_shift":-1,"original":{"title":"T"}}"#,
        )
        .await;
        let client = AnalysisClient::builder(base).build();

        let resp = client.separate(&hinted_request()).await.unwrap();
        assert_eq!(resp.key_difference, Some(2));
        assert_eq!(resp.user_key_shift, Some(-1));

        let raw = server.await.unwrap();
        let (head, body) = raw.split_once("\r\n\r\n").unwrap();
        assert!(head.starts_with("POST /separate HTTP/1.1"), "{head}");
        assert!(head.to_ascii_lowercase().contains("content-type: application/json"), "{head}");
        let sent: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(sent["original_url"], "https://o");
        assert_eq!(sent["cover_url"], "https://c");
        assert_eq!(sent["user_high_note"], "hiC");
        assert_eq!(sent["user_low_note"], "mid1A");
    }

    #[tokio::test]
    async fn separate_error_status_surfaces_detail_verbatim() {
        for status in ["400 Bad Request", "422 Unprocessable Entity", "500 Internal Server Error"] {
            let (base, server) = serve_once(status, r#"{"detail":"video unavailable"}"#).await;
            let client = AnalysisClient::builder(base).build();
            let err = client.separate(&hinted_request()).await.unwrap_err();
            assert!(
                matches!(&err, PitchError::Service(msg) if msg == "video unavailable"),
                "{status}: {err:?}"
            );
            server.await.unwrap();
        }
    }

    #[tokio::test]
    async fn separate_error_status_without_detail_is_generic() {
        let (base, server) = serve_once("502 Bad Gateway", "{}").await;
        let client = AnalysisClient::builder(base).build();
        let err = client.separate(&hinted_request()).await.unwrap_err();
        assert!(matches!(&err, PitchError::Service(msg) if msg == GENERIC_FAILURE), "{err:?}");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn separate_null_success_body_is_failure() {
        let (base, server) = serve_once("200 OK", "null").await;
        let client = AnalysisClient::builder(base).build();
        let err = client.separate(&hinted_request()).await.unwrap_err();
        assert!(matches!(err, PitchError::Service(_)), "{err:?}");
        server.await.unwrap();
    }

    #[test]
    fn builder_defaults() {
        let client = AnalysisClient::builder("http://localhost:8000/").build();
        assert_eq!(client.endpoint(), "http://localhost:8000/separate");
        assert_eq!(client.config().connect_timeout, Duration::from_secs(3));
        assert!(client.config().request_timeout.is_none());
    }

    #[test]
    fn builder_sets_timeouts() {
        let client = AnalysisClient::builder("http://localhost:8000")
            .connect_timeout(Duration::from_secs(1))
            .request_timeout(Some(Duration::from_secs(600)))
            .build();
        assert_eq!(client.config().connect_timeout, Duration::from_secs(1));
        assert_eq!(client.config().request_timeout, Some(Duration::from_secs(600)));
    }
}
