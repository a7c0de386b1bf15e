//! Configuration file and environment overrides.
//!
//! ```toml
//! analysis_url = "http://127.0.0.1:8000"
//! log_filter = "pitch_finder=info"
//!
//! [backend]
//! kind = "sqlite"
//! path = "pitch-finder.db"
//!
//! [analysis]
//! connect_timeout_secs = 3
//! request_timeout_secs = 0
//! ```
//!
//! Every key is optional. `PITCH_FINDER_*` environment variables win over the
//! file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::analysis::{AnalysisClient, AnalysisService};
use crate::backend::{Backend, RestBackend, RestConfig, SqliteBackend};
use crate::error::{PitchError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "pitch-finder.toml";
pub const DEFAULT_ANALYSIS_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_DB_PATH: &str = "pitch-finder.db";
pub const DEFAULT_LOG_FILTER: &str = "pitch_finder=info";

pub const ENV_ANALYSIS_URL: &str = "PITCH_FINDER_ANALYSIS_URL";
pub const ENV_DB: &str = "PITCH_FINDER_DB";
pub const ENV_BACKEND_URL: &str = "PITCH_FINDER_BACKEND_URL";
pub const ENV_BACKEND_KEY: &str = "PITCH_FINDER_BACKEND_KEY";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Sqlite,
    Rest,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub path: PathBuf,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub session_file: Option<PathBuf>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Sqlite,
            path: PathBuf::from(DEFAULT_DB_PATH),
            url: None,
            api_key: None,
            session_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub connect_timeout_secs: u64,
    /// `0` waits indefinitely.
    pub request_timeout_secs: u64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 3,
            request_timeout_secs: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub analysis_url: String,
    pub log_filter: Option<String>,
    pub backend: BackendConfig,
    pub analysis: AnalysisSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            analysis_url: DEFAULT_ANALYSIS_URL.to_string(),
            log_filter: None,
            backend: BackendConfig::default(),
            analysis: AnalysisSettings::default(),
        }
    }
}

impl Config {
    /// Loads the config file and applies environment overrides.
    ///
    /// With `path == None` the default file is read if present. An explicitly
    /// named file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    debug!("no config file, using defaults");
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Reads and parses a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PitchError::Config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        Self::parse(&content)
            .map_err(|e| PitchError::Config(format!("failed to parse config file {}: {e}", path.display())))
    }

    /// Parses TOML text. Missing keys take their defaults.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Overrides fields from `lookup` (the process environment in production).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_ANALYSIS_URL) {
            self.analysis_url = url;
        }
        if let Some(path) = lookup(ENV_DB) {
            self.backend.path = PathBuf::from(path);
        }
        if let Some(url) = lookup(ENV_BACKEND_URL) {
            self.backend.kind = BackendKind::Rest;
            self.backend.url = Some(url);
        }
        if let Some(key) = lookup(ENV_BACKEND_KEY) {
            self.backend.api_key = Some(key);
        }
    }

    /// Filter directive used when `RUST_LOG` is not set.
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Whole-request timeout for the analysis call. `0` means none.
    pub fn request_timeout(&self) -> Option<Duration> {
        match self.analysis.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Opens the configured backend. Called once at the program root.
    pub fn build_backend(&self) -> Result<Arc<dyn Backend>> {
        match self.backend.kind {
            BackendKind::Sqlite => {
                debug!(path = %self.backend.path.display(), "opening sqlite backend");
                Ok(Arc::new(SqliteBackend::open(&self.backend.path)?))
            }
            BackendKind::Rest => {
                let url = self.backend.url.as_deref().ok_or_else(|| {
                    PitchError::Config("backend.url is required for the rest backend".into())
                })?;
                let key = self.backend.api_key.as_deref().ok_or_else(|| {
                    PitchError::Config("backend.api_key is required for the rest backend".into())
                })?;
                let mut rest = RestConfig::new(url, key);
                if let Some(file) = &self.backend.session_file {
                    rest = rest.session_file(file.clone());
                }
                debug!(url = %url, "using rest backend");
                Ok(Arc::new(RestBackend::new(rest)))
            }
        }
    }

    /// Builds the analysis client from `analysis_url` and `[analysis]`.
    pub fn build_analysis(&self) -> Arc<dyn AnalysisService> {
        Arc::new(
            AnalysisClient::builder(self.analysis_url.clone())
                .connect_timeout(Duration::from_secs(self.analysis.connect_timeout_secs))
                .request_timeout(self.request_timeout())
                .build(),
        )
    }
}
