//! Application root: owns the backend and analysis clients and hands them to
//! each view as it is opened.

use std::sync::Arc;

use crate::analysis::AnalysisService;
use crate::backend::Backend;
use crate::config::Config;
use crate::error::Result;
use crate::preview::PreviewVoice;
use crate::range::RangeSelector;
use crate::routes::{navigate, Navigation};
use crate::workflow::ComparisonWorkflow;

#[derive(Clone)]
pub struct App {
    backend: Arc<dyn Backend>,
    analysis: Arc<dyn AnalysisService>,
}

impl App {
    /// Wraps already-built seams.
    pub fn new(backend: Arc<dyn Backend>, analysis: Arc<dyn AnalysisService>) -> Self {
        Self { backend, analysis }
    }

    /// Builds the backend and analysis client described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config.build_backend()?, config.build_analysis()))
    }

    /// The shared backend.
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Resolves `path`, running the session gate for protected views.
    pub async fn navigate(&self, path: &str) -> Navigation {
        navigate(path, self.backend()).await
    }

    /// Opens the range view with its own preview voice.
    pub fn range_selector(&self, voice: PreviewVoice) -> RangeSelector {
        RangeSelector::new(voice)
    }

    /// Opens a fresh comparison view.
    pub fn workflow(&self) -> ComparisonWorkflow {
        ComparisonWorkflow::new(Arc::clone(&self.analysis), Arc::clone(&self.backend))
    }
}
