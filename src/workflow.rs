//! # Comparison Workflow
//!
//! Drives one comparison run of an original track against a cover:
//!
//! ```text
//! Idle ─▶ Validating ─┬─▶ Failed            (empty URL, no network call)
//!                     └─▶ Submitting ─┬─▶ Succeeded
//!                                     └─▶ Failed  (service error)
//! ```
//!
//! A successful run is then appended to the user's history on a best-effort
//! basis: a failed append adds a warning next to the result but never turns
//! `Succeeded` into `Failed`. Nothing is retried.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::analysis::{AnalysisService, SeparateRequest, SeparateResponse};
use crate::backend::{Backend, MusicRecord, Session};
use crate::error::{PitchError, Result};

/// Shown in a result slot that has no value.
pub const UNAVAILABLE: &str = "-";

/// Where a comparison run currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    Validating,
    Submitting,
    Succeeded,
    Failed,
}

/// Inputs of one comparison run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComparisonRequest {
    pub original_url: String,
    pub cover_url: String,
    pub user_high_note: Option<String>,
    pub user_low_note: Option<String>,
}

impl ComparisonRequest {
    /// A request without range hints.
    pub fn new(original_url: impl Into<String>, cover_url: impl Into<String>) -> Self {
        Self {
            original_url: original_url.into(),
            cover_url: cover_url.into(),
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.original_url.trim().is_empty() {
            return Err(PitchError::validation("enter the URL of the original track"));
        }
        if self.cover_url.trim().is_empty() {
            return Err(PitchError::validation("enter the URL of the cover track"));
        }
        Ok(())
    }
}

/// One displayed result value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Value(String),
    Unavailable,
}

impl Slot {
    /// The shown value, `None` when the slot is unavailable.
    pub fn value(&self) -> Option<&str> {
        match self {
            Slot::Value(v) => Some(v),
            Slot::Unavailable => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Slot::Unavailable)
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::Value(v) => f.write_str(v),
            Slot::Unavailable => f.write_str(UNAVAILABLE),
        }
    }
}

/// What a successful run displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub key_difference: Slot,
    pub recommended_key: Slot,
    /// The history row written for this run, if one was written.
    pub record: Option<MusicRecord>,
    /// Additive warning shown alongside the result (history append failed).
    pub warning: Option<String>,
}

/// Builds the two display slots. Without a recommended shift neither slot
/// is shown.
pub fn result_slots(response: &SeparateResponse) -> (Slot, Slot) {
    match response.user_key_shift {
        Some(shift) => {
            let difference = response
                .key_difference
                .map(|d| Slot::Value(d.to_string()))
                .unwrap_or(Slot::Unavailable);
            (difference, Slot::Value(shift.to_string()))
        }
        None => (Slot::Unavailable, Slot::Unavailable),
    }
}

/// Builds the history row for a run. `None` when the service sent no title.
pub fn history_record(
    session: &Session,
    request: &ComparisonRequest,
    response: &SeparateResponse,
) -> Option<MusicRecord> {
    let original = response.original.as_ref()?;
    let title = original.title.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
    Some(MusicRecord {
        profiles_id: session.user_id.clone(),
        title: title.to_string(),
        original_url: request.original_url.clone(),
        cover_url: request.cover_url.clone(),
        high_pitch: original.max_note.clone(),
        low_pitch: original.min_note.clone(),
        optimal_pitch: response.user_key_shift,
        comparison_pitch: response.key_difference,
    })
}

/// One comparison view: at most one submission in flight at a time.
pub struct ComparisonWorkflow {
    analysis: Arc<dyn AnalysisService>,
    backend: Arc<dyn Backend>,
    state: WorkflowState,
    last: Option<Submission>,
    error: Option<String>,
}

impl ComparisonWorkflow {
    /// An idle workflow sharing the application's analysis service and backend.
    pub fn new(analysis: Arc<dyn AnalysisService>, backend: Arc<dyn Backend>) -> Self {
        Self {
            analysis,
            backend,
            state: WorkflowState::Idle,
            last: None,
            error: None,
        }
    }

    /// Current state of the run.
    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// The submit control is disabled while a submission is in flight.
    pub fn can_submit(&self) -> bool {
        self.state != WorkflowState::Submitting
    }

    /// Result of the last successful run.
    pub fn last(&self) -> Option<&Submission> {
        self.last.as_ref()
    }

    /// Message of the last failed run.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns a finished workflow to `Idle`, clearing result and error.
    pub fn reset(&mut self) {
        self.state = WorkflowState::Idle;
        self.last = None;
        self.error = None;
    }

    fn fail(&mut self, err: PitchError) -> PitchError {
        self.state = WorkflowState::Failed;
        self.last = None;
        self.error = Some(err.to_string());
        err
    }

    /// Runs one comparison.
    pub async fn submit(&mut self, request: ComparisonRequest) -> Result<Submission> {
        if !self.can_submit() {
            return Err(PitchError::Busy);
        }
        self.state = WorkflowState::Validating;
        self.error = None;
        if let Err(e) = request.validate() {
            debug!(error = %e, "comparison request rejected");
            return Err(self.fail(e));
        }

        let session = self.current_session().await;
        let request = self.enrich(request, session.as_ref()).await;
        let wire = SeparateRequest {
            original_url: request.original_url.trim().to_string(),
            cover_url: request.cover_url.trim().to_string(),
            user_high_note: request.user_high_note.clone(),
            user_low_note: request.user_low_note.clone(),
        };

        self.state = WorkflowState::Submitting;
        info!(original = %wire.original_url, cover = %wire.cover_url, "submitting comparison");
        let outcome = self.analysis.separate(&wire).await;
        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "comparison failed");
                return Err(self.fail(e));
            }
        };

        let (key_difference, recommended_key) = result_slots(&response);
        self.state = WorkflowState::Succeeded;
        info!(key_difference = %key_difference, recommended_key = %recommended_key, "comparison succeeded");

        let mut submission = Submission {
            key_difference,
            recommended_key,
            record: None,
            warning: None,
        };
        self.append_history(&mut submission, session.as_ref(), &request, &response)
            .await;
        self.last = Some(submission.clone());
        Ok(submission)
    }

    async fn current_session(&self) -> Option<Session> {
        match self.backend.current_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "session lookup failed, continuing without identity");
                None
            }
        }
    }

    /// Adds the user's stored range as high/low hints unless the caller
    /// already supplied them.
    async fn enrich(
        &self,
        mut request: ComparisonRequest,
        session: Option<&Session>,
    ) -> ComparisonRequest {
        if request.user_high_note.is_some() || request.user_low_note.is_some() {
            return request;
        }
        let Some(session) = session else {
            return request;
        };
        match self.backend.fetch_range(&session.user_id).await {
            Ok(Some(range)) => {
                debug!(high = %range.high_sound, low = %range.low_sound, "using stored range as hints");
                request.user_high_note = Some(range.high_sound);
                request.user_low_note = Some(range.low_sound);
            }
            Ok(None) => debug!("no stored range, submitting without hints"),
            Err(e) => warn!(error = %e, "could not read stored range, submitting without hints"),
        }
        request
    }

    async fn append_history(
        &self,
        submission: &mut Submission,
        session: Option<&Session>,
        request: &ComparisonRequest,
        response: &SeparateResponse,
    ) {
        let Some(session) = session else {
            info!("not signed in, result not added to history");
            return;
        };
        let Some(record) = history_record(session, request, response) else {
            info!("analysis returned no title, result not added to history");
            return;
        };
        match self.backend.insert_music(&record).await {
            Ok(()) => {
                debug!(title = %record.title, "result added to history");
                submission.record = Some(record);
            }
            Err(e) => {
                warn!(error = %e, "could not add result to history");
                submission.warning = Some(format!("The result could not be saved to your history: {e}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::TrackAnalysis;

    fn response(shift: Option<i32>) -> SeparateResponse {
        SeparateResponse {
            key_difference: Some(2),
            user_key_shift: shift,
            original: Some(TrackAnalysis {
                title: Some("T".into()),
                max_note: Some("C5".into()),
                min_note: Some("A2".into()),
                ..Default::default()
            }),
            cover: None,
        }
    }

    fn session() -> Session {
        Session {
            user_id: "u-1".into(),
            email: "a@b.co".into(),
            access_token: "t".into(),
        }
    }

    #[test]
    fn slots_with_shift() {
        let (diff, rec) = result_slots(&response(Some(-1)));
        assert_eq!(diff, Slot::Value("2".into()));
        assert_eq!(rec, Slot::Value("-1".into()));
    }

    #[test]
    fn slots_without_shift_are_unavailable() {
        let (diff, rec) = result_slots(&response(None));
        assert!(diff.is_unavailable());
        assert!(rec.is_unavailable());
        assert_eq!(rec.to_string(), UNAVAILABLE);
    }

    #[test]
    fn request_validation() {
        assert!(ComparisonRequest::new("", "x").validate().is_err());
        assert!(ComparisonRequest::new("x", "  ").validate().is_err());
        assert!(ComparisonRequest::new("x", "y").validate().is_ok());
    }

    #[test]
    fn history_record_maps_columns() {
        let req = ComparisonRequest::new("https://o", "https://c");
        let rec = history_record(&session(), &req, &response(Some(-1))).unwrap();
        assert_eq!(rec.profiles_id, "u-1");
        assert_eq!(rec.title, "T");
        assert_eq!(rec.high_pitch.as_deref(), Some("C5"));
        assert_eq!(rec.low_pitch.as_deref(), Some("A2"));
        assert_eq!(rec.optimal_pitch, Some(-1));
        assert_eq!(rec.comparison_pitch, Some(2));
    }

    #[test]
    fn history_record_needs_title() {
        let req = ComparisonRequest::new("o", "c");
        let mut resp = response(Some(0));
        resp.original.as_mut().unwrap().title = Some("   ".into());
        assert!(history_record(&session(), &req, &resp).is_none());
        resp.original = None;
        assert!(history_record(&session(), &req, &resp).is_none());
    }
}
