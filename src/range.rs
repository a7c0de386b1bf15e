//! # Range Selector
//!
//! Lets the user declare their vocal range on the virtual keyboard. Arming
//! "lowest" or "highest" makes the next key press become that bound; a press
//! while idle only previews the note. Confirming writes the pair to the
//! user's single `pitch` row and clears the local selection.
//!
//! ```text
//!            arm_low                 key_pressed
//!   Idle ─────────────▶ AwaitingLow ────────────▶ Idle (low = key)
//!   Idle ─────────────▶ AwaitingHigh ───────────▶ Idle (high = key)
//!            arm_high                key_pressed
//! ```

use tracing::{debug, info, warn};

use crate::backend::{Backend, StoredRange};
use crate::error::{PitchError, Result};
use crate::init::InitTask;
use crate::keyboard::Key;
use crate::preview::PreviewVoice;

/// What the next key press does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorMode {
    Idle,
    AwaitingLow,
    AwaitingHigh,
}

/// Per-view range selection. Created empty on every visit.
#[derive(Debug)]
pub struct RangeSelector {
    mode: SelectorMode,
    low: Option<Key>,
    high: Option<Key>,
    voice: PreviewVoice,
    stored: InitTask<Option<StoredRange>>,
}

impl RangeSelector {
    /// A fresh, empty selector owning the view's preview voice.
    pub fn new(voice: PreviewVoice) -> Self {
        Self {
            mode: SelectorMode::Idle,
            low: None,
            high: None,
            voice,
            stored: InitTask::Pending,
        }
    }

    /// Which bound, if any, the next key press will set.
    pub fn mode(&self) -> SelectorMode {
        self.mode
    }

    /// Id of the chosen lowest key (`"A2"`).
    pub fn low_note(&self) -> Option<&str> {
        self.low.as_ref().map(|k| k.id.as_str())
    }

    /// Id of the chosen highest key.
    pub fn high_note(&self) -> Option<&str> {
        self.high.as_ref().map(|k| k.id.as_str())
    }

    /// The chosen lowest key.
    pub fn low_key(&self) -> Option<&Key> {
        self.low.as_ref()
    }

    /// The chosen highest key.
    pub fn high_key(&self) -> Option<&Key> {
        self.high.as_ref()
    }

    /// The preview voice owned by this view.
    pub fn voice(&self) -> &PreviewVoice {
        &self.voice
    }

    /// The on-mount fetch of the stored range.
    pub fn stored(&self) -> &InitTask<Option<StoredRange>> {
        &self.stored
    }

    /// Next key press becomes the lowest bound. The current bound is kept
    /// until then.
    pub fn arm_low(&mut self) {
        self.mode = SelectorMode::AwaitingLow;
    }

    /// Next key press becomes the highest bound.
    pub fn arm_high(&mut self) {
        self.mode = SelectorMode::AwaitingHigh;
    }

    /// Handles a key press: always previews the note, then records it as the
    /// armed bound, if any.
    pub fn key_pressed(&mut self, key: &Key) {
        self.voice.trigger(key);
        match self.mode {
            SelectorMode::AwaitingLow => {
                debug!(note = %key.id, "lowest note selected");
                self.low = Some(key.clone());
                self.mode = SelectorMode::Idle;
            }
            SelectorMode::AwaitingHigh => {
                debug!(note = %key.id, "highest note selected");
                self.high = Some(key.clone());
                self.mode = SelectorMode::Idle;
            }
            SelectorMode::Idle => {}
        }
    }

    /// Confirm is only offered once both bounds are chosen.
    pub fn can_confirm(&self) -> bool {
        self.low.is_some() && self.high.is_some()
    }

    /// Loads the stored range of the signed-in user for display. The
    /// selection itself stays empty until keys are pressed.
    pub async fn load(&mut self, backend: &dyn Backend) -> &InitTask<Option<StoredRange>> {
        self.stored = InitTask::run(async {
            match backend.current_session().await? {
                Some(session) => backend.fetch_range(&session.user_id).await,
                None => Ok(None),
            }
        })
        .await;

        match &self.stored {
            InitTask::Resolved(Some(range)) => {
                debug!(low = %range.low_sound, high = %range.high_sound, "stored range loaded")
            }
            InitTask::Rejected(e) => warn!(error = %e, "could not load stored range"),
            _ => {}
        }
        &self.stored
    }

    /// Persists both bounds in display form for the signed-in user, then
    /// clears the selection. On any failure the selection is left untouched.
    pub async fn confirm(&mut self, backend: &dyn Backend) -> Result<StoredRange> {
        let (low, high) = match (&self.low, &self.high) {
            (Some(low), Some(high)) => (low, high),
            (None, _) => return Err(PitchError::validation("choose your lowest note first")),
            (_, None) => return Err(PitchError::validation("choose your highest note first")),
        };
        let range = StoredRange {
            high_sound: high.display_name(),
            low_sound: low.display_name(),
        };

        let session = backend
            .current_session()
            .await?
            .ok_or_else(|| PitchError::auth("sign in to save your range"))?;

        backend.upsert_range(&session.user_id, &range).await.map_err(|e| match e {
            PitchError::Persistence(_) => e,
            other => PitchError::persistence(other.to_string()),
        })?;

        info!(user_id = %session.user_id, low = %range.low_sound, high = %range.high_sound, "range saved");
        self.low = None;
        self.high = None;
        self.mode = SelectorMode::Idle;
        Ok(range)
    }
}
