//! Audible note preview for keyboard views.
//!
//! Each keyboard view owns exactly one [`PreviewVoice`], created when the view
//! is mounted and dropped with it. A new key press replaces whatever note is
//! currently sounding; nothing is queued. Playback failures are logged and
//! swallowed so they never interfere with range selection.

use tracing::{debug, warn};

use crate::error::{PitchError, Result};
use crate::keyboard::Key;

/// Something that can sound a single note.
pub trait NotePlayer: Send {
    fn play(&mut self, key: &Key) -> Result<()>;
}

/// Player that reports each note through the log instead of a sound device.
#[derive(Debug, Default)]
pub struct LogPlayer;

impl NotePlayer for LogPlayer {
    fn play(&mut self, key: &Key) -> Result<()> {
        debug!(note = %key.id, frequency_hz = key.frequency(), "preview note");
        Ok(())
    }
}

/// Player that does nothing.
#[derive(Debug, Default)]
pub struct SilentPlayer;

impl NotePlayer for SilentPlayer {
    fn play(&mut self, _key: &Key) -> Result<()> {
        Ok(())
    }
}

/// The single preview instance of one keyboard view.
pub struct PreviewVoice {
    player: Box<dyn NotePlayer>,
    sounding: Option<String>,
    failures: u32,
}

impl PreviewVoice {
    /// A voice backed by `player`.
    pub fn new(player: Box<dyn NotePlayer>) -> Self {
        Self {
            player,
            sounding: None,
            failures: 0,
        }
    }

    /// A voice that plays nothing.
    pub fn silent() -> Self {
        Self::new(Box::new(SilentPlayer))
    }

    /// Fire-and-forget preview of `key`. Last key pressed wins.
    pub fn trigger(&mut self, key: &Key) {
        if let Some(prev) = self.sounding.replace(key.id.clone()) {
            if prev != key.id {
                debug!(replaced = %prev, note = %key.id, "preview note replaced");
            }
        }
        if let Err(e) = self.player.play(key) {
            self.failures = self.failures.saturating_add(1);
            let e = match e {
                PitchError::Playback(_) => e,
                other => PitchError::Playback(other.to_string()),
            };
            warn!(error = %e, note = %key.id, "preview playback failed, ignoring");
        }
    }

    /// Id of the most recently triggered note.
    pub fn sounding(&self) -> Option<&str> {
        self.sounding.as_deref()
    }

    /// Number of swallowed playback failures.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

impl std::fmt::Debug for PreviewVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewVoice")
            .field("sounding", &self.sounding)
            .field("failures", &self.failures)
            .finish()
    }
}

impl Drop for PreviewVoice {
    fn drop(&mut self) {
        debug!(sounding = ?self.sounding, "preview voice released");
    }
}
