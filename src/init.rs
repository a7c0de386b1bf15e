//! One-shot asynchronous initialization tasks run when a view is mounted
//! (session check, stored-range fetch).

use std::future::Future;

use crate::error::{PitchError, Result};

#[derive(Debug, Default)]
pub enum InitTask<T> {
    #[default]
    Pending,
    Resolved(T),
    Rejected(PitchError),
}

impl<T> InitTask<T> {
    /// Awaits `fut` once and records its outcome.
    pub async fn run<F>(fut: F) -> Self
    where
        F: Future<Output = Result<T>>,
    {
        match fut.await {
            Ok(value) => InitTask::Resolved(value),
            Err(e) => InitTask::Rejected(e),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, InitTask::Pending)
    }

    /// The value, once the task has resolved.
    pub fn resolved(&self) -> Option<&T> {
        match self {
            InitTask::Resolved(v) => Some(v),
            _ => None,
        }
    }

    /// The error, if the task failed.
    pub fn rejected(&self) -> Option<&PitchError> {
        match self {
            InitTask::Rejected(e) => Some(e),
            _ => None,
        }
    }
}
