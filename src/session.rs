//! # Session Gate
//!
//! Blocks protected content until the session check resolves. The check runs
//! once per gate; there is no polling and no refresh on expiry. Protected
//! content is only ever produced after the gate resolved to `Authenticated`,
//! so an anonymous visitor never sees it, not even briefly.

use tracing::{debug, warn};

use crate::backend::{Backend, Session};
use crate::init::InitTask;
use crate::routes::Route;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    Checking,
    Authenticated(Session),
    Anonymous,
}

/// What a protected view shows for the current gate state.
#[derive(Debug, PartialEq, Eq)]
pub enum GateOutcome<T> {
    /// Still checking; show a loading indicator only.
    Loading,
    Render(T),
    Redirect(Route),
}

#[derive(Debug)]
pub struct SessionGate {
    state: GateState,
}

impl Default for SessionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionGate {
    /// A gate that has not checked yet.
    pub fn new() -> Self {
        Self {
            state: GateState::Checking,
        }
    }

    /// Current gate state.
    pub fn state(&self) -> &GateState {
        &self.state
    }

    /// The confirmed session, once authenticated.
    pub fn session(&self) -> Option<&Session> {
        match &self.state {
            GateState::Authenticated(s) => Some(s),
            _ => None,
        }
    }

    /// Queries the backend for the current session. Only the first call
    /// queries; later calls return the resolved state unchanged.
    pub async fn check(&mut self, backend: &dyn Backend) -> &GateState {
        if self.state != GateState::Checking {
            return &self.state;
        }
        self.state = match InitTask::run(backend.current_session()).await {
            InitTask::Resolved(Some(session)) => {
                debug!(user_id = %session.user_id, "session gate: authenticated");
                GateState::Authenticated(session)
            }
            InitTask::Resolved(None) => {
                debug!("session gate: anonymous");
                GateState::Anonymous
            }
            InitTask::Rejected(e) => {
                warn!(error = %e, "session lookup failed, treating visitor as anonymous");
                GateState::Anonymous
            }
            InitTask::Pending => GateState::Checking,
        };
        &self.state
    }

    /// Produces protected content only for an authenticated session.
    pub fn render<T>(&self, content: impl FnOnce(&Session) -> T) -> GateOutcome<T> {
        match &self.state {
            GateState::Checking => GateOutcome::Loading,
            GateState::Authenticated(session) => GateOutcome::Render(content(session)),
            GateState::Anonymous => GateOutcome::Redirect(Route::Entry),
        }
    }
}
