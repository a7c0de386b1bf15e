//! Named views and path-based navigation.

use crate::backend::{Backend, Session};
use crate::session::{GateOutcome, SessionGate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Login / landing view.
    Entry,
    Register,
    Dashboard,
    /// Upload-and-compare view.
    Compare,
    /// Vocal range setter.
    Range,
}

impl Route {
    pub const ALL: [Route; 5] = [
        Route::Entry,
        Route::Register,
        Route::Dashboard,
        Route::Compare,
        Route::Range,
    ];

    /// Canonical path of the view.
    pub fn path(self) -> &'static str {
        match self {
            Route::Entry => "/",
            Route::Register => "/register",
            Route::Dashboard => "/dashboard",
            Route::Compare => "/compare",
            Route::Range => "/range",
        }
    }

    /// Parses a path. Matching ignores case, surrounding whitespace and a
    /// trailing slash. Legacy page names are accepted as aliases.
    pub fn from_path(path: &str) -> Option<Route> {
        let trimmed = path.trim();
        let normalized = trimmed.trim_end_matches('/').to_ascii_lowercase();
        match normalized.as_str() {
            "" | "/login" => Some(Route::Entry),
            "/register" => Some(Route::Register),
            "/dashboard" => Some(Route::Dashboard),
            "/compare" | "/ui_page2" => Some(Route::Compare),
            "/range" | "/ui_page3" => Some(Route::Range),
            _ => None,
        }
    }

    /// Whether the view sits behind the session gate.
    pub fn requires_session(self) -> bool {
        matches!(self, Route::Dashboard | Route::Compare | Route::Range)
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

/// Result of navigating to a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Show the view. Protected views carry the session that unlocked them.
    Render(Route, Option<Session>),
    Redirect(Route),
    NotFound,
}

/// Resolves `path` to a view, running the session gate for protected views.
pub async fn navigate(path: &str, backend: &dyn Backend) -> Navigation {
    let Some(route) = Route::from_path(path) else {
        return Navigation::NotFound;
    };
    if !route.requires_session() {
        return Navigation::Render(route, None);
    }
    let mut gate = SessionGate::new();
    gate.check(backend).await;
    match gate.render(|session| session.clone()) {
        GateOutcome::Render(session) => Navigation::Render(route, Some(session)),
        GateOutcome::Redirect(to) => Navigation::Redirect(to),
        // check() always resolves before rendering
        GateOutcome::Loading => Navigation::Redirect(Route::Entry),
    }
}
