//! Dashboard view: the signed-in user's comparison history.

use tracing::{debug, info};

use crate::backend::{Backend, MusicRow, Session};
use crate::error::{PitchError, Result};
use crate::workflow::UNAVAILABLE;

/// Everything the dashboard shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dashboard {
    pub session: Session,
    pub history: Vec<MusicRow>,
}

impl Dashboard {
    /// True when the user has no comparisons yet.
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

/// Loads the dashboard for the active session.
pub async fn load_dashboard(backend: &dyn Backend) -> Result<Dashboard> {
    let session = backend
        .current_session()
        .await?
        .ok_or_else(|| PitchError::auth("Please log in to see your history"))?;
    let history = backend.list_music(&session.user_id).await?;
    debug!(user_id = %session.user_id, rows = history.len(), "dashboard loaded");
    Ok(Dashboard { session, history })
}

/// Ends the active session.
pub async fn sign_out(backend: &dyn Backend) -> Result<()> {
    backend.sign_out().await?;
    info!("signed out");
    Ok(())
}

fn cell<T: ToString>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| UNAVAILABLE.to_string())
}

/// One history row as display cells, in column order.
pub fn history_cells(row: &MusicRow) -> [String; 7] {
    let r = &row.record;
    [
        r.title.clone(),
        r.original_url.clone(),
        r.cover_url.clone(),
        cell(&r.high_pitch),
        cell(&r.low_pitch),
        cell(&r.optimal_pitch),
        cell(&r.comparison_pitch),
    ]
}

pub const HISTORY_HEADERS: [&str; 7] = [
    "title",
    "original",
    "cover",
    "high",
    "low",
    "optimal",
    "comparison",
];

/// Renders the history as an aligned plain-text table.
pub fn format_history(rows: &[MusicRow]) -> String {
    let cells: Vec<[String; 7]> = rows.iter().map(history_cells).collect();
    let mut widths = HISTORY_HEADERS.map(str::len);
    for row in &cells {
        for (w, c) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(c.chars().count());
        }
    }

    let mut out = String::new();
    let mut push_line = |values: &[&str]| {
        let line: Vec<String> = values
            .iter()
            .zip(widths.iter())
            .map(|(v, &w)| format!("{v:<w$}"))
            .collect();
        out.push_str(line.join("  ").trim_end());
        out.push('\n');
    };
    push_line(&HISTORY_HEADERS);
    for row in &cells {
        let refs: Vec<&str> = row.iter().map(String::as_str).collect();
        push_line(&refs);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MusicRecord, SqliteBackend};

    fn record(user_id: &str, title: &str) -> MusicRecord {
        MusicRecord {
            profiles_id: user_id.into(),
            title: title.into(),
            original_url: "https://o".into(),
            cover_url: "https://c".into(),
            high_pitch: Some("mid2G".into()),
            low_pitch: None,
            optimal_pitch: Some(-2),
            comparison_pitch: Some(3),
        }
    }

    #[tokio::test]
    async fn requires_session() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let err = load_dashboard(&backend).await.unwrap_err();
        assert!(matches!(err, PitchError::Auth(_)));
    }

    #[tokio::test]
    async fn lists_own_history_in_order() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.sign_up("a@b.co", "secret1").await.unwrap();
        let session = backend.sign_in("a@b.co", "secret1").await.unwrap();
        backend.insert_music(&record(&session.user_id, "first")).await.unwrap();
        backend.insert_music(&record(&session.user_id, "second")).await.unwrap();

        let dash = load_dashboard(&backend).await.unwrap();
        assert_eq!(dash.session, session);
        let titles: Vec<_> = dash.history.iter().map(|r| r.record.title.as_str()).collect();
        assert_eq!(titles, ["first", "second"]);
    }

    #[tokio::test]
    async fn sign_out_ends_session() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.sign_up("a@b.co", "secret1").await.unwrap();
        backend.sign_in("a@b.co", "secret1").await.unwrap();
        sign_out(&backend).await.unwrap();
        assert!(backend.current_session().await.unwrap().is_none());
    }

    #[test]
    fn cells_show_dash_for_missing_values() {
        let row = MusicRow {
            id: 1,
            created_at: None,
            record: record("u", "song"),
        };
        let cells = history_cells(&row);
        assert_eq!(cells[3], "mid2G");
        assert_eq!(cells[4], "-");
        assert_eq!(cells[5], "-2");
        assert_eq!(cells[6], "3");
    }

    #[test]
    fn table_has_header_and_rows() {
        let rows = vec![MusicRow {
            id: 1,
            created_at: None,
            record: record("u", "song"),
        }];
        let text = format_history(&rows);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("title"));
        assert!(lines[1].starts_with("song"));
    }
}
