//! # pitch-finder
//!
//! Compares an original track against a cover, reports the key difference
//! between them and recommends a key shift that fits the user's stored vocal
//! range. The library holds the page-level state machines (range selector,
//! comparison workflow, session gate) behind two seams: a [`Backend`] for
//! accounts and persistence and an [`AnalysisService`] for the external
//! `POST /separate` endpoint. The `pitch-finder` binary is a command-line
//! front end over them.

pub mod analysis;
pub mod app;
pub mod backend;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod init;
pub mod keyboard;
pub mod preview;
pub mod range;
pub mod routes;
pub mod session;
pub mod workflow;

pub use analysis::{AnalysisClient, AnalysisService, SeparateRequest, SeparateResponse};
pub use app::App;
pub use backend::{Backend, MusicRecord, MusicRow, Session, SqliteBackend, StoredRange};
pub use config::Config;
pub use error::{PitchError, Result};
pub use init::InitTask;
pub use keyboard::{keyboard, layout_of, Key, KeyKind, OctaveBand};
pub use range::{RangeSelector, SelectorMode};
pub use routes::{navigate, Navigation, Route};
pub use session::{GateOutcome, GateState, SessionGate};
pub use workflow::{ComparisonRequest, ComparisonWorkflow, Slot, Submission, WorkflowState};
