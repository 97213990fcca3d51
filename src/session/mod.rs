//! # Session Module
//!
//! State bridging the multi-step `/play` interaction:
//! search → select → follow-up actions.
//!
//! Discord interactions are stateless round trips, so the candidate list, the
//! chosen track and the source platform live in a [`SessionStore`] under a
//! [`SessionKey`]. The key is embedded verbatim in every component custom id
//! (see [`custom_id`]), which lets any later event find its session without a
//! separate lookup table.
//!
//! ## Lifecycle
//!
//! ```text
//! SEARCHING ──results──▶ AWAITING_SELECTION ──select──▶ ACTIVE ──cancel/timeout/error──▶ TERMINAL
//!     │                         │                          │
//!     └─no results─▶ (no session)└─timeout/invalid/expired──┴──────────────────────────▶ TERMINAL
//! ```
//!
//! The orchestration lives in [`flow`].

pub mod custom_id;
pub mod flow;
pub mod key;

pub use custom_id::ComponentAction;
pub use flow::{
    ActionEvent, ActionOutcome, FlowError, FlowSettings, PlayFlow, SearchResults, SelectionEvent,
};
pub use key::SessionKey;

use crate::{
    audio::{SearchSource, Track},
    cache::TtlCache,
};

/// Cache holding live sessions.
pub type SessionStore = TtlCache<Session>;

/// Where a cached session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingSelection,
    Active,
}

/// Cached state for one user's `/play` response.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Search results in rank order
    pub candidates: Vec<Track>,
    pub source: SearchSource,
    pub query: String,
    /// Set once the user picks a candidate
    pub selected: Option<Track>,
}

impl Session {
    pub fn new(candidates: Vec<Track>, source: SearchSource, query: String) -> Self {
        Self {
            candidates,
            source,
            query,
            selected: None,
        }
    }

    pub fn state(&self) -> SessionState {
        match self.selected {
            Some(_) => SessionState::Active,
            None => SessionState::AwaitingSelection,
        }
    }

    pub fn candidate(&self, index: usize) -> Option<&Track> {
        self.candidates.get(index)
    }
}
