//! Session domain module.
//!
//! - `model`: per-game state (`GameSession`, `TurnMetadata`, `AutosaveBlob`)
//! - `event`: turn input (`TurnInputEvent`, `TurnRequest`)
//! - `repository`: the `StateRepository` persistence trait

mod event;
mod model;
mod repository;

pub use event::{TurnInputEvent, TurnRequest};
pub use model::{
    AutosaveBlob, GameSession, InputMode, InputRequest, METADATA_FILE, STATE_DIR, TurnMetadata,
    WindowSummary,
};
pub use repository::{LoadedState, StateRepository};

use serde::{Deserialize, Serialize};
use strum::Display;

/// Steps of a single turn, in order.
///
/// `Errored` can be entered from any step; the persisted state is unchanged
/// whenever a turn ends there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Idle,
    Resolving,
    Loading,
    Spawning,
    Exchanging,
    Decoding,
    Persisting,
    Done,
    Errored,
}

impl TurnPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnPhase::Done | TurnPhase::Errored)
    }
}
