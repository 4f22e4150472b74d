//! State repository trait.
//!
//! Defines the interface for per-game state persistence.

use super::model::{AutosaveBlob, GameSession, TurnMetadata};
use crate::error::{Result, TurnWarning};
use async_trait::async_trait;

/// What `load` found on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedState {
    pub blob: Option<AutosaveBlob>,
    pub metadata: Option<TurnMetadata>,
    /// Set when stored state existed but could not be used.
    pub warning: Option<TurnWarning>,
}

impl LoadedState {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn corrupt(reason: impl Into<String>) -> Self {
        Self {
            blob: None,
            metadata: None,
            warning: Some(TurnWarning::StateCorrupt {
                reason: reason.into(),
            }),
        }
    }

    pub fn has_state(&self) -> bool {
        self.metadata.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.metadata.as_ref().map_or(0, |m| m.generation)
    }
}

/// An abstract repository for one game's last committed state.
///
/// This is a last-state store: each `save` replaces the previous blob and
/// metadata, and no history is kept.
///
/// # Implementation Notes
///
/// Implementations must:
/// - Make `save` atomic, so a crash leaves either the old or the new state
/// - Never fail `load` on missing or unreadable state; report a warning instead
/// - Leave files owned by other collaborators (journals, the game file) alone on `reset`
#[async_trait]
pub trait StateRepository: Send + Sync {
    /// Loads the last committed state of a game.
    async fn load(&self, session: &GameSession) -> LoadedState;

    /// Commits a new state, replacing the previous one.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: the state is durable on disk
    /// - `Err(_)`: nothing was replaced
    async fn save(
        &self,
        session: &GameSession,
        blob: &AutosaveBlob,
        metadata: &TurnMetadata,
    ) -> Result<()>;

    /// Clears the stored blob and metadata.
    async fn reset(&self, session: &GameSession) -> Result<()>;

    /// Reads the current metadata only, for status queries.
    async fn metadata(&self, session: &GameSession) -> Option<TurnMetadata> {
        self.load(session).await.metadata
    }
}
