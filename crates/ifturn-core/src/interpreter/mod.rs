//! Interpreter selection: story formats, interpreter kinds and descriptors.

mod descriptor;
mod format;

pub use descriptor::{InterpreterDescriptor, InterpreterKind, Invocation, StateFileNaming};
pub use format::{BlorbExec, GameFormat, ZCodeHeader, blorb_executable};

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Supplies interpreter binaries by kind.
///
/// Implementations validate that the binary exists and is executable; the
/// router calls this lazily, the first time a kind is actually needed.
pub trait BinaryResolver: Send + Sync {
    fn resolve(&self, kind: InterpreterKind) -> Result<PathBuf>;
}

/// What a game file is, independent of any interpreter binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameClassification {
    pub format: GameFormat,
    pub state_file: StateFileNaming,
}

impl GameClassification {
    pub fn kind(&self) -> InterpreterKind {
        self.format.interpreter_kind()
    }
}

/// Maps a game file to the interpreter that runs it.
#[async_trait]
pub trait InterpreterRouter: Send + Sync {
    /// Classifies `game_file` and names its state file.
    ///
    /// Never looks up interpreter binaries, so it works for games whose
    /// interpreter is not installed.
    async fn classify(&self, game_file: &Path) -> Result<GameClassification>;

    /// Picks the interpreter for `game_file`.
    ///
    /// Fails with `UnsupportedFormat` before any binary lookup when the file
    /// is not a known story format.
    async fn resolve(&self, game_file: &Path) -> Result<InterpreterDescriptor>;

    /// Finds the game file inside a game directory, if any.
    ///
    /// Known story extensions are preferred; a `game.*` file with any other
    /// extension is still returned so that `resolve` can reject it.
    async fn find_game_file(&self, game_dir: &Path) -> Option<PathBuf>;
}
