//! Path layout of the games directory.
//!
//! # Directory Structure
//!
//! ```text
//! ~/.ifturn/games/             # Games root (IF_GAMES_DIR)
//! └── zork/                    # One directory per sanitized game id
//!     ├── game.z5              # The story file
//!     ├── metadata.json        # Turn metadata (generation, input mode, layout)
//!     ├── .session.lock        # Cross-process turn lock
//!     ├── journal.jsonl        # Owned by other collaborators; never touched here
//!     └── state/
//!         └── game-88-840726-a129.state
//! ```

use std::path::{Path, PathBuf};

/// Name of the cross-process lock file inside a game directory.
pub const SESSION_LOCK_FILE: &str = ".session.lock";
/// Prefix of the per-turn staging directories inside a game directory.
pub const STAGING_PREFIX: &str = ".turn-";

/// Maps a game id to a safe directory name.
///
/// Lowercases, then replaces every character outside `[a-z0-9_-]` with `_`.
pub fn sanitize_game_id(game_id: &str) -> String {
    game_id
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Resolves per-game paths under one games root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfPaths {
    games_dir: PathBuf,
}

impl IfPaths {
    pub fn new(games_dir: impl Into<PathBuf>) -> Self {
        Self {
            games_dir: games_dir.into(),
        }
    }

    /// `~/.ifturn/games`, or a relative `.ifturn/games` when there is no home directory.
    pub fn default_games_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_default()
            .join(".ifturn")
            .join("games")
    }

    pub fn games_dir(&self) -> &Path {
        &self.games_dir
    }

    pub fn game_dir(&self, game_id: &str) -> PathBuf {
        self.games_dir.join(sanitize_game_id(game_id))
    }

    pub fn session_lock_file(game_dir: &Path) -> PathBuf {
        game_dir.join(SESSION_LOCK_FILE)
    }
}
