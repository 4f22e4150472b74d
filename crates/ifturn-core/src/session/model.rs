//! Persistent per-game state.

use crate::interpreter::{InterpreterKind, StateFileNaming};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use strum::Display;

/// Directory (inside a game directory) holding the persisted state file.
pub const STATE_DIR: &str = "state";
/// File (inside a game directory) holding the turn metadata record.
pub const METADATA_FILE: &str = "metadata.json";

/// Identifies one game's persistent state on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSession {
    pub game_id: String,
    pub game_dir: PathBuf,
    pub game_file: PathBuf,
    pub kind: InterpreterKind,
    pub state_path: PathBuf,
    pub metadata_path: PathBuf,
}

impl GameSession {
    pub fn new(
        game_id: impl Into<String>,
        game_dir: &Path,
        game_file: &Path,
        kind: InterpreterKind,
        state_file: &StateFileNaming,
    ) -> Self {
        Self {
            game_id: game_id.into(),
            game_dir: game_dir.to_path_buf(),
            game_file: game_file.to_path_buf(),
            kind,
            state_path: game_dir.join(STATE_DIR).join(state_file.file_name()),
            metadata_path: game_dir.join(METADATA_FILE),
        }
    }

    pub fn state_dir(&self) -> PathBuf {
        self.game_dir.join(STATE_DIR)
    }

    /// Game file name without extension (e.g. `game` for `game.z5`).
    pub fn game_stem(&self) -> String {
        self.game_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// The kind of input the interpreter is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    Line,
    Character,
    FilePrompt,
}

/// The interpreter's pending input request at the end of a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum InputRequest {
    Line { window: u32 },
    Character { window: u32 },
    /// The game asked for a file name (save, restore, transcript).
    FilePrompt { filemode: String, filetype: String },
}

impl InputRequest {
    pub fn mode(&self) -> InputMode {
        match self {
            InputRequest::Line { .. } => InputMode::Line,
            InputRequest::Character { .. } => InputMode::Character,
            InputRequest::FilePrompt { .. } => InputMode::FilePrompt,
        }
    }

    /// Target window, for requests bound to a window.
    pub fn window(&self) -> Option<u32> {
        match self {
            InputRequest::Line { window } | InputRequest::Character { window } => Some(*window),
            InputRequest::FilePrompt { .. } => None,
        }
    }
}

/// Summary of one window in the interpreter's layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSummary {
    pub id: u32,
    #[serde(rename = "type")]
    pub window_type: String,
    #[serde(default)]
    pub rock: u32,
}

impl WindowSummary {
    pub fn is_grid(&self) -> bool {
        self.window_type == "grid"
    }
}

/// Small record persisted beside the autosave blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnMetadata {
    /// Incremented once per committed turn; never decreases.
    pub generation: u64,
    /// The interpreter's own `gen` counter, echoed back on the next input.
    pub interpreter_gen: u64,
    /// What the interpreter waits for; `None` once the game has ended.
    pub input: Option<InputRequest>,
    pub windows: Vec<WindowSummary>,
    #[serde(default)]
    pub last_command: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl TurnMetadata {
    pub fn input_mode(&self) -> Option<InputMode> {
        self.input.as_ref().map(InputRequest::mode)
    }

    pub fn is_game_over(&self) -> bool {
        self.input.is_none()
    }

    /// Checks that the record describes a state the bridge can resume from.
    pub fn validate(&self) -> Result<(), String> {
        if self.generation == 0 {
            return Err("generation 0 is never persisted".to_string());
        }
        if let Some(window) = self.input.as_ref().and_then(InputRequest::window)
            && !self.windows.iter().any(|w| w.id == window)
        {
            return Err(format!(
                "input window {} is not in the saved window layout",
                window
            ));
        }
        Ok(())
    }
}

/// Interpreter-produced state, replayed verbatim on the next turn.
///
/// The bridge never looks inside the files; it only stores them and writes
/// them back byte-for-byte.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutosaveBlob {
    files: BTreeMap<String, Vec<u8>>,
}

impl AutosaveBlob {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, data: Vec<u8>) {
        self.files.insert(name.into(), data);
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn total_bytes(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(input: Option<InputRequest>) -> TurnMetadata {
        TurnMetadata {
            generation: 3,
            interpreter_gen: 7,
            input,
            windows: vec![WindowSummary {
                id: 22,
                window_type: "buffer".to_string(),
                rock: 201,
            }],
            last_command: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_session_paths() {
        let naming = StateFileNaming::StoryId {
            stem: "game".to_string(),
            story_id: "1-000000-0000".to_string(),
        };
        let session = GameSession::new(
            "zork",
            Path::new("/g/zork"),
            Path::new("/g/zork/game.z5"),
            InterpreterKind::ZMachine,
            &naming,
        );
        assert_eq!(
            session.state_path,
            PathBuf::from("/g/zork/state/game-1-000000-0000.state")
        );
        assert_eq!(session.metadata_path, PathBuf::from("/g/zork/metadata.json"));
        assert_eq!(session.game_stem(), "game");
    }

    #[test]
    fn test_validate_layout() {
        assert!(metadata(Some(InputRequest::Line { window: 22 })).validate().is_ok());
        assert!(metadata(Some(InputRequest::Character { window: 5 })).validate().is_err());
        assert!(metadata(None).validate().is_ok());
    }

    #[test]
    fn test_metadata_serialization() {
        let meta = metadata(Some(InputRequest::Character { window: 22 }));
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["input"]["mode"], "character");
        assert_eq!(json["windows"][0]["type"], "buffer");
        let back: TurnMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }
}
