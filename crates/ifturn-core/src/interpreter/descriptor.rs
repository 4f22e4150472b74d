//! Interpreter kinds and the per-turn invocation they need.

use super::GameFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strum::{Display, EnumIter, EnumString};

/// The two supported virtual machine families.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
pub enum InterpreterKind {
    #[strum(serialize = "glulx-vm")]
    #[serde(rename = "glulx-vm")]
    Glulx,
    #[strum(serialize = "z-machine-vm")]
    #[serde(rename = "z-machine-vm")]
    ZMachine,
}

impl InterpreterKind {
    /// Executable name looked up on disk.
    pub fn binary_name(&self) -> &'static str {
        match self {
            InterpreterKind::Glulx => "glulxe",
            InterpreterKind::ZMachine => "bocfel",
        }
    }

    /// Environment variable that overrides the binary location.
    pub fn binary_env_var(&self) -> &'static str {
        match self {
            InterpreterKind::Glulx => "IF_GLULXE_PATH",
            InterpreterKind::ZMachine => "IF_BOCFEL_PATH",
        }
    }
}

/// How a kind names its persisted state file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateFileNaming {
    /// One fixed name per game directory.
    Fixed { name: String },
    /// Derived from the story's identity, so several variants can share a directory.
    StoryId { stem: String, story_id: String },
}

impl StateFileNaming {
    const EXTENSION: &'static str = "state";

    pub fn file_name(&self) -> String {
        match self {
            StateFileNaming::Fixed { name } => format!("{}.{}", name, Self::EXTENSION),
            StateFileNaming::StoryId { stem, story_id } => {
                format!("{}-{}.{}", stem, story_id, Self::EXTENSION)
            }
        }
    }
}

/// Everything needed to run one turn of a particular game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterDescriptor {
    pub kind: InterpreterKind,
    pub format: GameFormat,
    pub binary: PathBuf,
    pub state_file: StateFileNaming,
}

impl InterpreterDescriptor {
    /// Environment variable through which bocfel learns its autosave directory.
    pub const BOCFEL_AUTOSAVE_ENV: &'static str = "BOCFEL_AUTOSAVE_DIRECTORY";

    /// Builds the single-turn command line for one turn.
    ///
    /// `autosave_dir` is the staging directory holding the restored state (if
    /// any) and receiving the new autosave.
    pub fn invocation(
        &self,
        game_file: &Path,
        autosave_dir: &Path,
        restoring: bool,
    ) -> Invocation {
        let mut args: Vec<String> = vec!["-singleturn".to_string()];
        let mut env = Vec::new();
        match self.kind {
            InterpreterKind::Glulx => {
                args.push("--autosave".to_string());
                args.push("--autodir".to_string());
                args.push(autosave_dir.to_string_lossy().into_owned());
                if restoring {
                    args.push("--autorestore".to_string());
                }
            }
            InterpreterKind::ZMachine => {
                // bocfel restores on its own when an autosave is present.
                args.push("-fm".to_string());
                env.push((
                    Self::BOCFEL_AUTOSAVE_ENV.to_string(),
                    autosave_dir.to_string_lossy().into_owned(),
                ));
            }
        }
        args.push(game_file.to_string_lossy().into_owned());

        Invocation {
            program: self.binary.clone(),
            args,
            env,
            cwd: game_file.parent().map(Path::to_path_buf),
        }
    }

    /// Whether a file left in the staging directory is this kind's primary autosave.
    pub fn is_primary_autosave(&self, file_name: &str, game_stem: &str) -> bool {
        match self.kind {
            InterpreterKind::Glulx => file_name == "autosave.json",
            InterpreterKind::ZMachine => {
                file_name.starts_with(&format!("{}-", game_stem)) && file_name.ends_with(".json")
            }
        }
    }
}

/// A fully specified subprocess launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
}
