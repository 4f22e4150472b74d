//! Error types for the turn bridge.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Every way a turn can fail.
///
/// All variants leave the persisted game state exactly as it was before the
/// turn began. Nothing here is retried automatically: a retried turn could
/// re-send a command against state the caller has not seen yet.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TurnError {
    /// The game file's extension or container is not a known story format.
    #[error("Unsupported game format: {path} ({reason})")]
    UnsupportedFormat { path: String, reason: String },

    /// No game directory or game file exists for the requested id.
    #[error("Game not found: '{game}'")]
    GameNotFound { game: String },

    /// The interpreter binary for a kind could not be resolved or executed.
    #[error("Configuration error for {interpreter}: {message}")]
    Configuration {
        interpreter: String,
        message: String,
    },

    /// The interpreter process could not be started.
    #[error("Failed to launch interpreter {binary}: {message}")]
    InterpreterLaunch { binary: String, message: String },

    /// The interpreter did not finish within the turn timeout and was killed.
    #[error("Interpreter timed out after {}s and was terminated", .timeout.as_secs_f64())]
    InterpreterTimeout { timeout: Duration },

    /// The interpreter exited with a non-zero status or was killed by a signal.
    #[error("Interpreter failed (exit code {code:?}): {stderr}")]
    InterpreterCrash { code: Option<i32>, stderr: String },

    /// The interpreter's output did not follow the RemGlk protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The caller supplied a key name the character encoder refuses.
    #[error("Invalid key token '{token}': {reason}")]
    InvalidKeyToken { token: String, reason: String },

    /// Persisted state could not be read back.
    #[error("Saved state is corrupt: {0}")]
    StateCorrupt(String),

    /// The caller expected a different generation than the one on disk.
    #[error("Stale state: expected generation {expected}, found {found}")]
    GenerationMismatch { expected: u64, found: u64 },

    /// The input event does not fit what the game is waiting for.
    #[error("Input mismatch: {0}")]
    InputMismatch(String),

    /// The game has ended; only a reset can start it again.
    #[error("The game has ended. Reset it to play again.")]
    GameOver,

    /// The caller cancelled the turn; the interpreter was terminated.
    #[error("Turn cancelled")]
    Cancelled,

    /// Filesystem failure outside the self-healing load path.
    #[error("IO error: {message}")]
    Io { message: String },
}

impl TurnError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    pub fn unsupported_format(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn game_not_found(game: impl Into<String>) -> Self {
        Self::GameNotFound { game: game.into() }
    }

    pub fn configuration(interpreter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            interpreter: interpreter.into(),
            message: message.into(),
        }
    }

    pub fn launch(binary: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InterpreterLaunch {
            binary: binary.into(),
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn invalid_key(token: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKeyToken {
            token: token.into(),
            reason: reason.into(),
        }
    }

    pub fn state_corrupt(message: impl Into<String>) -> Self {
        Self::StateCorrupt(message.into())
    }

    pub fn input_mismatch(message: impl Into<String>) -> Self {
        Self::InputMismatch(message.into())
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::InterpreterTimeout { .. })
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Errors caused by the caller's request rather than the interpreter or disk.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidKeyToken { .. }
                | Self::InputMismatch(_)
                | Self::GenerationMismatch { .. }
                | Self::GameOver
                | Self::GameNotFound { .. }
        )
    }

    /// Errors raised after a subprocess was started.
    pub fn is_interpreter_failure(&self) -> bool {
        matches!(
            self,
            Self::InterpreterLaunch { .. }
                | Self::InterpreterTimeout { .. }
                | Self::InterpreterCrash { .. }
                | Self::Protocol(_)
        )
    }
}

impl From<std::io::Error> for TurnError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

/// A non-fatal condition reported alongside a successful turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnWarning {
    /// Persisted state was unreadable and the game restarted from the beginning.
    StateCorrupt { reason: String },
    /// A command arrived for a game with no saved state; the game was started instead.
    NewGameStarted { ignored_command: Option<String> },
}

impl std::fmt::Display for TurnWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnWarning::StateCorrupt { reason } => {
                write!(f, "Saved state was unreadable ({}); the game restarted.", reason)
            }
            TurnWarning::NewGameStarted {
                ignored_command: Some(command),
            } => write!(
                f,
                "No saved state; started a new game and ignored '{}'.",
                command
            ),
            TurnWarning::NewGameStarted {
                ignored_command: None,
            } => write!(f, "No saved state; started a new game."),
        }
    }
}

/// A type alias for `Result<T, TurnError>`.
pub type Result<T> = std::result::Result<T, TurnError>;
