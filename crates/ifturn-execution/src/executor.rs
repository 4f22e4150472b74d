//! The turn executor.
//!
//! `TurnExecutor` runs one interpreter turn per call:
//! resolve the interpreter, load the last committed state, spawn a one-shot
//! interpreter, exchange one RemGlk document each way, and commit the new
//! state. A turn either commits a complete new state or leaves the stored one
//! untouched.

use crate::locks::SessionLocks;
use crate::process::{DEFAULT_TURN_TIMEOUT, InterpreterRunner, ProcessRunner};
use chrono::Utc;
use ifturn_core::interpreter::{InterpreterKind, InterpreterRouter};
use ifturn_core::protocol::{RenderedOutput, RestoredContext, decode_output, encode_input, render};
use ifturn_core::session::{
    AutosaveBlob, GameSession, InputMode, InputRequest, StateRepository, TurnInputEvent,
    TurnMetadata, TurnPhase, TurnRequest,
};
use ifturn_core::{Result, TurnError, TurnWarning};
use ifturn_infrastructure::paths::STAGING_PREFIX;
use ifturn_infrastructure::storage::FileLock;
use ifturn_infrastructure::{
    BridgeConfig, FileInterpreterRouter, FileStateStore, IfPaths, InterpreterLocator,
    sanitize_game_id,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, info_span, warn};
use uuid::Uuid;

/// A game's stored state, read without running a turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameStatus {
    pub game_id: String,
    pub game_file: PathBuf,
    pub kind: InterpreterKind,
    /// `None` for a game that has never been played (or was reset).
    pub metadata: Option<TurnMetadata>,
    /// Set when stored state exists but is unreadable.
    pub warning: Option<TurnWarning>,
}

impl GameStatus {
    pub fn generation(&self) -> u64 {
        self.metadata.as_ref().map_or(0, |m| m.generation)
    }

    pub fn input_mode(&self) -> Option<InputMode> {
        self.metadata.as_ref().and_then(TurnMetadata::input_mode)
    }

    pub fn is_game_over(&self) -> bool {
        self.metadata.as_ref().is_some_and(TurnMetadata::is_game_over)
    }
}

/// Both locks that make a turn exclusive for its game.
///
/// The in-process lock is taken first so turns from this process queue on
/// the async mutex instead of on blocking threads.
struct SessionGuard {
    _local: OwnedMutexGuard<()>,
    _file: FileLock,
}

/// Tracks the current phase and mirrors it into the turn span.
struct TurnProgress {
    span: Span,
    phase: TurnPhase,
}

impl TurnProgress {
    fn new(span: Span) -> Self {
        Self {
            span,
            phase: TurnPhase::Idle,
        }
    }

    fn enter(&mut self, phase: TurnPhase) {
        self.phase = phase;
        self.span.record("phase", tracing::field::display(phase));
        debug!(phase = %phase, "Turn phase");
    }
}

/// Executes single turns against games under one games directory.
///
/// # Responsibilities
///
/// - Serializing turns per game (keyed in-process lock plus a file lock)
/// - Mapping the caller's event onto what the stored game waits for
/// - Running one interpreter process per turn and discarding it afterwards
/// - Committing the new autosave and metadata only after a well-formed response
///
/// Turns for different games share nothing and run in parallel.
pub struct TurnExecutor {
    paths: IfPaths,
    router: Arc<dyn InterpreterRouter>,
    store: Arc<dyn StateRepository>,
    runner: Arc<dyn InterpreterRunner>,
    locks: SessionLocks,
    timeout: Duration,
}

impl TurnExecutor {
    /// Creates an executor from its collaborators.
    ///
    /// # Arguments
    ///
    /// * `paths` - Layout of the games directory
    /// * `router` - Classifies game files and resolves interpreter binaries
    /// * `store` - Persists the last committed state of each game
    /// * `runner` - Runs one interpreter process to completion
    pub fn new(
        paths: IfPaths,
        router: Arc<dyn InterpreterRouter>,
        store: Arc<dyn StateRepository>,
        runner: Arc<dyn InterpreterRunner>,
    ) -> Self {
        Self {
            paths,
            router,
            store,
            runner,
            locks: SessionLocks::new(),
            timeout: DEFAULT_TURN_TIMEOUT,
        }
    }

    /// Wires the filesystem router, state store and process runner from `config`.
    pub fn from_config(config: &BridgeConfig) -> Self {
        let locator = InterpreterLocator::from_config(config);
        Self::new(
            config.paths(),
            Arc::new(FileInterpreterRouter::new(Arc::new(locator))),
            Arc::new(FileStateStore::new()),
            Arc::new(ProcessRunner::new()),
        )
        .with_timeout(config.turn_timeout())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn paths(&self) -> &IfPaths {
        &self.paths
    }

    /// Runs one turn.
    ///
    /// # Returns
    ///
    /// * `Ok(RenderedOutput)` - the turn committed generation `prior + 1`
    /// * `Err(TurnError)` - nothing was committed; the stored state is unchanged
    pub async fn execute_turn(&self, game_id: &str, request: TurnRequest) -> Result<RenderedOutput> {
        self.execute_turn_cancellable(game_id, request, CancellationToken::new())
            .await
    }

    /// Runs one turn, terminating the interpreter if `cancel` fires.
    ///
    /// Cancellation while waiting for the session lock or during the
    /// exchange fails with `Cancelled` and leaves the stored state unchanged.
    pub async fn execute_turn_cancellable(
        &self,
        game_id: &str,
        request: TurnRequest,
        cancel: CancellationToken,
    ) -> Result<RenderedOutput> {
        let turn_id = Uuid::new_v4().to_string();
        let span = info_span!(
            "turn",
            game = %game_id,
            turn_id = %turn_id,
            kind = request.event.kind_name(),
            phase = tracing::field::Empty
        );

        let mut progress = TurnProgress::new(span.clone());
        let result = self
            .run_turn(game_id, turn_id, request, &cancel, &mut progress)
            .instrument(span.clone())
            .await;

        if let Err(e) = &result {
            let failed_in = progress.phase;
            let _entered = span.enter();
            progress.enter(TurnPhase::Errored);
            if e.is_caller_error() {
                info!(phase = %failed_in, error = %e, "Turn refused");
            } else {
                warn!(phase = %failed_in, error = %e, "Turn failed; state unchanged");
            }
        }
        result
    }

    /// Runs `text` as whatever input the game is waiting for.
    ///
    /// A line prompt gets a line, a keypress prompt gets `text` through the
    /// key encoder, and a file prompt gets `text` as the file name. A game with
    /// no stored state is started; non-empty text is then ignored with a warning.
    pub async fn execute_command(&self, game_id: &str, text: &str) -> Result<RenderedOutput> {
        let status = self.status(game_id).await?;
        let event = match status.metadata.as_ref() {
            None if text.trim().is_empty() => TurnInputEvent::Init,
            None => TurnInputEvent::line(text),
            Some(metadata) => match &metadata.input {
                None => return Err(TurnError::GameOver),
                Some(InputRequest::Character { .. }) => TurnInputEvent::character(text)?,
                Some(InputRequest::Line { .. } | InputRequest::FilePrompt { .. }) => {
                    TurnInputEvent::line(text)
                }
            },
        };
        self.execute_turn(game_id, TurnRequest::new(event)).await
    }

    /// Clears a game's stored state so the next turn starts it afresh.
    ///
    /// Waits for any running turn of the game. The game file and files owned
    /// by other collaborators (journals) are kept.
    pub async fn reset(&self, game_id: &str) -> Result<()> {
        let game_dir = self.existing_game_dir(game_id).await?;
        let _guard = self.lock_session(game_id, &game_dir).await?;
        let session = self.classified_session(game_id, &game_dir).await?;
        self.store.reset(&session).await?;
        info!(game = %game_id, "Game state reset");
        Ok(())
    }

    /// Reads a game's stored state without running a turn or taking the lock.
    pub async fn status(&self, game_id: &str) -> Result<GameStatus> {
        let game_dir = self.existing_game_dir(game_id).await?;
        let session = self.classified_session(game_id, &game_dir).await?;
        let loaded = self.store.load(&session).await;
        Ok(GameStatus {
            game_id: game_id.to_string(),
            game_file: session.game_file,
            kind: session.kind,
            metadata: loaded.metadata,
            warning: loaded.warning,
        })
    }

    async fn run_turn(
        &self,
        game_id: &str,
        turn_id: String,
        request: TurnRequest,
        cancel: &CancellationToken,
        progress: &mut TurnProgress,
    ) -> Result<RenderedOutput> {
        let game_dir = self.existing_game_dir(game_id).await?;
        let _guard = tokio::select! {
            guard = self.lock_session(game_id, &game_dir) => guard?,
            _ = cancel.cancelled() => return Err(TurnError::Cancelled),
        };

        progress.enter(TurnPhase::Resolving);
        let game_file = self.game_file(game_id, &game_dir).await?;
        let descriptor = self.router.resolve(&game_file).await?;
        let session = GameSession::new(
            game_id,
            &game_dir,
            &game_file,
            descriptor.kind,
            &descriptor.state_file,
        );

        progress.enter(TurnPhase::Loading);
        let mut loaded = self.store.load(&session).await;
        let mut warnings: Vec<TurnWarning> = loaded.warning.take().into_iter().collect();
        let prior_generation = loaded.generation();

        if let Some(expected) = request.expected_generation
            && expected != prior_generation
        {
            return Err(TurnError::GenerationMismatch {
                expected,
                found: prior_generation,
            });
        }

        let prior = loaded.metadata.take();
        let event = match (&prior, request.event) {
            (Some(metadata), _) if metadata.is_game_over() => return Err(TurnError::GameOver),
            (None, TurnInputEvent::Init) => TurnInputEvent::Init,
            (None, event) => {
                let ignored_command = event.command_text();
                info!(ignored = ?ignored_command, "No stored state; starting a new game");
                warnings.push(TurnWarning::NewGameStarted { ignored_command });
                TurnInputEvent::Init
            }
            (Some(_), event) => event,
        };
        let restored = prior.as_ref().and_then(RestoredContext::from_metadata);
        let input = encode_input(&event, restored.as_ref())?;

        if cancel.is_cancelled() {
            return Err(TurnError::Cancelled);
        }

        progress.enter(TurnPhase::Spawning);
        let restoring = restored.is_some();
        let restored_blob = if restoring { loaded.blob.take() } else { None };
        let staging_root = game_dir.clone();
        let staging = blocking(move || stage(&staging_root, restored_blob)).await?;
        let invocation = descriptor.invocation(&game_file, staging.path(), restoring);
        debug!(
            binary = %descriptor.binary.display(),
            restoring,
            staging = %staging.path().display(),
            "Prepared interpreter invocation"
        );

        progress.enter(TurnPhase::Exchanging);
        let output = self
            .runner
            .run(&invocation, &input, self.timeout, cancel)
            .await?;

        progress.enter(TurnPhase::Decoding);
        let message = decode_output(&output.stdout)?;
        let windows = match (&message.windows, &prior) {
            (Some(windows), _) => windows.clone(),
            (None, Some(metadata)) => metadata.windows.clone(),
            (None, None) => {
                return Err(TurnError::protocol(
                    "output has no window layout and none is stored",
                ));
            }
        };

        let staged = staging.path().to_path_buf();
        let blob = blocking(move || harvest(&staged)).await?;
        let game_stem = session.game_stem();
        if !message.is_game_over()
            && !blob
                .files()
                .any(|(name, _)| descriptor.is_primary_autosave(name, &game_stem))
        {
            return Err(TurnError::protocol(
                "interpreter left no autosave for a game still in progress",
            ));
        }

        let metadata = TurnMetadata {
            generation: prior_generation + 1,
            interpreter_gen: message.interpreter_gen,
            input: message.input.clone(),
            windows,
            last_command: event.command_text(),
            updated_at: Utc::now(),
        };
        metadata.validate().map_err(TurnError::protocol)?;

        progress.enter(TurnPhase::Persisting);
        self.store.save(&session, &blob, &metadata).await?;
        drop(staging);

        let screen = render(&message, &metadata.windows);
        progress.enter(TurnPhase::Done);
        info!(
            generation = metadata.generation,
            input = ?metadata.input_mode(),
            files = blob.len(),
            bytes = blob.total_bytes(),
            "Turn committed"
        );

        Ok(RenderedOutput {
            game_id: game_id.to_string(),
            turn_id,
            generation: metadata.generation,
            text: screen.text,
            windows: screen.windows,
            game_over: message.is_game_over(),
            input: message.input,
            warnings,
        })
    }

    async fn existing_game_dir(&self, game_id: &str) -> Result<PathBuf> {
        let game_dir = self.paths.game_dir(game_id);
        match tokio::fs::metadata(&game_dir).await {
            Ok(meta) if meta.is_dir() => Ok(game_dir),
            _ => Err(TurnError::game_not_found(game_id)),
        }
    }

    async fn game_file(&self, game_id: &str, game_dir: &Path) -> Result<PathBuf> {
        self.router
            .find_game_file(game_dir)
            .await
            .ok_or_else(|| TurnError::game_not_found(game_id))
    }

    /// A session built from the game file alone, without resolving a binary.
    async fn classified_session(&self, game_id: &str, game_dir: &Path) -> Result<GameSession> {
        let game_file = self.game_file(game_id, game_dir).await?;
        let classification = self.router.classify(&game_file).await?;
        Ok(GameSession::new(
            game_id,
            game_dir,
            &game_file,
            classification.kind(),
            &classification.state_file,
        ))
    }

    async fn lock_session(&self, game_id: &str, game_dir: &Path) -> Result<SessionGuard> {
        let local = self.locks.acquire(&sanitize_game_id(game_id)).await;
        let lock_path = IfPaths::session_lock_file(game_dir);
        let file = blocking(move || FileLock::acquire(&lock_path).map_err(TurnError::from)).await?;
        debug!(game = %game_id, "Session lock held");
        Ok(SessionGuard {
            _local: local,
            _file: file,
        })
    }
}

/// Creates the turn's staging directory and writes the restored files into it.
fn stage(game_dir: &Path, blob: Option<AutosaveBlob>) -> Result<TempDir> {
    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(game_dir)?;
    if let Some(blob) = blob {
        for (name, data) in blob.files() {
            fs::write(staging.path().join(name), data)?;
        }
    }
    Ok(staging)
}

/// Collects every regular file the interpreter left in `dir`.
fn harvest(dir: &Path) -> Result<AutosaveBlob> {
    let mut blob = AutosaveBlob::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => blob.insert(name, fs::read(entry.path())?),
            Err(name) => debug!(file = ?name, "Skipping non-UTF-8 autosave file"),
        }
    }
    Ok(blob)
}

async fn blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| TurnError::io(format!("blocking task failed: {}", e)))?
}
