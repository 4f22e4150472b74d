//! File-backed state store.
//!
//! Each game keeps one envelope file under `state/` holding the autosave
//! files (base64) and the turn metadata. The envelope is the commit point:
//! it is replaced atomically, and `metadata.json` is written after it as a
//! convenience copy for listings. When the two disagree the envelope wins.

use crate::paths::STAGING_PREFIX;
use crate::storage::{AtomicJsonFile, temp_path, write_atomic};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ifturn_core::interpreter::InterpreterKind;
use ifturn_core::session::{
    AutosaveBlob, GameSession, LoadedState, StateRepository, TurnMetadata,
};
use ifturn_core::{Result, TurnError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Version of the envelope layout. Anything else is refused as corrupt.
pub const ENVELOPE_FORMAT: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StateEnvelope {
    format: u32,
    kind: InterpreterKind,
    generation: u64,
    metadata: TurnMetadata,
    files: BTreeMap<String, String>,
}

impl StateEnvelope {
    fn seal(kind: InterpreterKind, blob: &AutosaveBlob, metadata: &TurnMetadata) -> Self {
        Self {
            format: ENVELOPE_FORMAT,
            kind,
            generation: metadata.generation,
            metadata: metadata.clone(),
            files: blob
                .files()
                .map(|(name, data)| (name.to_string(), BASE64.encode(data)))
                .collect(),
        }
    }

    fn open(
        self,
        expected_kind: InterpreterKind,
    ) -> std::result::Result<(AutosaveBlob, TurnMetadata), String> {
        if self.format != ENVELOPE_FORMAT {
            return Err(format!("unsupported state format {}", self.format));
        }
        if self.kind != expected_kind {
            return Err(format!(
                "state was written by {} but the game runs on {}",
                self.kind, expected_kind
            ));
        }
        if self.generation != self.metadata.generation {
            return Err(format!(
                "envelope generation {} does not match metadata generation {}",
                self.generation, self.metadata.generation
            ));
        }
        self.metadata.validate()?;

        let mut blob = AutosaveBlob::new();
        for (name, encoded) in self.files {
            if !is_plain_file_name(&name) {
                return Err(format!("invalid file name '{}' in state", name));
            }
            let data = BASE64
                .decode(encoded.as_bytes())
                .map_err(|e| format!("file '{}' is not valid base64: {}", name, e))?;
            blob.insert(name, data);
        }
        Ok((blob, self.metadata))
    }
}

/// A name that cannot escape the directory it is written into.
fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
}

/// `StateRepository` over the per-game directory layout.
#[derive(Debug, Clone, Default)]
pub struct FileStateStore;

impl FileStateStore {
    pub fn new() -> Self {
        Self
    }

    fn load_blocking(session: &GameSession) -> LoadedState {
        let bytes = match std::fs::read(&session.state_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if session.metadata_path.exists() {
                    return LoadedState::corrupt(
                        "metadata exists but the state file is missing",
                    );
                }
                return LoadedState::empty();
            }
            Err(e) => return LoadedState::corrupt(format!("state file unreadable: {}", e)),
        };

        let envelope: StateEnvelope = match serde_json::from_slice(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => return LoadedState::corrupt(format!("state file is not a valid envelope: {}", e)),
        };

        match envelope.open(session.kind) {
            Ok((blob, metadata)) => LoadedState {
                blob: Some(blob),
                metadata: Some(metadata),
                warning: None,
            },
            Err(reason) => LoadedState::corrupt(reason),
        }
    }

    fn save_blocking(
        session: &GameSession,
        blob: &AutosaveBlob,
        metadata: &TurnMetadata,
    ) -> Result<()> {
        let envelope = StateEnvelope::seal(session.kind, blob, metadata);
        let bytes = serde_json::to_vec(&envelope)
            .map_err(|e| TurnError::io(format!("failed to serialize state: {}", e)))?;
        write_atomic(&session.state_path, &bytes)?;

        // The envelope is committed; a failure here only leaves a stale copy.
        if let Err(e) = AtomicJsonFile::new(session.metadata_path.clone()).save(metadata) {
            warn!(
                game = %session.game_id,
                error = %e,
                "Failed to write metadata.json after committing state"
            );
        }
        Ok(())
    }

    fn reset_blocking(session: &GameSession) -> Result<()> {
        remove_if_exists(&session.state_path)?;
        remove_if_exists(&session.metadata_path)?;

        let temps = [&session.state_path, &session.metadata_path]
            .into_iter()
            .filter_map(|path| temp_path(path).ok());
        for temp in temps {
            if let Err(e) = remove_if_exists(&temp) {
                debug!(path = %temp.display(), error = %e, "Could not remove leftover");
            }
        }
        for staging in staging_dirs(&session.game_dir) {
            if let Err(e) = std::fs::remove_dir_all(&staging) {
                debug!(path = %staging.display(), error = %e, "Could not remove leftover");
            }
        }
        Ok(())
    }
}

/// Staging directories left by interrupted turns.
fn staging_dirs(game_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(game_dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_dir()
                && path
                    .file_name()
                    .is_some_and(|n| n.to_string_lossy().starts_with(STAGING_PREFIX))
        })
        .collect()
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TurnError::io(format!("storage task failed: {}", e)))?
}

#[async_trait]
impl StateRepository for FileStateStore {
    async fn load(&self, session: &GameSession) -> LoadedState {
        let owned = session.clone();
        let loaded = match blocking(move || Ok(Self::load_blocking(&owned))).await {
            Ok(loaded) => loaded,
            Err(e) => LoadedState::corrupt(e.to_string()),
        };
        if let Some(warning) = &loaded.warning {
            warn!(game = %session.game_id, %warning, "Discarding unusable saved state");
        }
        loaded
    }

    async fn save(
        &self,
        session: &GameSession,
        blob: &AutosaveBlob,
        metadata: &TurnMetadata,
    ) -> Result<()> {
        let owned = session.clone();
        let blob = blob.clone();
        let metadata = metadata.clone();
        let generation = metadata.generation;
        blocking(move || Self::save_blocking(&owned, &blob, &metadata)).await?;
        debug!(game = %session.game_id, generation, "Committed state");
        Ok(())
    }

    async fn reset(&self, session: &GameSession) -> Result<()> {
        let owned = session.clone();
        blocking(move || Self::reset_blocking(&owned)).await?;
        info!(game = %session.game_id, "Cleared saved state");
        Ok(())
    }
}
