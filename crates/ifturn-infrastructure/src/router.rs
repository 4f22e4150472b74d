//! File-backed interpreter routing.

use async_trait::async_trait;
use ifturn_core::interpreter::{
    BinaryResolver, BlorbExec, GameClassification, GameFormat, InterpreterDescriptor,
    InterpreterKind, InterpreterRouter, StateFileNaming, ZCodeHeader, blorb_executable,
};
use ifturn_core::{Result, TurnError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// State file name used by Glulx games.
pub const GLULX_STATE_NAME: &str = "autosave";

/// Routes game files by extension (and Blorb/Z-code headers where needed).
///
/// Binary paths are resolved on first use of each kind and cached; failures
/// are not cached, so installing an interpreter takes effect on the next turn.
pub struct FileInterpreterRouter {
    resolver: Arc<dyn BinaryResolver>,
    binaries: Mutex<HashMap<InterpreterKind, PathBuf>>,
}

impl FileInterpreterRouter {
    pub fn new(resolver: Arc<dyn BinaryResolver>) -> Self {
        Self {
            resolver,
            binaries: Mutex::new(HashMap::new()),
        }
    }

    fn binary_for(&self, kind: InterpreterKind) -> Result<PathBuf> {
        if let Some(path) = self
            .binaries
            .lock()
            .ok()
            .and_then(|cache| cache.get(&kind).cloned())
        {
            return Ok(path);
        }

        let path = self.resolver.resolve(kind)?;
        debug!(kind = %kind, binary = %path.display(), "Resolved interpreter binary");
        if let Ok(mut cache) = self.binaries.lock() {
            cache.insert(kind, path.clone());
        }
        Ok(path)
    }

    /// Classifies the file, reading it only when the extension is not enough.
    async fn classify_format(&self, game_file: &Path) -> Result<(GameFormat, Option<Vec<u8>>)> {
        let display = game_file.display().to_string();
        let ext = game_file
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .ok_or_else(|| TurnError::unsupported_format(&display, "file has no extension"))?;

        match GameFormat::from_extension(&ext) {
            Ok(Some(format)) => Ok((format, None)),
            Ok(None) => {
                let data = read_game(game_file).await?;
                let format = match blorb_executable(&data) {
                    Some((BlorbExec::Glulx, _)) => GameFormat::Gblorb,
                    Some((BlorbExec::Zcode, _)) => GameFormat::Zblorb,
                    None => {
                        return Err(TurnError::unsupported_format(
                            &display,
                            "Blorb file has no Glulx or Z-code executable",
                        ));
                    }
                };
                Ok((format, Some(data)))
            }
            Err(reason) => Err(TurnError::unsupported_format(&display, reason)),
        }
    }
}

async fn read_game(game_file: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(game_file).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            TurnError::game_not_found(game_file.display().to_string())
        } else {
            TurnError::from(e)
        }
    })
}

#[async_trait]
impl InterpreterRouter for FileInterpreterRouter {
    async fn classify(&self, game_file: &Path) -> Result<GameClassification> {
        let (format, data) = self.classify_format(game_file).await?;

        let state_file = match format.interpreter_kind() {
            InterpreterKind::Glulx => StateFileNaming::Fixed {
                name: GLULX_STATE_NAME.to_string(),
            },
            InterpreterKind::ZMachine => {
                let data = match data {
                    Some(data) => data,
                    None => read_game(game_file).await?,
                };
                let header = ZCodeHeader::locate(&data).ok_or_else(|| {
                    TurnError::unsupported_format(
                        game_file.display().to_string(),
                        "no valid Z-code story header",
                    )
                })?;
                StateFileNaming::StoryId {
                    stem: game_file
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    story_id: header.story_id(),
                }
            }
        };

        Ok(GameClassification { format, state_file })
    }

    async fn resolve(&self, game_file: &Path) -> Result<InterpreterDescriptor> {
        let classification = self.classify(game_file).await?;
        let kind = classification.kind();
        let binary = self.binary_for(kind)?;
        Ok(InterpreterDescriptor {
            kind,
            format: classification.format,
            binary,
            state_file: classification.state_file,
        })
    }

    async fn find_game_file(&self, game_dir: &Path) -> Option<PathBuf> {
        for ext in GameFormat::GAME_FILE_EXTENSIONS {
            let candidate = game_dir.join(format!("game.{}", ext));
            if let Ok(meta) = tokio::fs::metadata(&candidate).await
                && meta.is_file()
            {
                return Some(candidate);
            }
        }

        // Any other `game.*` is returned so that classification can reject it.
        let mut entries = tokio::fs::read_dir(game_dir).await.ok()?;
        let mut others = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.file_stem().is_some_and(|stem| stem == "game")
                && entry.file_type().await.is_ok_and(|t| t.is_file())
            {
                others.push(path);
            }
        }
        others.sort();
        others.into_iter().next()
    }
}
