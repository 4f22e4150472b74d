//! Bridge configuration and interpreter binary location.
//!
//! Configuration comes from an optional TOML file, overlaid with `IF_*`
//! environment variables. Binaries are located lazily, per kind, by
//! `InterpreterLocator`.

use crate::paths::IfPaths;
use ifturn_core::interpreter::{BinaryResolver, InterpreterKind};
use ifturn_core::{Result, TurnError};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use strum::IntoEnumIterator;
use tracing::debug;

pub const GAMES_DIR_ENV: &str = "IF_GAMES_DIR";
pub const TURN_TIMEOUT_ENV: &str = "IF_TURN_TIMEOUT_SECS";
pub const DEFAULT_TURN_TIMEOUT_SECS: u64 = 30;

/// Runtime configuration of the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub games_dir: PathBuf,
    /// Explicit glulxe binary; when set, no other location is tried.
    pub glulxe_path: Option<PathBuf>,
    /// Explicit bocfel binary; when set, no other location is tried.
    pub bocfel_path: Option<PathBuf>,
    pub turn_timeout_secs: u64,
    /// Directory of binaries shipped alongside the bridge.
    pub bundled_bin_dir: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            games_dir: IfPaths::default_games_dir(),
            glulxe_path: None,
            bocfel_path: None,
            turn_timeout_secs: DEFAULT_TURN_TIMEOUT_SECS,
            bundled_bin_dir: None,
        }
    }
}

impl BridgeConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Reads a TOML config file, then overlays the process environment.
    pub fn load(config_file: &Path) -> Result<Self> {
        Self::load_with(config_file, |key| std::env::var(key).ok())
    }

    /// Reads a TOML config file, then overlays `IF_*` values from `lookup`.
    pub fn load_with<F>(config_file: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let content = std::fs::read_to_string(config_file)?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            TurnError::io(format!(
                "invalid config file {}: {}",
                config_file.display(),
                e
            ))
        })?;
        Ok(config.with_overrides(lookup))
    }

    /// Applies `IF_*` overrides read through `lookup`. Empty values are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get(GAMES_DIR_ENV) {
            self.games_dir = PathBuf::from(dir);
        }
        if let Some(path) = get(InterpreterKind::Glulx.binary_env_var()) {
            self.glulxe_path = Some(PathBuf::from(path));
        }
        if let Some(path) = get(InterpreterKind::ZMachine.binary_env_var()) {
            self.bocfel_path = Some(PathBuf::from(path));
        }
        if let Some(secs) = get(TURN_TIMEOUT_ENV) {
            match secs.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.turn_timeout_secs = secs,
                _ => debug!(value = %secs, "Ignoring invalid {}", TURN_TIMEOUT_ENV),
            }
        }
        self
    }

    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }

    pub fn paths(&self) -> IfPaths {
        IfPaths::new(self.games_dir.clone())
    }

    pub fn binary_override(&self, kind: InterpreterKind) -> Option<&Path> {
        match kind {
            InterpreterKind::Glulx => self.glulxe_path.as_deref(),
            InterpreterKind::ZMachine => self.bocfel_path.as_deref(),
        }
    }
}

/// Finds interpreter binaries on disk.
///
/// Search order per kind: explicit override (which must exist; there is no
/// fallback past it), the bundled directory, `PATH`, then common install
/// locations.
#[derive(Debug, Clone)]
pub struct InterpreterLocator {
    overrides: Vec<(InterpreterKind, PathBuf)>,
    bundled_dir: Option<PathBuf>,
    search_path: Option<OsString>,
    fallback_dirs: Vec<PathBuf>,
}

impl InterpreterLocator {
    pub fn from_config(config: &BridgeConfig) -> Self {
        let overrides = InterpreterKind::iter()
            .filter_map(|kind| {
                config
                    .binary_override(kind)
                    .map(|path| (kind, path.to_path_buf()))
            })
            .collect();
        Self {
            overrides,
            bundled_dir: config.bundled_bin_dir.clone(),
            search_path: std::env::var_os("PATH"),
            fallback_dirs: Self::default_fallback_dirs(),
        }
    }

    /// `~/.local/bin`, `/usr/local/bin`, `/usr/bin`.
    pub fn default_fallback_dirs() -> Vec<PathBuf> {
        let mut dirs_list = Vec::new();
        if let Some(home) = dirs::home_dir() {
            dirs_list.push(home.join(".local").join("bin"));
        }
        dirs_list.push(PathBuf::from("/usr/local/bin"));
        dirs_list.push(PathBuf::from("/usr/bin"));
        dirs_list
    }

    /// Replaces the `PATH` value searched.
    pub fn with_search_path(mut self, search_path: Option<OsString>) -> Self {
        self.search_path = search_path;
        self
    }

    pub fn with_fallback_dirs(mut self, fallback_dirs: Vec<PathBuf>) -> Self {
        self.fallback_dirs = fallback_dirs;
        self
    }

    fn candidates(&self, name: &str) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(dir) = &self.bundled_dir {
            candidates.push(dir.join(name));
            candidates.push(dir.join(format!("{}.exe", name)));
        }
        if let Some(path) = &self.search_path {
            candidates.extend(std::env::split_paths(path).map(|dir| dir.join(name)));
        }
        candidates.extend(self.fallback_dirs.iter().map(|dir| dir.join(name)));
        candidates
    }
}

impl BinaryResolver for InterpreterLocator {
    fn resolve(&self, kind: InterpreterKind) -> Result<PathBuf> {
        let name = kind.binary_name();
        let env_var = kind.binary_env_var();

        if let Some((_, path)) = self.overrides.iter().find(|(k, _)| *k == kind) {
            return if is_executable(path) {
                Ok(path.clone())
            } else {
                Err(TurnError::configuration(
                    kind.to_string(),
                    format!(
                        "{} is set to {}, which is not an executable file",
                        env_var,
                        path.display()
                    ),
                ))
            };
        }

        let candidates = self.candidates(name);
        if let Some(found) = candidates.iter().find(|c| is_executable(c)) {
            debug!(kind = %kind, path = %found.display(), "Located interpreter binary");
            return Ok(found.clone());
        }

        let mut checked = vec![format!("{} env var (unset)", env_var)];
        checked.extend(candidates.iter().map(|c| c.display().to_string()));
        Err(TurnError::configuration(
            kind.to_string(),
            format!(
                "{} binary not found. Checked:\n{}\nInstall {} or set {} to its path.",
                name,
                checked
                    .iter()
                    .map(|c| format!("  - {}", c))
                    .collect::<Vec<_>>()
                    .join("\n"),
                name,
                env_var
            ),
        ))
    }
}

/// A regular file with at least one execute bit (any regular file off unix).
pub fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[cfg_attr(not(unix), allow(unused_variables))]
    fn fake_binary(dir: &Path, name: &str, executable: bool) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = if executable { 0o755 } else { 0o644 };
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        }
        path
    }

    fn isolated(config: &BridgeConfig) -> InterpreterLocator {
        InterpreterLocator::from_config(config)
            .with_search_path(None)
            .with_fallback_dirs(Vec::new())
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("IF_GAMES_DIR", "/data/games"),
            ("IF_BOCFEL_PATH", "/opt/bocfel"),
            ("IF_GLULXE_PATH", ""),
            ("IF_TURN_TIMEOUT_SECS", "12"),
        ]
        .into_iter()
        .collect();
        let config = BridgeConfig::default().with_overrides(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.games_dir, PathBuf::from("/data/games"));
        assert_eq!(config.bocfel_path, Some(PathBuf::from("/opt/bocfel")));
        assert_eq!(config.glulxe_path, None);
        assert_eq!(config.turn_timeout(), Duration::from_secs(12));
    }

    #[test]
    fn test_invalid_timeout_ignored() {
        let config = BridgeConfig::default()
            .with_overrides(|k| (k == TURN_TIMEOUT_ENV).then(|| "soon".to_string()));
        assert_eq!(config.turn_timeout_secs, DEFAULT_TURN_TIMEOUT_SECS);
    }

    #[test]
    fn test_load_toml_then_env() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("ifturn.toml");
        std::fs::write(
            &file,
            "games_dir = \"/tmp/g\"\nturn_timeout_secs = 5\nglulxe_path = \"/opt/glulxe\"\n",
        )
        .unwrap();

        let config = BridgeConfig::load_with(&file, |_| None).unwrap();
        assert_eq!(config.games_dir, PathBuf::from("/tmp/g"));
        assert_eq!(config.turn_timeout_secs, 5);
        assert_eq!(config.glulxe_path, Some(PathBuf::from("/opt/glulxe")));
        assert_eq!(config.bundled_bin_dir, None);

        let vars: HashMap<&str, &str> = [("IF_GAMES_DIR", "/srv/games"), ("IF_TURN_TIMEOUT_SECS", "9")]
            .into_iter()
            .collect();
        let config = BridgeConfig::load_with(&file, |k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.games_dir, PathBuf::from("/srv/games"));
        assert_eq!(config.turn_timeout_secs, 9);
        assert_eq!(config.glulxe_path, Some(PathBuf::from("/opt/glulxe")));
    }

    #[test]
    fn test_load_rejects_bad_files() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("ifturn.toml");
        std::fs::write(&file, "turn_timeout_secs = \"soon\"\n").unwrap();

        let err = BridgeConfig::load(&file).unwrap_err();
        assert!(err.to_string().contains("invalid config file"));
        assert!(BridgeConfig::load(&temp_dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_bundled_before_path() {
        let bundled = TempDir::new().unwrap();
        let on_path = TempDir::new().unwrap();
        let expected = fake_binary(bundled.path(), "glulxe", true);
        fake_binary(on_path.path(), "glulxe", true);
        let config = BridgeConfig {
            bundled_bin_dir: Some(bundled.path().to_path_buf()),
            ..Default::default()
        };
        let locator =
            isolated(&config).with_search_path(Some(on_path.path().as_os_str().to_os_string()));
        assert_eq!(locator.resolve(InterpreterKind::Glulx).unwrap(), expected);
    }

    #[test]
    fn test_override_has_no_fallback() {
        let bundled = TempDir::new().unwrap();
        fake_binary(bundled.path(), "bocfel", true);
        let config = BridgeConfig {
            bocfel_path: Some(bundled.path().join("missing")),
            bundled_bin_dir: Some(bundled.path().to_path_buf()),
            ..Default::default()
        };
        let err = isolated(&config).resolve(InterpreterKind::ZMachine).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("IF_BOCFEL_PATH"));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_executable_skipped() {
        let dir = TempDir::new().unwrap();
        fake_binary(dir.path(), "bocfel", false);
        let locator = isolated(&BridgeConfig::default())
            .with_search_path(Some(dir.path().as_os_str().to_os_string()));
        let err = locator.resolve(InterpreterKind::ZMachine).unwrap_err();
        assert!(err.to_string().contains("Checked:"));
    }
}
