//! File system paths for Hireboard tools.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Directory name under the home directory.
const BASE_DIR_NAME: &str = ".hireboard";

/// Manages file system paths.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for runtime files (~/.hireboard)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.hireboard`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(BASE_DIR_NAME),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.hireboard).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.hireboard/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the persisted provider session (~/.hireboard/session.json).
    pub fn session_file(&self) -> PathBuf {
        self.base_dir.join("session.json")
    }

    /// Get the pending redirect sign-in record (~/.hireboard/pending-redirect.json).
    pub fn pending_redirect_file(&self) -> PathBuf {
        self.base_dir.join("pending-redirect.json")
    }

    /// Get the logs directory (~/.hireboard/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the auth log file path (~/.hireboard/logs/auth.jsonl).
    pub fn auth_log_file(&self) -> PathBuf {
        self.logs_dir().join("auth.jsonl")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_with_base_dir() {
        let base = PathBuf::from("/tmp/test-hireboard");
        let paths = Paths::with_base_dir(base.clone());

        assert_eq!(paths.base_dir(), &base);
        assert_eq!(paths.config_file(), base.join("config.json"));
        assert_eq!(paths.session_file(), base.join("session.json"));
        assert_eq!(
            paths.pending_redirect_file(),
            base.join("pending-redirect.json")
        );
        assert_eq!(paths.logs_dir(), base.join("logs"));
        assert_eq!(paths.auth_log_file(), base.join("logs/auth.jsonl"));
    }

    #[test]
    fn test_paths_default() {
        let paths = Paths::new().unwrap();
        let home = dirs::home_dir().unwrap();

        assert_eq!(paths.base_dir(), &home.join(".hireboard"));
    }

    #[test]
    fn test_ensure_dirs_creates_directories() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("hireboard");
        let paths = Paths::with_base_dir(base.clone());

        assert!(!base.exists());

        paths.ensure_dirs().unwrap();

        assert!(base.is_dir());
        assert!(paths.logs_dir().is_dir());

        // Idempotent
        paths.ensure_dirs().unwrap();
    }
}
