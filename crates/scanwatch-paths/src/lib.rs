use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("home directory not found: set the HOME environment variable")]
    HomeNotFound,
}

/// Centralized path construction for the `~/.scanwatch/` directory layout.
///
/// Use `resolve()` in production code and `from_dir()` in tests.
#[derive(Debug, Clone)]
pub struct ScanwatchPaths {
    scanwatch_dir: PathBuf,
}

impl ScanwatchPaths {
    /// Resolve paths from the user's home directory (`~/.scanwatch`).
    pub fn resolve() -> Result<Self, PathError> {
        let home = dirs::home_dir().ok_or(PathError::HomeNotFound)?;
        Ok(Self {
            scanwatch_dir: home.join(".scanwatch"),
        })
    }

    /// Create paths from an explicit base directory. Use in tests.
    pub fn from_dir(scanwatch_dir: PathBuf) -> Self {
        Self { scanwatch_dir }
    }

    /// The base `~/.scanwatch` directory.
    pub fn scanwatch_dir(&self) -> &Path {
        &self.scanwatch_dir
    }

    pub fn user_config(&self) -> PathBuf {
        self.scanwatch_dir.join("config.toml")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.scanwatch_dir.join("logs")
    }

    /// JSON log file for a long-running `watch` of one invoice.
    pub fn watch_log_file(&self, invoice_id: i64) -> PathBuf {
        self.logs_dir().join(format!("watch-{invoice_id}.jsonl"))
    }

    // --- Static helpers (no self) ---

    /// Project-level config: `<project_root>/.scanwatch/config.toml`.
    pub fn project_config(project_root: &Path) -> PathBuf {
        project_root.join(".scanwatch").join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_paths() -> ScanwatchPaths {
        ScanwatchPaths::from_dir(PathBuf::from("/home/user/.scanwatch"))
    }

    #[test]
    fn test_resolve_returns_ok_when_home_set() {
        // HOME is set in CI and dev environments
        let result = ScanwatchPaths::resolve();
        assert!(result.is_ok());
        let paths = result.unwrap();
        assert!(paths.scanwatch_dir().to_string_lossy().contains(".scanwatch"));
    }

    #[test]
    fn test_from_dir() {
        let paths = ScanwatchPaths::from_dir(PathBuf::from("/tmp/test-scanwatch"));
        assert_eq!(paths.scanwatch_dir(), Path::new("/tmp/test-scanwatch"));
    }

    #[test]
    fn test_user_config() {
        assert_eq!(
            test_paths().user_config(),
            PathBuf::from("/home/user/.scanwatch/config.toml")
        );
    }

    #[test]
    fn test_watch_log_file() {
        assert_eq!(
            test_paths().watch_log_file(42),
            PathBuf::from("/home/user/.scanwatch/logs/watch-42.jsonl")
        );
    }

    #[test]
    fn test_project_config() {
        assert_eq!(
            ScanwatchPaths::project_config(Path::new("/work/invoices")),
            PathBuf::from("/work/invoices/.scanwatch/config.toml")
        );
    }
}
