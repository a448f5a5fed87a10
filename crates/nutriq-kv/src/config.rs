use std::env;
use std::path::PathBuf;

/// Storage backend configuration.
///
/// Reads from the `NUTRIQ_DB_PATH` environment variable, falling back to
/// `~/.local/share/nutriq/nutriq.db` when unset.
#[derive(Debug, Clone)]
pub struct KvConfig {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
}

impl KvConfig {
    /// Build a config from the environment.
    ///
    /// Priority: `NUTRIQ_DB_PATH` env var, then the XDG data directory.
    pub fn from_env() -> Self {
        let db_path = env::var("NUTRIQ_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_path());
        Self { db_path }
    }

    /// Build a config from an explicit path (useful for tests and CLI flags).
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    /// The default database location: `$XDG_DATA_HOME/nutriq/nutriq.db` or
    /// `~/.local/share/nutriq/nutriq.db`.
    pub fn default_path() -> PathBuf {
        if let Ok(xdg) = env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("nutriq").join("nutriq.db");
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".local")
            .join("share")
            .join("nutriq")
            .join("nutriq.db")
    }
}

impl Default for KvConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path() {
        let cfg = KvConfig::new("/tmp/test.db");
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/test.db"));
    }

    #[test]
    fn default_path_ends_with_db_file() {
        assert!(KvConfig::default_path().ends_with("nutriq/nutriq.db"));
    }
}
