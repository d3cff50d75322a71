// Runtime configuration for the project store
// Resolves the runtime directory (settings, templates, log output); the data
// directory itself comes from the settings file.

use std::path::PathBuf;

/// Environment variable that overrides the runtime directory
pub const HOME_ENV_VAR: &str = "PROJECT_MANAGER_HOME";

/// Locations that do not move when the data directory is repointed
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding settings.txt, templates/ and logs/
    pub runtime_dir: PathBuf,
}

impl Config {
    /// Configuration rooted at an explicit directory
    pub fn new(runtime_dir: impl Into<PathBuf>) -> Self {
        Self {
            runtime_dir: runtime_dir.into(),
        }
    }

    /// Create configuration using default paths
    pub fn default_paths() -> Self {
        Self::new(Self::default_runtime_dir())
    }

    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        if let Ok(override_dir) = std::env::var(HOME_ENV_VAR) {
            if !override_dir.trim().is_empty() {
                return Self::new(override_dir);
            }
        }

        Self::default_paths()
    }

    /// ~/.project-manager/ (or a temp directory if home is unavailable)
    fn default_runtime_dir() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".project-manager"))
            .unwrap_or_else(|| std::env::temp_dir().join("project-manager"))
    }

    pub fn settings_file(&self) -> PathBuf {
        self.runtime_dir.join("settings.txt")
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.runtime_dir.join("templates")
    }

    /// Directory for the human-readable diagnostics log
    pub fn log_dir(&self) -> PathBuf {
        self.runtime_dir.join("logs")
    }

    /// Data directory used until the settings say otherwise
    pub fn default_data_dir(&self) -> PathBuf {
        self.runtime_dir.join("data")
    }

    /// Ensure the runtime directory structure (and the default data directory) exists
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.runtime_dir)?;
        std::fs::create_dir_all(self.templates_dir())?;
        std::fs::create_dir_all(self.log_dir())?;
        std::fs::create_dir_all(self.default_data_dir())?;
        Ok(())
    }
}
