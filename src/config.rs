//! Configuration management for shell-bot.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cli::Args;
use crate::pty::{default_shell, PtySize};
use crate::session::{sanitized_env, ContextDefaults};
use crate::transport::Identity;

/// Config file used when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identity of the owner chat.
    pub owner: Option<i64>,
    /// Bot API token.
    #[serde(alias = "authToken")]
    pub auth_token: Option<String>,
    /// Ignore messages sent while the bot was offline.
    pub skip_queued: bool,
    /// Settings new contexts start with.
    pub defaults: DefaultsSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            owner: None,
            auth_token: None,
            skip_queued: true,
            defaults: DefaultsSection::default(),
            logging: LoggingSection::default(),
        }
    }
}

/// Initial settings of every context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsSection {
    /// Shell path; the login shell when unset.
    pub shell: Option<String>,
    /// Working directory; `$HOME` when unset.
    pub cwd: Option<PathBuf>,
    pub columns: u16,
    pub rows: u16,
    pub silent: bool,
    pub interactive: bool,
    pub link_previews: bool,
}

impl Default for DefaultsSection {
    fn default() -> Self {
        let size = PtySize::default();
        Self {
            shell: None,
            cwd: None,
            columns: size.cols,
            rows: size.rows,
            silent: true,
            interactive: false,
            link_previews: false,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace) or filter directives.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("SHELL_BOT_TOKEN") {
            if !token.is_empty() {
                self.auth_token = Some(token);
            }
        }

        if let Ok(owner) = std::env::var("SHELL_BOT_OWNER") {
            if let Ok(owner) = owner.trim().parse() {
                self.owner = Some(owner);
            }
        }

        if let Ok(level) = std::env::var("SHELL_BOT_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(ref token) = args.token {
            self.auth_token = Some(token.clone());
        }

        if let Some(owner) = args.owner {
            self.owner = Some(owner);
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults. The default
    /// config file is optional; an explicitly given one must exist.
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match args.config {
            Some(ref path) => Config::from_file(path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.is_file() {
                    Config::from_file(path)?
                } else {
                    Config::default()
                }
            }
        };

        config.apply_env();
        config.apply_args(args);

        Ok(config)
    }

    /// Check that the fields without defaults are present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.auth_token.as_deref() {
            Some(token) if !token.trim().is_empty() => {}
            _ => return Err(ConfigError::Missing("auth_token")),
        }
        if self.owner.is_none() {
            return Err(ConfigError::Missing("owner"));
        }
        if self.defaults.columns == 0 || self.defaults.rows == 0 {
            return Err(ConfigError::InvalidSize(
                self.defaults.columns,
                self.defaults.rows,
            ));
        }
        Ok(())
    }

    /// The owner identity.
    pub fn owner(&self) -> Result<Identity, ConfigError> {
        self.owner.map(Identity).ok_or(ConfigError::Missing("owner"))
    }

    /// Build the defaults applied to new contexts.
    pub fn context_defaults(&self) -> ContextDefaults {
        let host = ContextDefaults::from_host();
        ContextDefaults {
            shell: self.defaults.shell.clone().unwrap_or_else(default_shell),
            cwd: self.defaults.cwd.clone().unwrap_or(host.cwd),
            size: PtySize::new(self.defaults.rows, self.defaults.columns),
            silent: self.defaults.silent,
            interactive: self.defaults.interactive,
            link_previews: self.defaults.link_previews,
            env: sanitized_env(),
        }
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// A required field is not set anywhere.
    Missing(&'static str),
    /// Terminal size with a zero dimension.
    InvalidSize(u16, u16),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::Missing(field) => write!(f, "missing required setting: {}", field),
            Self::InvalidSize(cols, rows) => {
                write!(f, "invalid terminal size: {}x{}", cols, rows)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.owner.is_none());
        assert!(config.auth_token.is_none());
        assert!(config.skip_queued);
        assert_eq!(config.defaults.columns, 40);
        assert_eq!(config.defaults.rows, 20);
        assert!(config.defaults.silent);
        assert!(!config.defaults.link_previews);
        assert_eq!(config.log_filter(), "info");
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "owner": 12345,
            "auth_token": "123:abc",
            "skip_queued": false,
            "defaults": {
                "shell": "/bin/bash",
                "columns": 80,
                "rows": 24,
                "interactive": true
            }
        }"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.owner, Some(12345));
        assert_eq!(config.auth_token.as_deref(), Some("123:abc"));
        assert!(!config.skip_queued);
        assert_eq!(config.defaults.shell.as_deref(), Some("/bin/bash"));
        assert!(config.defaults.interactive);
        assert!(config.defaults.silent); // Default
        config.validate().unwrap();

        let defaults = config.context_defaults();
        assert_eq!(defaults.shell, "/bin/bash");
        assert_eq!(defaults.size, PtySize::new(24, 80));
    }

    #[test]
    fn test_wizard_config_loads() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"{ "authToken": "123:abc", "owner": -100200 }"#)
            .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.auth_token.as_deref(), Some("123:abc"));
        assert_eq!(config.owner, Some(-100200));
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{ owner: ").unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        let args = Args {
            token: Some("42:xyz".to_string()),
            owner: Some(7),
            log_level: Some("debug".to_string()),
            ..Args::default()
        };

        config.apply_args(&args);

        assert_eq!(config.auth_token.as_deref(), Some("42:xyz"));
        assert_eq!(config.owner().unwrap(), Identity(7));
        assert_eq!(config.log_filter(), "debug");
    }

    #[test]
    fn test_validate_missing_fields() {
        let mut config = Config::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("auth_token"))
        ));

        config.auth_token = Some("1:a".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("owner"));

        config.owner = Some(1);
        config.defaults.rows = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSize(40, 0))
        ));
    }

    #[test]
    fn test_load_explicit_missing_file() {
        let args = Args {
            config: Some(PathBuf::from("/nonexistent/shell-bot.json")),
            ..Args::default()
        };
        assert!(matches!(Config::load(&args), Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(json.contains("\"auth_token\""));
        assert!(json.contains("\"link_previews\""));
    }
}
