//! Configuration management for bastion.
//!
//! Loads configuration from ${BASTION_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::output::DEFAULT_BUDGET;
use crate::platform::UserId;

pub mod paths {
    //! Path resolution for configuration and data.
    //!
    //! BASTION_HOME resolution order:
    //! 1. BASTION_HOME environment variable (if set)
    //! 2. ~/.config/bastion (default)
    //! 3. ./.bastion when no home directory can be determined

    use std::path::PathBuf;

    pub fn bastion_home() -> PathBuf {
        if let Ok(home) = std::env::var("BASTION_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".bastion"),
            |h| h.join(".config").join("bastion"),
        )
    }

    pub fn config_path() -> PathBuf {
        bastion_home().join("config.toml")
    }

    pub fn default_database_path() -> PathBuf {
        bastion_home().join("bastion.db")
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// Also write logs to this file.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Staff bot token. Falls back to `BASTION_DISCORD_TOKEN`.
    pub bot_token: Option<String>,

    /// Prefix that marks a message as a command.
    pub command_prefix: String,

    /// SQLite database file. Defaults to `${BASTION_HOME}/bastion.db`.
    pub database_path: Option<PathBuf>,

    /// Users allowed to run the `sql` and `config` commands.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub admin_user_ids: Vec<UserId>,

    /// Upper bound on a single reply, in characters.
    pub output_budget: usize,

    /// How long a `sql` session waits for commit/rollback.
    pub sql_confirm_timeout_secs: u64,

    /// How long a relay reply waits for the reply mode.
    pub relay_confirm_timeout_secs: u64,

    /// Rows fetched per statement before the table is marked truncated.
    pub max_fetch_rows: usize,

    #[serde(default)]
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_token: None,
            command_prefix: Self::DEFAULT_PREFIX.to_string(),
            database_path: None,
            admin_user_ids: Vec::new(),
            output_budget: DEFAULT_BUDGET,
            sql_confirm_timeout_secs: Self::DEFAULT_SQL_CONFIRM_SECS,
            relay_confirm_timeout_secs: Self::DEFAULT_RELAY_CONFIRM_SECS,
            max_fetch_rows: Self::DEFAULT_MAX_FETCH_ROWS,
            log: LogConfig::default(),
        }
    }
}

impl Config {
    const DEFAULT_PREFIX: &str = "!";
    const DEFAULT_SQL_CONFIRM_SECS: u64 = 60;
    const DEFAULT_RELAY_CONFIRM_SECS: u64 = 120;
    const DEFAULT_MAX_FETCH_ROWS: usize = 1000;
    const TOKEN_ENV: &str = "BASTION_DISCORD_TOKEN";

    /// Loads configuration from the default config path.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Token from the config file, else from the environment.
    pub fn resolve_token(&self) -> Option<String> {
        self.bot_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .or_else(|| {
                std::env::var(Self::TOKEN_ENV)
                    .ok()
                    .map(|token| token.trim().to_string())
                    .filter(|token| !token.is_empty())
            })
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(paths::default_database_path)
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.admin_user_ids.contains(&user_id)
    }

    pub fn sql_confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.sql_confirm_timeout_secs)
    }

    pub fn relay_confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.relay_confirm_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn missing_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.toml")).unwrap();

        assert_eq!(config.command_prefix, "!");
        assert_eq!(config.output_budget, 2000);
        assert_eq!(config.sql_confirm_timeout(), Duration::from_secs(60));
        assert_eq!(config.relay_confirm_timeout(), Duration::from_secs(120));
        assert_eq!(config.max_fetch_rows, 1000);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn partial_config_merges_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "command_prefix = \"?\"\nadmin_user_ids = [1, 2]\n\n[log]\nlevel = \"debug\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.command_prefix, "?");
        assert!(config.is_admin(2));
        assert!(!config.is_admin(3));
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.output_budget, 2000);
    }

    #[test]
    fn invalid_toml_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "output_budget = \"lots\"").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config"));
    }

    #[test]
    fn token_from_file_is_trimmed() {
        let config = Config {
            bot_token: Some("  abc  ".to_string()),
            ..Config::default()
        };
        assert_eq!(config.resolve_token().as_deref(), Some("abc"));
    }

    #[test]
    fn explicit_database_path_wins() {
        let config = Config {
            database_path: Some(PathBuf::from("/tmp/x.db")),
            ..Config::default()
        };
        assert_eq!(config.database_path(), PathBuf::from("/tmp/x.db"));
    }
}
