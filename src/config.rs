//! Runtime configuration resolved from the command line and environment
//!
//! Paths default to the platform directories (`~/.cache/foodlog/` for the
//! nutrition cache and `~/.local/share/foodlog/` for the food log on Linux);
//! `--data-dir` puts both files in one directory instead.

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use thiserror::Error;

use crate::cli::Cli;

/// File name of the nutrition cache
pub const CACHE_FILE_NAME: &str = "nutrition_cache.json";

/// File name of the daily food log
pub const LEDGER_FILE_NAME: &str = "user_data.json";

/// Errors resolving configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No home directory to derive default paths from
    #[error("could not determine a data directory; pass --data-dir or set FOODLOG_DATA_DIR")]
    NoDataDir,
}

/// AI API connection settings
#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

/// Everything the application needs to start
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub cache_path: PathBuf,
    pub ledger_path: PathBuf,
    /// Whether AI estimation is on when a command does not say
    pub use_ai_default: bool,
    pub lock_timeout: Duration,
    /// `None` when no API key is configured
    pub openai: Option<OpenAiSettings>,
}

impl AppConfig {
    /// Creates an AppConfig from parsed CLI arguments.
    ///
    /// # Returns
    /// * `Ok(AppConfig)` with resolved paths and settings
    /// * `Err(ConfigError)` if no data directory was given and none can be derived
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let (cache_path, ledger_path) = match &cli.data_dir {
            Some(dir) => (dir.join(CACHE_FILE_NAME), dir.join(LEDGER_FILE_NAME)),
            None => {
                let dirs = ProjectDirs::from("", "", "foodlog").ok_or(ConfigError::NoDataDir)?;
                (
                    dirs.cache_dir().join(CACHE_FILE_NAME),
                    dirs.data_dir().join(LEDGER_FILE_NAME),
                )
            }
        };

        let openai = cli
            .openai
            .openai_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(|key| OpenAiSettings {
                api_key: key.to_string(),
                model: cli.openai.openai_model.clone(),
                base_url: cli.openai.openai_base_url.clone(),
            });

        Ok(AppConfig {
            cache_path,
            ledger_path,
            use_ai_default: cli.use_ai_default,
            lock_timeout: Duration::from_secs(cli.lock_timeout_secs),
            openai,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        let mut full = vec!["foodlog"];
        full.extend_from_slice(args);
        full.extend_from_slice(&["cache", "stats"]);
        Cli::parse_from(full)
    }

    #[test]
    fn test_data_dir_holds_both_files() {
        let cli = parse(&["--data-dir", "/srv/food"]);
        let config = AppConfig::from_cli(&cli).expect("Config should resolve");

        assert_eq!(config.cache_path, PathBuf::from("/srv/food/nutrition_cache.json"));
        assert_eq!(config.ledger_path, PathBuf::from("/srv/food/user_data.json"));
    }

    #[test]
    fn test_default_paths_use_project_dirs() {
        let cli = parse(&[]);
        if cli.data_dir.is_some() {
            // FOODLOG_DATA_DIR is set in this environment.
            return;
        }
        if let Ok(config) = AppConfig::from_cli(&cli) {
            assert!(config.cache_path.to_string_lossy().contains("foodlog"));
            assert!(config.cache_path.ends_with(CACHE_FILE_NAME));
            assert!(config.ledger_path.ends_with(LEDGER_FILE_NAME));
        }
        // Test passes if no home directory is available (e.g. in CI)
    }

    #[test]
    fn test_api_key_enables_openai_settings() {
        let cli = parse(&[
            "--data-dir",
            "/tmp/x",
            "--openai-api-key",
            "sk-test",
            "--openai-model",
            "gpt-4o-mini",
        ]);
        let config = AppConfig::from_cli(&cli).expect("Config should resolve");

        let openai = config.openai.expect("Key should enable AI settings");
        assert_eq!(openai.api_key, "sk-test");
        assert_eq!(openai.model, "gpt-4o-mini");
    }

    #[test]
    fn test_blank_api_key_is_ignored() {
        let cli = parse(&["--data-dir", "/tmp/x", "--openai-api-key", "  "]);
        let config = AppConfig::from_cli(&cli).expect("Config should resolve");

        assert!(config.openai.is_none());
    }

    #[test]
    fn test_ai_default_and_lock_timeout() {
        let cli = parse(&["--data-dir", "/tmp/x", "--ai-default", "TRUE", "--lock-timeout-secs", "2"]);
        let config = AppConfig::from_cli(&cli).expect("Config should resolve");

        assert!(config.use_ai_default);
        assert_eq!(config.lock_timeout, Duration::from_secs(2));
    }
}
