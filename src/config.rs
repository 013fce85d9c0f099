//! Configuration for threadview.
//!
//! Loads `config.toml` from the threadview home directory, falling back to
//! defaults when the file does not exist.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

pub const BEARER_TOKEN_ENV: &str = "THREADVIEW_BEARER_TOKEN";

pub mod paths {
    //! Home directory resolution:
    //! 1. `THREADVIEW_HOME` if set
    //! 2. `<config dir>/threadview`

    use std::path::PathBuf;

    pub fn threadview_home() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("THREADVIEW_HOME") {
            return Some(PathBuf::from(home));
        }

        dirs::config_dir().map(|dir| dir.join("threadview"))
    }

    pub fn config_path() -> Option<PathBuf> {
        threadview_home().map(|home| home.join("config.toml"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL for the v1.1 REST API
    pub api_url: String,

    pub bearer_token: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Longest thread a resolution will walk before giving up
    pub max_chain_length: usize,

    /// Simultaneous outbound API requests
    pub api_concurrency: usize,

    /// Simultaneous tweet render tasks
    pub render_concurrency: usize,

    pub wrap_width: usize,

    /// IANA zone used to display timestamps
    pub timezone: String,

    pub lookahead: LookaheadConfig,

    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "https://api.twitter.com".into(),
            bearer_token: None,
            timeout_secs: 10,
            max_chain_length: 1000,
            api_concurrency: 4,
            render_concurrency: 4,
            wrap_width: 80,
            timezone: "UTC".into(),
            lookahead: LookaheadConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookaheadConfig {
    pub enabled: bool,

    /// Wait for an outstanding lookahead before fetching the next hop directly
    pub await_pending: bool,

    /// Tweets per timeline page (Twitter caps this at 200)
    pub page_size: u32,

    /// Timeline pages to walk back per lookahead
    pub max_pages: u32,
}

impl Default for LookaheadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            await_pending: true,
            page_size: 200,
            max_pages: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 250,
            max_delay_ms: 4000,
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Config {
    /// Loads configuration from `path`, or from the default location when
    /// `path` is `None`. The bearer token environment variable always wins.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path: Option<PathBuf> = match path {
            Some(path) => Some(path.to_path_buf()),
            None => paths::config_path(),
        };

        let mut config = match path {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };

        if let Ok(token) = std::env::var(BEARER_TOKEN_ENV) {
            config.bearer_token = Some(token);
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if the file doesn't exist.
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

    pub fn validate(&self) -> Result<()> {
        if self.max_chain_length == 0 {
            bail!("max_chain_length must be at least 1");
        }
        if self.api_concurrency == 0 || self.render_concurrency == 0 {
            bail!("api_concurrency and render_concurrency must be at least 1");
        }
        if !(1..=200).contains(&self.lookahead.page_size) {
            bail!(
                "lookahead.page_size must be between 1 and 200, got {}",
                self.lookahead.page_size
            );
        }
        if self.lookahead.max_pages == 0 {
            bail!("lookahead.max_pages must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        if self.timeout_secs == 0 {
            bail!("timeout_secs must be at least 1");
        }
        self.time_zone()?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn time_zone(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse()
            .map_err(|_| anyhow::anyhow!("unknown timezone {:?}", self.timezone))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
max_chain_length = 25
timezone = "Europe/Berlin"

[lookahead]
max_pages = 3

[retry]
max_attempts = 5
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.max_chain_length, 25);
        assert_eq!(config.lookahead.max_pages, 3);
        assert_eq!(config.lookahead.page_size, 200);
        assert!(config.lookahead.await_pending);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_delay_ms, 250);
        assert_eq!(config.api_url, "https://api.twitter.com");
        assert_eq!(config.time_zone().unwrap(), chrono_tz::Europe::Berlin);
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_toml_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "max_chain_length = \"many\"").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_chain = Config {
            max_chain_length: 0,
            ..Config::default()
        };
        assert!(zero_chain.validate().is_err());

        let mut big_page = Config::default();
        big_page.lookahead.page_size = 500;
        assert!(big_page.validate().is_err());

        let no_workers = Config {
            api_concurrency: 0,
            ..Config::default()
        };
        assert!(no_workers.validate().is_err());

        let no_pages = Config {
            lookahead: LookaheadConfig {
                max_pages: 0,
                ..LookaheadConfig::default()
            },
            ..Config::default()
        };
        assert!(no_pages.validate().is_err());

        let zero_timeout = Config {
            timeout_secs: 0,
            ..Config::default()
        };
        assert!(zero_timeout.validate().is_err());

        let bad_zone = Config {
            timezone: "Mars/Olympus".into(),
            ..Config::default()
        };
        assert!(bad_zone.validate().is_err());
    }

    #[test]
    fn test_retry_durations() {
        let retry = RetryConfig::default();
        assert_eq!(retry.initial_delay(), Duration::from_millis(250));
        assert_eq!(retry.max_delay(), Duration::from_millis(4000));
    }
}
