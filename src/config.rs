use anyhow::{anyhow, Context, Result};
use cron::Schedule;
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::account::RepoType;

/// Main configuration structure for repoharvest
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Organization accounts, keyed by label
    #[serde(default)]
    pub organizations: BTreeMap<String, AccountConfig>,

    /// User accounts, keyed by label
    #[serde(default)]
    pub users: BTreeMap<String, AccountConfig>,

    /// Repository type filter used by organizations without an explicit option
    #[serde(default = "default_org_repo_type")]
    pub org_repo_type: String,

    /// Cron expression (sec min hour day month weekday)
    #[serde(default = "default_update_interval")]
    pub update_interval: String,

    /// GitHub API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// One organization or user entry
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct AccountConfig {
    /// Organization login or user display name
    #[serde(default)]
    pub name: String,

    /// Personal access token; `${VAR}` references are expanded
    #[serde(default)]
    pub token: String,

    /// Repository type (organizations) or affiliation (users)
    #[serde(default)]
    pub option: String,

    /// Require `name` to appear in every repository full name
    #[serde(default)]
    pub validate_name: bool,

    /// Whether this account takes part in scheduled enumeration
    #[serde(default = "default_true")]
    pub backup_repos: bool,
}

/// GitHub API configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    /// API root, override for GitHub Enterprise
    #[serde(default = "default_api_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"

    /// Log format
    #[serde(default = "default_log_format")]
    pub format: String, // "compact", "pretty", "full"

    /// Enable colored output
    #[serde(default = "default_true")]
    pub color: bool,
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_org_repo_type() -> String {
    "all".to_string()
}
fn default_update_interval() -> String {
    "0 */12 * * * *".to_string()
}
fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}
fn default_timeout() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            timeout: default_timeout(),
        }
    }
}

impl ApiConfig {
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            color: default_true(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, writing the default config there first if it is missing
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }

        let config = Self::default();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        config.save(path)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config
            .validate()
            .with_context(|| format!("Invalid configuration in {:?}", path))?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("repoharvest").join("config.yml"))
    }

    /// Parse the update interval into a cron schedule.
    ///
    /// Numeric weekdays follow standard cron (0 or 7 is Sunday, 1 is Monday).
    pub fn schedule(&self) -> Result<Schedule> {
        let expression = standard_weekdays(self.update_interval.trim())
            .with_context(|| format!("Invalid update_interval '{}'", self.update_interval))?;

        Schedule::from_str(&expression).map_err(|e| {
            anyhow!(
                "Invalid update_interval '{}': {} (expected 6 fields: sec min hour day month weekday)",
                self.update_interval,
                e
            )
        })
    }

    /// Check process-wide settings. Per-account problems are reported by the roster instead.
    pub fn validate(&self) -> Result<()> {
        self.schedule()?;

        self.org_repo_type
            .parse::<RepoType>()
            .map_err(|e| anyhow!("Invalid org_repo_type: {}", e))?;

        reqwest::Url::parse(&self.api.base_url)
            .with_context(|| format!("Invalid api.base_url: {}", self.api.base_url))?;

        if self.api.timeout == 0 {
            return Err(anyhow!("api.timeout must be at least one second"));
        }

        Ok(())
    }
}

/// The `cron` crate numbers weekdays 1 (Sunday) to 7 (Saturday). Shift numeric
/// weekdays of a 6/7 field expression from standard 0-7 numbering to that scheme.
fn standard_weekdays(expression: &str) -> Result<String> {
    const WEEKDAY_FIELD: usize = 5;

    let mut fields: Vec<String> = expression.split_whitespace().map(String::from).collect();
    if !(6..=7).contains(&fields.len()) {
        return Ok(expression.to_string());
    }

    let items = fields[WEEKDAY_FIELD]
        .split(',')
        .map(shift_weekday_item)
        .collect::<Result<Vec<_>>>()?;
    fields[WEEKDAY_FIELD] = items.join(",");

    Ok(fields.join(" "))
}

/// One comma-separated weekday item: `*`, `N`, `A-B`, each optionally `/step`
fn shift_weekday_item(item: &str) -> Result<String> {
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, Some(step)),
        None => (item, None),
    };
    let suffix = step.map(|step| format!("/{}", step)).unwrap_or_default();

    match range.split_once('-') {
        Some((start, end)) => {
            let start = shift_weekday(start)?;
            if end.trim() == "7" {
                // Range up to Sunday: wrap Sunday around to the crate's day 1
                if step.is_some() {
                    return Err(anyhow!("weekday range '{}' ending in 7 cannot take a step", item));
                }
                return Ok(format!("{}-7,1", start));
            }
            Ok(format!("{}-{}{}", start, shift_weekday(end)?, suffix))
        }
        None => Ok(format!("{}{}", shift_weekday(range)?, suffix)),
    }
}

fn shift_weekday(value: &str) -> Result<String> {
    match value.trim().parse::<u8>() {
        Ok(7) => Ok("1".to_string()),
        Ok(day @ 0..=6) => Ok((day + 1).to_string()),
        Ok(day) => Err(anyhow!("weekday {} is out of range (0-7)", day)),
        // Names (MON, Fri) and wildcards are passed through unchanged
        Err(_) => Ok(value.to_string()),
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut organizations = BTreeMap::new();
        organizations.insert(
            "1st".to_string(),
            AccountConfig {
                name: "my-org".to_string(),
                token: String::new(),
                option: "all".to_string(),
                validate_name: false,
                backup_repos: true,
            },
        );

        let mut users = BTreeMap::new();
        users.insert(
            "1st".to_string(),
            AccountConfig {
                name: "my-user".to_string(),
                token: String::new(),
                option: "owner".to_string(),
                validate_name: false,
                backup_repos: true,
            },
        );

        Self {
            organizations,
            users,
            org_repo_type: default_org_repo_type(),
            update_interval: default_update_interval(),
            api: ApiConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
