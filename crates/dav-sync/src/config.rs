//! Client configuration
//!
//! `DavConfig` can be deserialized, built in code, or read from `DAV_*`
//! environment variables.

use dav_api::TableId;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const PRODUCTION_API_URL: &str = "https://api.dav-apps.tech/v1";
pub const DEVELOPMENT_API_URL: &str = "http://localhost:3111/v1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing configuration value {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl std::str::FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ConfigError::Invalid {
                key: "DAV_ENVIRONMENT",
                value: s.to_string(),
                reason: "expected development, test or production".to_string(),
            }),
        }
    }
}

/// When a saved object is pushed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushOnSave {
    /// Wait for the next sync pass
    Disabled,
    /// Start a push-only pass without waiting for it
    #[default]
    Background,
    /// Run a push-only pass before returning
    Inline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DavConfig {
    #[serde(default)]
    pub environment: Environment,
    pub app_id: i32,
    pub table_ids: Vec<TableId>,
    #[serde(default)]
    pub parallel_table_ids: Vec<TableId>,
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub push_on_save: PushOnSave,
}

fn default_page_size() -> u32 {
    50
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl DavConfig {
    pub fn new(app_id: i32, table_ids: Vec<TableId>) -> Self {
        Self {
            environment: Environment::default(),
            app_id,
            table_ids,
            parallel_table_ids: Vec::new(),
            api_base_url: None,
            page_size: default_page_size(),
            request_timeout_secs: default_request_timeout_secs(),
            push_on_save: PushOnSave::default(),
        }
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_parallel_tables(mut self, parallel_table_ids: Vec<TableId>) -> Self {
        self.parallel_table_ids = parallel_table_ids;
        self
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_push_on_save(mut self, push_on_save: PushOnSave) -> Self {
        self.push_on_save = push_on_save;
        self
    }

    /// Base URL of the API: the override if set, otherwise the environment's default
    pub fn api_base_url(&self) -> &str {
        match (&self.api_base_url, self.environment) {
            (Some(url), _) => url.trim_end_matches('/'),
            (None, Environment::Production) => PRODUCTION_API_URL,
            (None, _) => DEVELOPMENT_API_URL,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table_ids.is_empty() {
            return Err(ConfigError::Missing("table_ids"));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid {
                key: "page_size",
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key lookup, using the `DAV_*` variable names
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let app_id_raw = lookup("DAV_APP_ID").ok_or(ConfigError::Missing("DAV_APP_ID"))?;
        let app_id = parse_number("DAV_APP_ID", &app_id_raw)?;
        let table_ids = parse_ids(
            "DAV_TABLE_IDS",
            &lookup("DAV_TABLE_IDS").ok_or(ConfigError::Missing("DAV_TABLE_IDS"))?,
        )?;

        let mut config = DavConfig::new(app_id, table_ids);
        if let Some(raw) = lookup("DAV_ENVIRONMENT") {
            config.environment = raw.parse()?;
        }
        if let Some(raw) = lookup("DAV_PARALLEL_TABLE_IDS") {
            config.parallel_table_ids = parse_ids("DAV_PARALLEL_TABLE_IDS", &raw)?;
        }
        if let Some(raw) = lookup("DAV_API_BASE_URL") {
            config.api_base_url = Some(raw);
        }
        if let Some(raw) = lookup("DAV_PAGE_SIZE") {
            config.page_size = parse_number("DAV_PAGE_SIZE", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_number<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_ids(key: &'static str, raw: &str) -> Result<Vec<TableId>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| parse_number(key, part))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_reads_all_settings() {
        let config = DavConfig::from_lookup(lookup(&[
            ("DAV_ENVIRONMENT", "production"),
            ("DAV_APP_ID", "6"),
            ("DAV_TABLE_IDS", "12, 15,19"),
            ("DAV_PARALLEL_TABLE_IDS", "15,19"),
            ("DAV_PAGE_SIZE", "100"),
        ]))
        .unwrap();

        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.app_id, 6);
        assert_eq!(config.table_ids, vec![12, 15, 19]);
        assert_eq!(config.parallel_table_ids, vec![15, 19]);
        assert_eq!(config.page_size, 100);
        assert_eq!(config.api_base_url(), PRODUCTION_API_URL);
    }

    #[test]
    fn test_environment_selects_base_url() {
        let config = DavConfig::new(1, vec![1]);
        assert_eq!(config.api_base_url(), DEVELOPMENT_API_URL);
        assert_ne!(
            config.clone().with_environment(Environment::Production).api_base_url(),
            config.api_base_url()
        );
        assert_eq!(
            config.with_api_base_url("http://dav.test/v1/").api_base_url(),
            "http://dav.test/v1"
        );
    }

    #[test]
    fn test_missing_and_invalid_values() {
        assert_eq!(
            DavConfig::from_lookup(lookup(&[("DAV_TABLE_IDS", "1")])),
            Err(ConfigError::Missing("DAV_APP_ID"))
        );
        assert!(matches!(
            DavConfig::from_lookup(lookup(&[("DAV_APP_ID", "1"), ("DAV_TABLE_IDS", "1,x")])),
            Err(ConfigError::Invalid { key: "DAV_TABLE_IDS", .. })
        ));
        assert_eq!(
            DavConfig::from_lookup(lookup(&[("DAV_APP_ID", "1"), ("DAV_TABLE_IDS", " ")])),
            Err(ConfigError::Missing("table_ids"))
        );
        assert!(matches!(
            DavConfig::from_lookup(lookup(&[
                ("DAV_APP_ID", "1"),
                ("DAV_TABLE_IDS", "1"),
                ("DAV_PAGE_SIZE", "0"),
            ])),
            Err(ConfigError::Invalid { key: "page_size", .. })
        ));
    }

    #[test]
    fn test_deserialize_applies_defaults() {
        let config: DavConfig =
            serde_json::from_str(r#"{"app_id": 3, "table_ids": [4, 5]}"#).unwrap();
        assert_eq!(config.page_size, 50);
        assert_eq!(config.push_on_save, PushOnSave::Background);
        assert_eq!(config.environment, Environment::Development);
    }
}
