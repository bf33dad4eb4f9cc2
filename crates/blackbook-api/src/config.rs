use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub db_path: PathBuf,
    /// JSON file mapping account email to a Google bearer token
    pub google_tokens_file: Option<PathBuf>,
    pub call_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "BLACKBOOK_API_BIND_ADDR", "127.0.0.1:8080");
        let db_path =
            PathBuf::from(value_or_default(&lookup, "BLACKBOOK_DB_PATH", "blackbook.db"));
        let google_tokens_file =
            optional_trimmed(&lookup, "BLACKBOOK_GOOGLE_TOKENS_FILE").map(PathBuf::from);

        let call_timeout_secs = value_or_default(&lookup, "BLACKBOOK_CALL_TIMEOUT_SECS", "30")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::Invalid(
                    "BLACKBOOK_CALL_TIMEOUT_SECS must be an integer in [5, 300]".to_string(),
                )
            })?;
        if !(5..=300).contains(&call_timeout_secs) {
            return Err(ConfigError::Invalid(
                "BLACKBOOK_CALL_TIMEOUT_SECS must be in [5, 300]".to_string(),
            ));
        }

        Ok(Self {
            bind_addr,
            db_path,
            google_tokens_file,
            call_timeout: Duration::from_secs(call_timeout_secs),
        })
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn config_defaults() {
        let map: HashMap<&str, &str> = HashMap::new();
        let config =
            AppConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string())).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.db_path, PathBuf::from("blackbook.db"));
        assert!(config.google_tokens_file.is_none());
        assert_eq!(config.call_timeout, Duration::from_secs(30));
    }

    #[test]
    fn config_rejects_out_of_range_timeout() {
        let mut map = HashMap::new();
        map.insert("BLACKBOOK_CALL_TIMEOUT_SECS", "0");
        let err = AppConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("BLACKBOOK_CALL_TIMEOUT_SECS"));
    }

    #[test]
    fn config_reads_overrides() {
        let mut map = HashMap::new();
        map.insert("BLACKBOOK_API_BIND_ADDR", "0.0.0.0:9000");
        map.insert("BLACKBOOK_DB_PATH", "/var/lib/blackbook/book.db");
        map.insert("BLACKBOOK_GOOGLE_TOKENS_FILE", "/etc/blackbook/tokens.json");
        let config =
            AppConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string())).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(
            config.google_tokens_file,
            Some(PathBuf::from("/etc/blackbook/tokens.json"))
        );
    }
}
