//! Server configuration.
//!
//! Built once at startup from environment variables (after `.env` has been
//! loaded) and shared with the handlers through the server state.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::conversations::reply_scheduler::DEFAULT_REPLY_DELAY;
use crate::llm::gemini::DEFAULT_GEMINI_URL;

/// Default server port.
pub const DEFAULT_PORT: u16 = 5000;

/// Default state file.
pub const DEFAULT_DATA_FILE: &str = "chat_data.json";

/// Default front-end directory.
pub const DEFAULT_STATIC_DIR: &str = "static";

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Gemini API key; generation is disabled without it.
    pub gemini_api_key: Option<String>,
    /// Gemini `generateContent` endpoint.
    pub gemini_url: String,
    /// Listen port.
    pub port: u16,
    /// JSON state file.
    pub data_file: PathBuf,
    /// Directory served for non-API paths.
    pub static_dir: PathBuf,
    /// Delay before an automatic reply is generated.
    pub reply_delay: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_url: DEFAULT_GEMINI_URL.to_string(),
            port: DEFAULT_PORT,
            data_file: PathBuf::from(DEFAULT_DATA_FILE),
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            reply_delay: DEFAULT_REPLY_DELAY,
        }
    }
}

impl ServerConfig {
    /// Build the configuration from environment variables.
    ///
    /// | Variable                 | Default            | Description                    |
    /// |--------------------------|--------------------|--------------------------------|
    /// | `GEMINI_API_KEY`         | unset              | API key for generation         |
    /// | `GEMINI_API_URL`         | gemini-2.0-flash   | generation endpoint            |
    /// | `GEMCHAT_PORT`           | `5000`             | HTTP listen port               |
    /// | `GEMCHAT_DATA_FILE`      | `chat_data.json`   | state file                     |
    /// | `GEMCHAT_STATIC_DIR`     | `static`           | front-end directory            |
    /// | `GEMCHAT_REPLY_DELAY_MS` | `2000`             | delay before an automatic reply|
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    ///
    /// Empty values count as unset; unparsable numbers fall back to defaults.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        Self {
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_url: get("GEMINI_API_URL").unwrap_or(defaults.gemini_url),
            port: get("GEMCHAT_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            data_file: get("GEMCHAT_DATA_FILE").map_or(defaults.data_file, PathBuf::from),
            static_dir: get("GEMCHAT_STATIC_DIR").map_or(defaults.static_dir, PathBuf::from),
            reply_delay: get("GEMCHAT_REPLY_DELAY_MS")
                .and_then(|ms| ms.parse().ok())
                .map_or(defaults.reply_delay, Duration::from_millis),
        }
    }

    /// Whether an API key is available.
    #[must_use]
    pub const fn api_configured(&self) -> bool {
        self.gemini_api_key.is_some()
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if the Gemini URL is not an absolute http(s) URL.
    pub fn validate(&self) -> Result<(), url::ParseError> {
        let url = Url::parse(&self.gemini_url)?;
        if url.scheme() == "http" || url.scheme() == "https" {
            Ok(())
        } else {
            Err(url::ParseError::RelativeUrlWithoutBase)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> ServerConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ServerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.port, 5000);
        assert_eq!(config.reply_delay, Duration::from_secs(2));
        assert!(!config.api_configured());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("GEMINI_API_KEY", "abc"),
            ("GEMINI_API_URL", "http://localhost:8080/generate"),
            ("GEMCHAT_PORT", "8081"),
            ("GEMCHAT_DATA_FILE", "/tmp/state.json"),
            ("GEMCHAT_STATIC_DIR", "web"),
            ("GEMCHAT_REPLY_DELAY_MS", "50"),
        ]);

        assert_eq!(config.gemini_api_key.as_deref(), Some("abc"));
        assert!(config.api_configured());
        assert_eq!(config.port, 8081);
        assert_eq!(config.data_file, PathBuf::from("/tmp/state.json"));
        assert_eq!(config.static_dir, PathBuf::from("web"));
        assert_eq!(config.reply_delay, Duration::from_millis(50));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_blank_and_invalid_values_fall_back() {
        let config = config_from(&[("GEMINI_API_KEY", "  "), ("GEMCHAT_PORT", "nope")]);
        assert!(config.gemini_api_key.is_none());
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let config = config_from(&[("GEMINI_API_URL", "not a url")]);
        assert!(config.validate().is_err());

        let ftp = config_from(&[("GEMINI_API_URL", "ftp://example.com/x")]);
        assert!(ftp.validate().is_err());
    }
}
