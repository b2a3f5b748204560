//! Application configuration settings.

use serde::{Deserialize, Serialize};
use url::Url;

/// Main configuration for gitdeck.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Device-flow login settings.
    pub auth: AuthConfig,
    /// GitHub REST API settings.
    pub github: GitHubConfig,
    /// Remote operation settings.
    pub sync: SyncConfig,
}

/// Authentication configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// OAuth app client id. Login is unavailable until this is set.
    pub client_id: Option<String>,
    /// Scopes requested during login.
    pub scopes: Vec<String>,
    /// Seconds added to the poll interval on each `slow_down`.
    pub slow_down_increment_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            scopes: vec![
                "repo".to_string(),
                "read:org".to_string(),
                "user:email".to_string(),
            ],
            slow_down_increment_secs: 5,
        }
    }
}

/// GitHub API client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// REST API base URL.
    #[serde(with = "url_serde")]
    pub api_url: Url,
    /// Web base URL, which hosts the OAuth endpoints.
    #[serde(with = "url_serde")]
    pub web_url: Url,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: Url::parse("https://api.github.com").expect("valid default URL"),
            web_url: Url::parse("https://github.com").expect("valid default URL"),
            timeout_secs: 30,
        }
    }
}

/// Remote operation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Fetch from the remote before every push.
    pub fetch_before_push: bool,
    /// Remote used by fetch and push.
    pub remote_name: String,
    /// Number of commits loaded into history.
    pub commit_page_size: usize,
    /// Upper bound on a single fetch, push or clone, in seconds.
    pub remote_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fetch_before_push: true,
            remote_name: "origin".to_string(),
            commit_page_size: 50,
            remote_timeout_secs: 300,
        }
    }
}

/// Custom serde module for URL serialization.
mod url_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use url::Url;

    pub fn serialize<S>(url: &Url, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(url.as_str())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Url, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Url::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Environment variables that can override configuration.
pub mod env {
    pub const API_URL: &str = "GITDECK_API_URL";
    pub const CLIENT_ID: &str = "GITDECK_CLIENT_ID";
    pub const LOG_LEVEL: &str = "GITDECK_LOG";
}

impl AppConfig {
    /// Apply environment variable overrides to the configuration.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(
            std::env::var(env::API_URL).ok(),
            std::env::var(env::CLIENT_ID).ok(),
        )
    }

    fn with_overrides(mut self, api_url: Option<String>, client_id: Option<String>) -> Self {
        if let Some(parsed) = api_url.and_then(|url| Url::parse(&url).ok()) {
            self.github.api_url = parsed;
        }
        if let Some(id) = client_id.filter(|id| !id.trim().is_empty()) {
            self.auth.client_id = Some(id.trim().to_string());
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_github() {
        let config = AppConfig::default();
        assert_eq!(config.github.api_url.as_str(), "https://api.github.com/");
        assert_eq!(config.auth.slow_down_increment_secs, 5);
        assert!(config.sync.fetch_before_push);
        assert_eq!(config.sync.remote_name, "origin");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [sync]
            fetch_before_push = false
            "#,
        )
        .unwrap();
        assert!(!config.sync.fetch_before_push);
        assert_eq!(config.sync.commit_page_size, 50);
        assert_eq!(config.auth.scopes.len(), 3);
    }

    #[test]
    fn overrides_apply_when_valid() {
        let config = AppConfig::default().with_overrides(
            Some("http://localhost:8080".to_string()),
            Some(" Iv1.abc ".to_string()),
        );
        assert_eq!(config.github.api_url.as_str(), "http://localhost:8080/");
        assert_eq!(config.auth.client_id.as_deref(), Some("Iv1.abc"));

        let unchanged = AppConfig::default()
            .with_overrides(Some("not a url".to_string()), Some("  ".to_string()));
        assert_eq!(unchanged, AppConfig::default());
    }
}
