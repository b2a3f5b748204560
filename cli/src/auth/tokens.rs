//! Token types for authentication.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Access token obtained through the device flow.
///
/// GitHub device-flow tokens do not expire and carry no refresh token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    /// The bearer token.
    pub access_token: String,
    /// Token type (usually "bearer").
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Granted scopes, space separated.
    #[serde(default)]
    pub scope: Option<String>,
    /// When the token was issued to us.
    pub obtained_at: DateTime<Utc>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl TokenSet {
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
            scope: None,
            obtained_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_scope(mut self, scope: Option<String>) -> Self {
        self.scope = scope.filter(|s| !s.is_empty());
        self
    }

    /// Granted scopes as a list.
    pub fn scopes(&self) -> Vec<&str> {
        self.scope
            .as_deref()
            .map(|s| s.split([' ', ',']).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_token() {
        let token = TokenSet::new("gho_secret");
        let debug = format!("{token:?}");
        assert!(!debug.contains("gho_secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn scopes_accept_space_or_comma_separators() {
        let token = TokenSet::new("t").with_scope(Some("repo,read:org user:email".to_string()));
        assert_eq!(token.scopes(), vec!["repo", "read:org", "user:email"]);
        assert!(TokenSet::new("t").with_scope(Some(String::new())).scopes().is_empty());
    }

    #[test]
    fn deserializes_minimal_json() {
        let token: TokenSet =
            serde_json::from_str(r#"{"access_token":"abc","obtained_at":"2024-01-01T00:00:00Z"}"#)
                .unwrap();
        assert_eq!(token.access_token, "abc");
        assert_eq!(token.token_type, "bearer");
    }
}
