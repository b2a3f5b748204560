//! Error types and result aliases for gitdeck.
//!
//! Every operation of the core resolves to a single [`AppError`] at the
//! caller boundary:
//! - Specific variants for each failure mode the orchestration layer knows
//! - User-friendly messages with recovery hints where one exists
//! - Helper methods for error classification
//! - Automatic conversion from common error types

use std::path::PathBuf;

use thiserror::Error;

use crate::engine::{EngineError, MergeKind};
use crate::sync::Mutation;

/// Main error type for gitdeck operations.
///
/// Use [`requires_reauth`](Self::requires_reauth) and
/// [`is_retriable`](Self::is_retriable) to decide what to tell the user.
#[derive(Error, Debug)]
pub enum AppError {
    /// A repository, branch, commit or path the system doesn't know about.
    #[error("{what} '{name}' not found.")]
    NotFound {
        /// What kind of thing was looked up.
        what: &'static str,
        /// The name or path that was looked up.
        name: String,
    },

    /// No explicit repository was given and none is active.
    #[error("No active repository. Run 'gitdeck repo use <path>' or pass --repo.")]
    NoActiveRepository,

    /// A conflicting mutating operation is already running for the repository.
    #[error("Another {operation} operation is already running for {}.", .repository.display())]
    OperationInProgress {
        /// Repository the operation targets.
        repository: PathBuf,
        /// Kind of operation that was rejected.
        operation: Mutation,
    },

    /// The git engine rejected the operation. The message is the engine's own.
    #[error("Git operation failed: {0}")]
    EngineFailure(String),

    /// Network-level failure talking to GitHub or a git remote.
    #[error("Network error: {0}. Check your connection and try again.")]
    TransportFailure(String),

    /// A merge analysis held by the caller no longer matches the branches.
    #[error("Merge analysis is out of date (was {expected}, now {actual}). Review the branches and try again.")]
    StaleMergeAnalysis {
        /// Kind the caller acted on.
        expected: MergeKind,
        /// Kind the fresh analysis returned.
        actual: MergeKind,
    },

    /// Device code expired before the user completed authorization.
    #[error("Device authorization code expired. Run 'gitdeck auth login' again and finish within the time limit.")]
    AuthExpired,

    /// The user or the provider denied the authorization request.
    #[error("Authorization was denied: {0}. Run 'gitdeck auth login' to try again.")]
    AuthDenied(String),

    /// The device flow was cancelled before it completed.
    #[error("Login was cancelled.")]
    AuthCancelled,

    /// Polling was requested before a device code was obtained.
    #[error("No device code has been requested. Run 'gitdeck auth login' to start.")]
    DeviceFlowNotStarted,

    /// User is not authenticated. No token was found.
    #[error("Not authenticated. Run 'gitdeck auth login' to authenticate.")]
    NotAuthenticated,

    /// Stored credentials are malformed or corrupted.
    #[error("Invalid credentials. Your stored token may be corrupted. Try 'gitdeck auth logout' then 'gitdeck auth login'.")]
    InvalidCredentials,

    /// Failed to access a credential storage tier.
    #[error("Failed to access credential storage: {0}")]
    CredentialStorage(String),

    /// API returned a non-success status code.
    #[error("API request failed ({status}): {message}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// API returned 401 Unauthorized.
    #[error("GitHub returned unauthorized (401). Your token may have been revoked. Run 'gitdeck auth login' to re-authenticate.")]
    Unauthorized,

    /// General configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failed to read configuration file.
    #[error("Failed to read configuration file: {0}. Check file permissions and format.")]
    ConfigRead(String),

    /// IO operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON or TOML serialization/deserialization failed.
    #[error("Data serialization error: {0}. This may indicate corrupted data.")]
    Serialization(String),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl AppError {
    /// Shorthand for [`AppError::NotFound`].
    pub fn not_found(what: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            name: name.into(),
        }
    }

    /// Checks if this error can be resolved by re-authenticating.
    #[must_use]
    pub const fn requires_reauth(&self) -> bool {
        matches!(
            self,
            Self::NotAuthenticated
                | Self::InvalidCredentials
                | Self::Unauthorized
                | Self::AuthExpired
                | Self::AuthDenied(_)
        )
    }

    /// Checks if this error is transient and a user-initiated retry might succeed.
    ///
    /// Nothing in gitdeck retries automatically; this only drives messaging.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::TransportFailure(_) | Self::OperationInProgress { .. }
        )
    }
}

/// Result type alias using [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Transport(message) => Self::TransportFailure(message),
            EngineError::BranchNotFound(name) => Self::not_found("Branch", name),
            EngineError::CommitNotFound(id) => Self::not_found("Commit", id),
            other => Self::EngineFailure(other.to_string()),
        }
    }
}

impl From<git2::Error> for AppError {
    fn from(err: git2::Error) -> Self {
        EngineError::from(err).into()
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(format!("JSON error: {err}"))
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigRead(format!("TOML parse error: {err}"))
    }
}

impl From<keyring::Error> for AppError {
    fn from(err: keyring::Error) -> Self {
        Self::CredentialStorage(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::TransportFailure("request timed out".to_string())
        } else {
            Self::TransportFailure(err.to_string())
        }
    }
}

impl From<reqwest_middleware::Error> for AppError {
    fn from(err: reqwest_middleware::Error) -> Self {
        match err {
            reqwest_middleware::Error::Reqwest(e) => e.into(),
            reqwest_middleware::Error::Middleware(e) => Self::TransportFailure(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_user_friendly() {
        assert!(AppError::NotAuthenticated
            .to_string()
            .contains("gitdeck auth login"));
        assert!(AppError::AuthExpired.to_string().contains("gitdeck auth login"));
        assert!(AppError::Unauthorized.to_string().contains("gitdeck auth login"));
        assert!(AppError::NoActiveRepository.to_string().contains("--repo"));
    }

    #[test]
    fn not_found_names_the_missing_thing() {
        let err = AppError::not_found("Repository", "/repo/a");
        let msg = err.to_string();
        assert!(msg.contains("Repository"));
        assert!(msg.contains("/repo/a"));
    }

    #[test]
    fn operation_in_progress_mentions_kind_and_path() {
        let err = AppError::OperationInProgress {
            repository: PathBuf::from("/repo/a"),
            operation: Mutation::Push,
        };
        let msg = err.to_string();
        assert!(msg.contains("push"));
        assert!(msg.contains("/repo/a"));
    }

    #[test]
    fn api_error_includes_status_and_message() {
        let err = AppError::ApiError {
            status: 404,
            message: "Not found".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("404"));
        assert!(msg.contains("Not found"));
    }

    #[test]
    fn requires_reauth_identifies_auth_errors() {
        assert!(AppError::NotAuthenticated.requires_reauth());
        assert!(AppError::AuthExpired.requires_reauth());
        assert!(AppError::AuthDenied("access_denied".to_string()).requires_reauth());
        assert!(AppError::Unauthorized.requires_reauth());
        assert!(AppError::InvalidCredentials.requires_reauth());

        assert!(!AppError::TransportFailure("down".to_string()).requires_reauth());
        assert!(!AppError::EngineFailure("conflict".to_string()).requires_reauth());
        assert!(!AppError::AuthCancelled.requires_reauth());
    }

    #[test]
    fn is_retriable_identifies_transient_errors() {
        assert!(AppError::TransportFailure("reset".to_string()).is_retriable());
        assert!(AppError::OperationInProgress {
            repository: PathBuf::from("/repo"),
            operation: Mutation::Fetch,
        }
        .is_retriable());

        assert!(!AppError::EngineFailure("bad ref".to_string()).is_retriable());
        assert!(!AppError::NotAuthenticated.is_retriable());
        assert!(!AppError::AuthExpired.is_retriable());
    }

    #[test]
    fn engine_errors_map_onto_taxonomy() {
        let transport: AppError = EngineError::Transport("connection refused".to_string()).into();
        assert!(matches!(transport, AppError::TransportFailure(_)));

        let branch: AppError = EngineError::BranchNotFound("feature".to_string()).into();
        assert!(matches!(branch, AppError::NotFound { what: "Branch", .. }));

        let conflict: AppError = EngineError::Conflict("src/lib.rs".to_string()).into();
        match conflict {
            AppError::EngineFailure(message) => assert!(message.contains("src/lib.rs")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: AppError = json_err.into();
        assert!(matches!(err, AppError::Serialization(_)));
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: AppError = io_err.into();
        assert!(matches!(err, AppError::Io(_)));
    }

    #[test]
    fn from_url_parse_error() {
        let url_err = url::Url::parse("not a url").unwrap_err();
        let err: AppError = url_err.into();
        assert!(matches!(err, AppError::InvalidUrl(_)));
    }
}
