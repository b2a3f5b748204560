//! Engine-side error types.
//!
//! [`EngineError`] classifies what libgit2 reports so the crate-level
//! [`AppError`](crate::error::AppError) can tell transport problems apart
//! from engine rejections.

use thiserror::Error;

/// Errors reported by the git engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Path is not a git repository.
    #[error("'{0}' is not a git repository.")]
    NotARepository(String),

    /// Branch not found.
    #[error("Branch '{0}' not found.")]
    BranchNotFound(String),

    /// Commit not found or not a valid object id.
    #[error("Commit '{0}' not found.")]
    CommitNotFound(String),

    /// Conflict during checkout or merge.
    #[error("conflicts prevent the operation: {0}")]
    Conflict(String),

    /// The remote rejected a reference update.
    #[error("remote rejected the update: {0}")]
    Rejected(String),

    /// Network or authentication failure while talking to a remote.
    #[error("{0}")]
    Transport(String),

    /// General libgit2 error, message passed through verbatim.
    #[error("{0}")]
    Git2(String),
}

impl From<git2::Error> for EngineError {
    fn from(err: git2::Error) -> Self {
        use git2::{ErrorClass, ErrorCode};

        match (err.class(), err.code()) {
            (ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssh | ErrorClass::Ssl, _)
            | (_, ErrorCode::Auth | ErrorCode::Certificate) => {
                Self::Transport(err.message().to_string())
            },
            (_, ErrorCode::Conflict | ErrorCode::MergeConflict)
            // git2 reports GIT_EMERGECONFLICT as a generic code, so the class decides.
            | (
                ErrorClass::Merge | ErrorClass::Checkout,
                ErrorCode::GenericError | ErrorCode::Unmerged,
            ) => Self::Conflict(err.message().to_string()),
            _ => Self::Git2(err.message().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git2_network_errors_are_transport() {
        let err = git2::Error::new(
            git2::ErrorCode::GenericError,
            git2::ErrorClass::Net,
            "failed to connect",
        );
        assert!(matches!(EngineError::from(err), EngineError::Transport(_)));
    }

    #[test]
    fn git2_merge_conflicts_are_conflicts() {
        let err = git2::Error::new(
            git2::ErrorCode::MergeConflict,
            git2::ErrorClass::Merge,
            "conflicts in README.md",
        );
        assert!(matches!(EngineError::from(err), EngineError::Conflict(_)));
    }

    #[test]
    fn git2_checkout_conflicts_are_conflicts() {
        let err = git2::Error::new(
            git2::ErrorCode::Conflict,
            git2::ErrorClass::Checkout,
            "1 conflict prevents checkout",
        );
        assert!(matches!(EngineError::from(err), EngineError::Conflict(_)));
    }

    #[test]
    fn other_merge_failures_pass_through() {
        let err = git2::Error::new(
            git2::ErrorCode::NotFound,
            git2::ErrorClass::Merge,
            "no merge base found",
        );
        assert!(matches!(EngineError::from(err), EngineError::Git2(_)));
    }

    #[test]
    fn error_messages_are_user_friendly() {
        let branch = EngineError::BranchNotFound("feature/test".to_string());
        assert!(branch.to_string().contains("feature/test"));

        let git = EngineError::Git2("invalid reference".to_string());
        assert_eq!(git.to_string(), "invalid reference");
    }
}
