//! Run-level error taxonomy and terminal outcomes.

use browser_driver::BrowserError;
use gh_secrets::SecretStoreError;
use thiserror::Error;

/// Result alias for the keep-alive run.
pub type Result<T> = std::result::Result<T, RunError>;

/// Everything that can end a run early.
#[derive(Debug, Error)]
pub enum RunError {
    /// Missing or malformed configuration; raised pre-flight, before any
    /// browser is launched.
    #[error("configuration error: {0}")]
    Config(String),

    /// The stored cookie was rejected by the remote service.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Browser-driven workflow failure (launch, navigation, screenshot, …).
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),

    /// Credential republication failed.
    #[error("secret store error: {0}")]
    SecretStore(#[from] SecretStoreError),

    /// Local filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// The terminal outcome this error maps to.
    pub fn outcome(&self) -> RunOutcome {
        match self {
            Self::Auth(_) => RunOutcome::AuthFailure,
            _ => RunOutcome::ExecutionError,
        }
    }
}

/// Terminal state of one invocation; drives the exit code and the failure
/// notification wording. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    AuthFailure,
    ExecutionError,
}

impl RunOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::AuthFailure | Self::ExecutionError => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_map_to_auth_failure() {
        let err = RunError::Auth("cookie expired".to_string());
        assert_eq!(err.outcome(), RunOutcome::AuthFailure);
        assert_eq!(err.outcome().exit_code(), 1);
    }

    #[test]
    fn other_errors_map_to_execution_error() {
        let err = RunError::config("missing cookie");
        assert_eq!(err.outcome(), RunOutcome::ExecutionError);
    }

    #[test]
    fn success_exits_zero() {
        assert_eq!(RunOutcome::Success.exit_code(), 0);
    }
}
