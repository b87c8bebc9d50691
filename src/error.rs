use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Problems with a single account entry, detected while building the roster
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Backup is enabled but no token was configured
    #[error("token is empty but backup_repos is enabled")]
    EmptyToken,

    /// The listing option is not valid for the account kind
    #[error("unsupported {kind} option '{option}' (expected one of: {allowed})")]
    UnsupportedOption {
        kind: &'static str,
        option: String,
        allowed: &'static str,
    },

    /// The token references an environment variable that is not set
    #[error("token references an unresolvable variable: {0}")]
    UnresolvedToken(String),
}

/// Failure of one account's enumeration within a tick
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnumerationError {
    /// The request URL or request itself could not be built
    #[error("failed to build request: {0}")]
    RequestBuild(String),

    /// The request exceeded the configured ceiling
    #[error("request timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// GitHub answered with a non-success status
    #[error("GitHub API responded with HTTP {status}")]
    Api { status: u16, body: String },

    /// The response body was not a JSON array of repository objects
    #[error("failed to parse repository list: {0}")]
    Parse(String),

    /// Any other network failure (connect, DNS, TLS, body read)
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Coarse classification of per-account failures, used in reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    RequestBuild,
    Timeout,
    Api,
    Parse,
    Transport,
}

impl EnumerationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EnumerationError::RequestBuild(_) => ErrorKind::RequestBuild,
            EnumerationError::Timeout(_) => ErrorKind::Timeout,
            EnumerationError::Api { .. } => ErrorKind::Api,
            EnumerationError::Parse(_) => ErrorKind::Parse,
            EnumerationError::Transport(_) => ErrorKind::Transport,
        }
    }

    /// HTTP status code, for API errors
    pub fn status(&self) -> Option<u16> {
        match self {
            EnumerationError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the failure is likely to clear up by the next tick on its own
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EnumerationError::Timeout(_) | EnumerationError::Transport(_)
        )
    }
}
