use crate::config::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FollowbackError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("GitHub API error: {0}")]
    GitHub(#[from] GitHubError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GitHubError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// `reset_at` is the unix timestamp at which the quota refills, when known.
    #[error("Rate limit exceeded{}", .reset_at.map(|r| format!(", resets at {r}")).unwrap_or_default())]
    RateLimitExceeded { reset_at: Option<i64> },

    #[error("User not found: {username}")]
    NotFound { username: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error: HTTP {status}")]
    ServerError { status: u16 },

    #[error("API request failed with status {status}: {message}")]
    ApiRequestFailed { status: u16, message: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Client setup failed: {0}")]
    ClientSetup(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

/// Retry and abort policy for the different failure kinds
pub struct ErrorRecovery;

impl ErrorRecovery {
    /// Whether retrying the same call may succeed
    pub fn is_recoverable(error: &GitHubError) -> bool {
        match error {
            GitHubError::Network(_) => true,
            GitHubError::ServerError { .. } => true,
            GitHubError::AuthenticationFailed(_) => false,
            GitHubError::RateLimitExceeded { .. } => false,
            GitHubError::NotFound { .. } => false,
            GitHubError::ApiRequestFailed { .. } => false,
            GitHubError::InvalidResponse(_) => false,
            GitHubError::ClientSetup(_) => false,
        }
    }

    /// Exponential backoff: `base_ms * 2^attempt`, capped at 60 seconds
    pub fn retry_delay_ms(base_ms: u64, attempt: u32) -> u64 {
        let delay = base_ms.saturating_mul(2_u64.saturating_pow(attempt.min(6)));
        delay.min(60_000)
    }

    /// Rate-limit exhaustion and rejected credentials stop the remaining follow calls
    pub fn aborts_pass(error: &GitHubError) -> bool {
        matches!(
            error,
            GitHubError::RateLimitExceeded { .. } | GitHubError::AuthenticationFailed(_)
        )
    }

    /// Errors that make the process exit non-zero
    pub fn should_shutdown(error: &FollowbackError) -> bool {
        match error {
            FollowbackError::Config(_) => true,
            FollowbackError::Store(_) => true,
            FollowbackError::InvalidData(_) => true,
            FollowbackError::GitHub(GitHubError::RateLimitExceeded { .. }) => false,
            FollowbackError::GitHub(_) => true,
        }
    }
}
