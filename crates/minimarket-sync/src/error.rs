//! # Sync Errors
//!
//! The agent only needs to know two things about a failure: retry it
//! (network, timeout, store overloaded) or leave the outbox entry marked
//! failed and move on. Configuration mistakes are a third case; the terminal
//! shows those as validation errors.
//!
//! ```text
//!  retryable        ConnectionFailed, Timeout, StoreUnavailable (5xx / 429)
//!  config           InvalidConfig, MissingDeviceId, InvalidUrl, Config*Failed
//!  everything else  recorded on the outbox row, never retried in the run
//! ```

use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    #[error("Device ID not configured. Run initial setup first.")]
    MissingDeviceId,

    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Document store unavailable ({status}): {message}")]
    StoreUnavailable { status: u16, message: String },

    #[error("Document store rejected batch ({status}): {message}")]
    StoreRejected { status: u16, message: String },

    /// More writes than one commit may carry.
    #[error("Batch of {size} writes exceeds the limit of {max}")]
    BatchTooLarge { size: usize, max: usize },

    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Outbox payload that does not decode into a document.
    #[error("Outbox entry {id} has an invalid payload: {reason}")]
    InvalidPayload { id: String, reason: String },

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Sync agent is shutting down")]
    ShuttingDown,

    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl SyncError {
    /// 429 and 5xx mean "try later"; any other status is a refusal.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == 429 || status >= 500 {
            SyncError::StoreUnavailable { status, message }
        } else {
            SyncError::StoreRejected { status, message }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::ConnectionFailed(_)
                | SyncError::Timeout(_)
                | SyncError::StoreUnavailable { .. }
        )
    }

    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::MissingDeviceId
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}

impl From<minimarket_db::DbError> for SyncError {
    fn from(err: minimarket_db::DbError) -> Self {
        SyncError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            SyncError::from_status(status.as_u16(), err.to_string())
        } else if err.is_decode() {
            SyncError::SerializationFailed(err.to_string())
        } else {
            SyncError::ConnectionFailed(err.to_string())
        }
    }
}

// Only config files are read or written from disk.
impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(SyncError::from_status(503, "busy").is_retryable());
        assert!(SyncError::from_status(429, "slow down").is_retryable());
        assert!(!SyncError::from_status(400, "bad doc").is_retryable());
        assert!(matches!(
            SyncError::from_status(403, "denied"),
            SyncError::StoreRejected { status: 403, .. }
        ));
    }

    #[test]
    fn test_config_errors_are_not_retried() {
        let err = SyncError::InvalidUrl("ftp://x".into());
        assert!(err.is_config_error());
        assert!(!err.is_retryable());
        assert!(SyncError::Timeout(5).is_retryable());
        assert!(!SyncError::Timeout(5).is_config_error());
    }
}
