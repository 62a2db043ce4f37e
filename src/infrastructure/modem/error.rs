//! Modem channel errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModemError {
    #[error("Modem channel unavailable")]
    ChannelUnavailable,

    #[error("Modem channel busy with another command")]
    ChannelBusy,

    #[error("Malformed modem response: {line:?}")]
    Parse { line: String },

    #[error("Modem rejected command: {0}")]
    Rejected(String),

    #[error("Modem command timed out: {0}")]
    Timeout(String),
}

impl ModemError {
    /// Channel-layer failures the caller may retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ModemError::ChannelUnavailable | ModemError::ChannelBusy | ModemError::Timeout(_)
        )
    }
}
