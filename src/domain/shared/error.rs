//! Domain errors

use crate::domain::call::CallState;
use crate::domain::shared::value_objects::CallId;
use thiserror::Error;

/// Domain result type
pub type Result<T> = std::result::Result<T, DomainError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    #[error("Busy: call {active} is already active")]
    Busy { active: CallId },

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: CallState, to: CallState },

    #[error("Call not found: {0}")]
    NotFound(String),
}
