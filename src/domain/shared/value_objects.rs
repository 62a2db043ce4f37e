//! Shared value objects used across multiple bounded contexts

use crate::domain::shared::error::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Longest dial string accepted when no limit is configured
pub const DEFAULT_MAX_NUMBER_LENGTH: usize = 20;

/// Call identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(Uuid);

impl CallId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Dialable phone number
///
/// Accepts digits, `*` and `#`, with an optional leading `+`. The string is
/// kept verbatim since the modem reports it back in the same form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn parse(number: &str) -> Result<Self, DomainError> {
        Self::parse_with_limit(number, DEFAULT_MAX_NUMBER_LENGTH)
    }

    pub fn parse_with_limit(number: &str, max_len: usize) -> Result<Self, DomainError> {
        if number.is_empty() {
            return Err(DomainError::InvalidNumber("number is empty".to_string()));
        }

        let digits = number.strip_prefix('+').unwrap_or(number);
        if digits.is_empty() {
            return Err(DomainError::InvalidNumber(format!(
                "'{}' has no digits",
                number
            )));
        }

        if let Some(bad) = digits
            .chars()
            .find(|c| !(c.is_ascii_digit() || *c == '*' || *c == '#'))
        {
            return Err(DomainError::InvalidNumber(format!(
                "'{}' contains invalid character '{}'",
                number, bad
            )));
        }

        if number.len() > max_len {
            return Err(DomainError::InvalidNumber(format!(
                "'{}' is longer than {} characters",
                number, max_len
            )));
        }

        Ok(Self(number.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(number: PhoneNumber) -> Self {
        number.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
