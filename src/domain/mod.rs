//! Domain layer - Core call model and rules
//!
//! This layer contains:
//! - Aggregates: the `Call` and its transition rules
//! - Value Objects: call ids, phone numbers, states
//! - Domain Events: call state changes delivered to listeners

pub mod call;
pub mod shared;

// Re-export commonly used types
pub use shared::{DomainError, Result};
