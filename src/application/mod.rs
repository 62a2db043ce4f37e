//! Application layer - Use cases and application services
//!
//! This layer orchestrates domain objects to fulfill use cases.
//! It's responsible for:
//! - Owning the set of live calls and the active call
//! - Driving call transitions from modem status reports
//! - Issuing dial and hang-up commands through the modem adapter

pub mod telephony;

pub use telephony::{Mismatch, ReconcileReport, Telephony, TelephonyError};
