//! Dialtone - voice call state tracking over a modem channel
//!
//! Tracks outgoing calls from dial request through alerting, answer and
//! teardown, keeping each call consistent with the status a radio (or the
//! bundled emulator) reports asynchronously.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use application::{Telephony, TelephonyError};
pub use domain::call::{Call, CallEvent, CallEventKind, CallState, DisconnectReason};
pub use domain::shared::error::DomainError;
pub use domain::shared::error::Result;
