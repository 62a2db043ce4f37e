//! Call bounded context - a single call's identity, state and listeners

pub mod aggregate;
pub mod event;
pub mod value_object;

pub use aggregate::{Call, CallSnapshot, Listener, ListenerId};
pub use event::{CallEvent, CallEventKind};
pub use value_object::{CallDirection, CallState, DisconnectReason};
