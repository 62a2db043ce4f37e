//! Radio/modem channel integration
//!
//! The channel itself is an external collaborator speaking a line-based
//! text protocol. [`ModemAdapter`] owns it, serializes commands and parses
//! the call-list wire format into [`ModemStatusLine`]s.

pub mod adapter;
pub mod channel;
pub mod emulator;
pub mod error;
pub mod status;

pub use adapter::{ModemAdapter, ModemEventStream};
pub use channel::ModemChannel;
pub use emulator::EmulatorChannel;
pub use error::ModemError;
pub use status::{parse_call_list, LineDirection, ModemCallStatus, ModemStatusLine};
