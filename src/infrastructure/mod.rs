//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - The modem channel port and its adapter
//! - An in-process emulator implementing the channel

pub mod modem;
