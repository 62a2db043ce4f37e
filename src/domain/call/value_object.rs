//! Call value objects

use serde::{Deserialize, Serialize};
use std::fmt;

/// Call direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    /// Placed by this device
    Outgoing,
    /// Offered by the network
    Incoming,
}

/// Call state
///
/// States only move forward. `Disconnected` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    /// Dial request sent, waiting for the network
    Dialing,
    /// Remote party is being alerted (ringing)
    Alerting,
    /// Answer in progress
    ///
    /// No transition leads here: the modem has no answer-in-progress report
    /// and moves an outgoing call from `ringing` straight to `active`. Kept
    /// so the state set matches what listeners may subscribe to.
    Connecting,
    /// Call is established
    Connected,
    /// Local teardown requested, waiting for the modem to confirm
    Disconnecting,
    /// Call has ended
    Disconnected,
}

impl CallState {
    /// Check if state transition is valid
    pub fn can_transition_to(&self, new_state: &CallState) -> bool {
        use CallState::*;

        match (self, new_state) {
            // From Dialing
            (Dialing, Alerting) => true,
            (Dialing, Connected) => true,
            (Dialing, Disconnecting) => true,
            (Dialing, Disconnected) => true,

            // From Alerting
            (Alerting, Connected) => true,
            (Alerting, Disconnecting) => true,
            (Alerting, Disconnected) => true,

            // From Connecting
            (Connecting, Connected) => true,
            (Connecting, Disconnecting) => true,
            (Connecting, Disconnected) => true,

            // From Connected
            (Connected, Disconnecting) => true,
            // Remote party released an answered call
            (Connected, Disconnected) => true,

            // From Disconnecting
            (Disconnecting, Disconnected) => true,

            // Can't transition from Disconnected
            (Disconnected, _) => false,

            // All other transitions are invalid
            _ => false,
        }
    }

    /// States from which a local hang-up may be requested
    pub fn can_hang_up(&self) -> bool {
        matches!(
            self,
            CallState::Dialing | CallState::Alerting | CallState::Connecting | CallState::Connected
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Disconnected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::Dialing => "dialing",
            CallState::Alerting => "alerting",
            CallState::Connecting => "connecting",
            CallState::Connected => "connected",
            CallState::Disconnecting => "disconnecting",
            CallState::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason a call reached `Disconnected`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// Local hang-up confirmed by the modem
    LocalHangup,
    /// Remote party released an answered call
    RemoteHangup,
    /// Remote party rejected the call before answering
    Rejected,
    /// Remote party was busy
    Busy,
    /// Remote party could not be reached
    Unreachable,
    /// The modem channel failed while the call was being set up
    ChannelFailure(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::LocalHangup => f.write_str("local hangup"),
            DisconnectReason::RemoteHangup => f.write_str("remote hangup"),
            DisconnectReason::Rejected => f.write_str("rejected"),
            DisconnectReason::Busy => f.write_str("busy"),
            DisconnectReason::Unreachable => f.write_str("unreachable"),
            DisconnectReason::ChannelFailure(msg) => write!(f, "channel failure: {}", msg),
        }
    }
}
