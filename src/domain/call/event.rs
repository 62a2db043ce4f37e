//! Call events delivered to listeners

use crate::domain::call::aggregate::Call;
use crate::domain::call::value_object::{CallState, DisconnectReason};
use crate::domain::shared::events::{DomainEvent, EventMetadata};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Kind of event a listener subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallEventKind {
    Alerting,
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
    /// Fired after every transition, following the state-specific event
    StateChange,
}

impl CallEventKind {
    /// Event fired when a call enters `state`
    pub fn for_state(state: CallState) -> Option<Self> {
        match state {
            CallState::Dialing => None,
            CallState::Alerting => Some(CallEventKind::Alerting),
            CallState::Connecting => Some(CallEventKind::Connecting),
            CallState::Connected => Some(CallEventKind::Connected),
            CallState::Disconnecting => Some(CallEventKind::Disconnecting),
            CallState::Disconnected => Some(CallEventKind::Disconnected),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallEventKind::Alerting => "alerting",
            CallEventKind::Connecting => "connecting",
            CallEventKind::Connected => "connected",
            CallEventKind::Disconnecting => "disconnecting",
            CallEventKind::Disconnected => "disconnected",
            CallEventKind::StateChange => "statechange",
        }
    }
}

impl fmt::Display for CallEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of one call state change
#[derive(Debug, Clone)]
pub struct CallEvent {
    pub metadata: EventMetadata,
    pub call: Arc<Call>,
    pub previous: CallState,
    pub state: CallState,
    /// Set only on transitions into `Disconnected`
    pub reason: Option<DisconnectReason>,
}

impl CallEvent {
    pub fn new(
        call: Arc<Call>,
        previous: CallState,
        state: CallState,
        reason: Option<DisconnectReason>,
    ) -> Self {
        Self {
            metadata: EventMetadata::new(),
            call,
            previous,
            state,
            reason,
        }
    }
}

impl DomainEvent for CallEvent {
    fn event_type(&self) -> &'static str {
        match self.state {
            CallState::Dialing => "call.dialing",
            CallState::Alerting => "call.alerting",
            CallState::Connecting => "call.connecting",
            CallState::Connected => "call.connected",
            CallState::Disconnecting => "call.disconnecting",
            CallState::Disconnected => "call.disconnected",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.metadata.occurred_at
    }
}
