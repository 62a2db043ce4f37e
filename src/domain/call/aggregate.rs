//! Call aggregate root

use crate::domain::call::event::{CallEvent, CallEventKind};
use crate::domain::call::value_object::{CallDirection, CallState, DisconnectReason};
use crate::domain::shared::error::{DomainError, Result};
use crate::domain::shared::events::DomainEvent;
use crate::domain::shared::value_objects::{CallId, PhoneNumber};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tokio::sync::watch;
use tracing::{debug, error};

/// Callback invoked synchronously when a call event fires
pub type Listener = Arc<dyn Fn(&CallEvent) + Send + Sync>;

/// Handle returned by [`Call::on`], used to remove the listener again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Listeners {
    next_id: u64,
    by_kind: HashMap<CallEventKind, Vec<(ListenerId, Listener)>>,
}

/// Call aggregate root
///
/// A call is shared as `Arc<Call>` between the telephony manager and whoever
/// dialed it. Identity and number never change; the state moves forward
/// along the transition table in [`CallState::can_transition_to`] and is
/// frozen once `Disconnected`.
///
/// State changes are only driven by the telephony manager. Listeners run
/// synchronously on the task that applied the transition, after the new
/// state is visible and without any internal lock held, so a listener may
/// freely query the call or register further listeners.
pub struct Call {
    id: CallId,
    number: PhoneNumber,
    direction: CallDirection,
    started_at: DateTime<Utc>,
    state: watch::Sender<CallState>,
    reason: OnceLock<DisconnectReason>,
    ended_at: OnceLock<DateTime<Utc>>,
    listeners: Mutex<Listeners>,
}

impl Call {
    /// Create an outgoing call in `Dialing`
    pub fn outgoing(number: PhoneNumber) -> Arc<Self> {
        let (state, _) = watch::channel(CallState::Dialing);

        Arc::new(Self {
            id: CallId::new(),
            number,
            direction: CallDirection::Outgoing,
            started_at: Utc::now(),
            state,
            reason: OnceLock::new(),
            ended_at: OnceLock::new(),
            listeners: Mutex::new(Listeners::default()),
        })
    }

    /// Register a listener for `kind`
    ///
    /// Listeners of the same kind fire in registration order.
    pub fn on<F>(&self, kind: CallEventKind, listener: F) -> ListenerId
    where
        F: Fn(&CallEvent) + Send + Sync + 'static,
    {
        let mut listeners = self.lock_listeners();
        let id = ListenerId(listeners.next_id);
        listeners.next_id += 1;
        listeners
            .by_kind
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock_listeners();
        for registered in listeners.by_kind.values_mut() {
            if let Some(pos) = registered.iter().position(|(lid, _)| *lid == id) {
                registered.remove(pos);
                return true;
            }
        }
        false
    }

    /// Move to `to` and fire the matching events.
    ///
    /// Returns `Ok(false)` when the call is already in `to`; duplicate modem
    /// reports are expected and fire nothing.
    pub(crate) fn transition_to(
        self: &Arc<Self>,
        to: CallState,
        reason: Option<DisconnectReason>,
    ) -> Result<bool> {
        match self.apply(to, reason)? {
            Some(previous) => {
                self.fire(previous, to);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Update the state without firing listeners.
    ///
    /// Returns the previous state when the call moved, `None` on a duplicate.
    pub(crate) fn apply(
        &self,
        to: CallState,
        reason: Option<DisconnectReason>,
    ) -> Result<Option<CallState>> {
        let mut outcome = Ok(None);

        self.state.send_if_modified(|current| {
            if *current == to {
                return false;
            }
            if !current.can_transition_to(&to) {
                outcome = Err(DomainError::InvalidTransition { from: *current, to });
                return false;
            }

            if to.is_terminal() {
                // Waiters on `ended()` read these as soon as the state flips.
                let _ = self
                    .reason
                    .set(reason.clone().unwrap_or(DisconnectReason::LocalHangup));
                let _ = self.ended_at.set(Utc::now());
            }

            outcome = Ok(Some(*current));
            *current = to;
            true
        });

        match &outcome {
            Ok(Some(previous)) => {
                debug!(call_id = %self.id, number = %self.number, "{} -> {}", previous, to)
            }
            Ok(None) => debug!(call_id = %self.id, "Duplicate transition to {} ignored", to),
            Err(e) => error!(call_id = %self.id, number = %self.number, "{}", e),
        }

        outcome
    }

    /// Fire the state-specific event for `state`, then `StateChange`.
    pub(crate) fn fire(self: &Arc<Self>, previous: CallState, state: CallState) {
        let reason = if state.is_terminal() {
            self.disconnect_reason()
        } else {
            None
        };
        let event = CallEvent::new(Arc::clone(self), previous, state, reason);

        let to_invoke: Vec<Listener> = {
            let listeners = self.lock_listeners();
            CallEventKind::for_state(state)
                .into_iter()
                .chain(std::iter::once(CallEventKind::StateChange))
                .filter_map(|kind| listeners.by_kind.get(&kind))
                .flat_map(|registered| registered.iter().map(|(_, l)| Arc::clone(l)))
                .collect()
        };

        debug!(
            call_id = %self.id,
            occurred_at = %event.occurred_at(),
            "{} to {} listener(s)",
            event.event_type(),
            to_invoke.len()
        );
        for listener in to_invoke {
            listener(&event);
        }
    }

    /// Move to `Disconnecting` for a local hang-up.
    ///
    /// Returns `Ok(false)` if a hang-up is already pending.
    pub(crate) fn request_hang_up(self: &Arc<Self>) -> Result<bool> {
        let state = self.state();
        if state == CallState::Disconnecting {
            return Ok(false);
        }
        if !state.can_hang_up() {
            return Err(DomainError::InvalidTransition {
                from: state,
                to: CallState::Disconnecting,
            });
        }
        self.transition_to(CallState::Disconnecting, None)
    }

    /// Wait until the call is disconnected.
    ///
    /// Resolves exactly once per awaiter, whether it started waiting before
    /// or after the call ended.
    pub async fn ended(&self) -> DisconnectReason {
        let mut rx = self.state.subscribe();
        // The sender is owned by `self`, so the channel cannot close here.
        let _ = rx.wait_for(CallState::is_terminal).await;
        self.disconnect_reason()
            .unwrap_or(DisconnectReason::LocalHangup)
    }

    /// Observe state changes
    pub fn state_changes(&self) -> watch::Receiver<CallState> {
        self.state.subscribe()
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Getters
    pub fn id(&self) -> CallId {
        self.id
    }

    pub fn number(&self) -> &PhoneNumber {
        &self.number
    }

    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    pub fn state(&self) -> CallState {
        *self.state.borrow()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at.get().copied()
    }

    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        self.reason.get().cloned()
    }

    pub fn is_live(&self) -> bool {
        !self.state().is_terminal()
    }

    pub fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            id: self.id,
            number: self.number.to_string(),
            direction: self.direction,
            state: self.state(),
            started_at: self.started_at,
            ended_at: self.ended_at(),
            reason: self.disconnect_reason(),
        }
    }
}

impl fmt::Debug for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("id", &self.id)
            .field("number", &self.number)
            .field("direction", &self.direction)
            .field("state", &self.state())
            .field("reason", &self.reason.get())
            .finish()
    }
}

/// Serializable point-in-time view of a call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSnapshot {
    pub id: CallId,
    pub number: String,
    pub direction: CallDirection,
    pub state: CallState,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub reason: Option<DisconnectReason>,
}
