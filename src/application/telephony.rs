//! Telephony - owns the live calls and keeps them in step with the modem
//!
//! One `Telephony` serves one modem for the length of a session: build it
//! with [`Telephony::new`], call [`Telephony::start`] to begin relaying modem
//! status reports, and [`Telephony::shutdown`] (or drop it) at the end.
//!
//! A single call may be active at a time. Modem reports are applied one at a
//! time by the relay task. Each report's transition and its listeners run to
//! completion before the next report is looked at. While a dial is in
//! progress the relay holds its reports back, so a freshly dialed call is
//! always handed out in `Dialing`.

use crate::config::TelephonyConfig;
use crate::domain::call::{Call, CallState, DisconnectReason};
use crate::domain::shared::{CallId, DomainError, PhoneNumber};
use crate::infrastructure::modem::{ModemAdapter, ModemCallStatus, ModemError, ModemStatusLine};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelephonyError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Modem(#[from] ModemError),
}

#[derive(Default)]
struct Registry {
    calls: Vec<Arc<Call>>,
    active: Option<Arc<Call>>,
}

pub struct Telephony {
    modem: Arc<ModemAdapter>,
    config: TelephonyConfig,
    registry: Mutex<Registry>,
    /// Held by `dial` until the new call is returned; the relay takes it per report
    dial_gate: AsyncMutex<()>,
    relay: Mutex<Option<JoinHandle<()>>>,
}

impl Telephony {
    pub fn new(modem: Arc<ModemAdapter>, config: TelephonyConfig) -> Arc<Self> {
        Arc::new(Self {
            modem,
            config,
            registry: Mutex::new(Registry::default()),
            dial_gate: AsyncMutex::new(()),
            relay: Mutex::new(None),
        })
    }

    /// Start relaying modem status reports. Calling it again is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut relay = lock(&self.relay);
        if relay.is_some() {
            return;
        }

        // Subscribe before returning so nothing sent after `start` is missed.
        let mut events = self.modem.events();
        let telephony = Arc::downgrade(self);

        *relay = Some(tokio::spawn(async move {
            while let Some(status) = events.next().await {
                let Some(telephony) = telephony.upgrade() else {
                    break;
                };
                let _dialing = telephony.dial_gate.lock().await;
                if let Err(e) = telephony.handle_status(&status) {
                    error!("Modem report '{}' not applied: {}", status, e);
                }
            }
            debug!("Modem event relay stopped");
        }));

        info!("Telephony started");
    }

    /// Stop relaying modem status reports
    pub fn shutdown(&self) {
        if let Some(handle) = lock(&self.relay).take() {
            handle.abort();
            info!("Telephony stopped");
        }
    }

    /// Place an outgoing call
    ///
    /// The returned call is `Dialing`; later states arrive from the modem.
    /// If the modem cannot originate, the call is disconnected with
    /// [`DisconnectReason::ChannelFailure`], dropped from [`calls`](Self::calls)
    /// and the channel error is returned.
    pub async fn dial(&self, number: &str) -> Result<Arc<Call>, TelephonyError> {
        let number = PhoneNumber::parse_with_limit(number, self.config.max_number_length)
            .inspect_err(|e| warn!("Dial rejected: {}", e))?;

        // Reports about this call queue behind the gate until it is returned.
        let _dialing = self.dial_gate.lock().await;

        let call = {
            let mut registry = lock(&self.registry);
            // A call that has just ended no longer blocks a new one, even before
            // its teardown has cleared `active`.
            if let Some(active) = registry.active.as_ref().filter(|c| c.is_live()) {
                warn!("Dial to {} rejected, call {} is active", number, active.id());
                return Err(DomainError::Busy { active: active.id() }.into());
            }

            let call = Call::outgoing(number);
            registry.calls.push(Arc::clone(&call));
            registry.active = Some(Arc::clone(&call));
            metrics::gauge!("telephony_active_calls").set(registry.calls.len() as f64);
            call
        };

        info!(call_id = %call.id(), "Dialing {}", call.number());
        metrics::counter!("telephony_calls_dialed_total").increment(1);

        if let Err(e) = self.modem.originate(call.number()).await {
            warn!(call_id = %call.id(), "Originate failed: {}", e);
            metrics::counter!("telephony_calls_failed_total").increment(1);
            self.transition(
                &call,
                CallState::Disconnected,
                Some(DisconnectReason::ChannelFailure(e.to_string())),
            )?;
            return Err(e.into());
        }

        Ok(call)
    }

    /// Request a local hang-up
    ///
    /// The call moves to `Disconnecting` at once and to `Disconnected` when
    /// the modem reports the teardown. If the modem refuses the terminate
    /// command and no longer lists the call, its release report went missing
    /// and the call is disconnected here instead. On any other failure the
    /// call stays `Disconnecting` and `hang_up` may be retried.
    pub async fn hang_up(&self, call: &Arc<Call>) -> Result<(), TelephonyError> {
        if !self.is_tracked(call) {
            return Err(DomainError::NotFound(call.id().to_string()).into());
        }

        if call.request_hang_up()? {
            info!(call_id = %call.id(), "Hanging up {}", call.number());
        } else {
            info!(call_id = %call.id(), "Retrying hang-up of {}", call.number());
        }

        match self.modem.terminate(call.number()).await {
            Ok(()) => Ok(()),
            Err(ModemError::Rejected(reason)) => {
                let lines = self.modem.request_call_list().await?;
                if lines.iter().any(|line| line.number == call.number().as_str()) {
                    warn!(call_id = %call.id(), "Terminate rejected: {}", reason);
                    return Err(ModemError::Rejected(reason).into());
                }

                info!(
                    call_id = %call.id(),
                    "Modem no longer lists {}, hang-up confirmed", call.number()
                );
                self.transition(
                    call,
                    CallState::Disconnected,
                    Some(DisconnectReason::LocalHangup),
                )?;
                Ok(())
            }
            Err(e) => {
                warn!(call_id = %call.id(), "Terminate failed: {}", e);
                Err(e.into())
            }
        }
    }

    /// Apply one modem status report
    ///
    /// Reports for numbers with no live call are ignored, as are non-release
    /// reports for a call already being hung up. Returns whether a call
    /// changed state.
    pub fn handle_status(&self, status: &ModemStatusLine) -> Result<bool, TelephonyError> {
        let Some(call) = self.find_by_number(&status.number) else {
            warn!("Ignoring modem report for unknown call: {}", status);
            return Ok(false);
        };

        let (target, reason) = match status.status {
            ModemCallStatus::Dialing => (CallState::Dialing, None),
            ModemCallStatus::Ringing => (CallState::Alerting, None),
            ModemCallStatus::Active => (CallState::Connected, None),
            ModemCallStatus::Released => {
                let reason = match call.state() {
                    CallState::Disconnecting => DisconnectReason::LocalHangup,
                    CallState::Connected => DisconnectReason::RemoteHangup,
                    _ => DisconnectReason::Rejected,
                };
                (CallState::Disconnected, Some(reason))
            }
            ModemCallStatus::Busy => (CallState::Disconnected, Some(DisconnectReason::Busy)),
            ModemCallStatus::Failed => {
                (CallState::Disconnected, Some(DisconnectReason::Unreachable))
            }
            ModemCallStatus::Held | ModemCallStatus::Incoming | ModemCallStatus::Waiting => {
                debug!("No call state for modem report: {}", status);
                return Ok(false);
            }
        };

        if call.state() == CallState::Disconnecting && !target.is_terminal() {
            debug!(call_id = %call.id(), "Dropping report sent before hang-up: {}", status);
            return Ok(false);
        }

        Ok(self.transition(&call, target, reason)?)
    }

    /// Compare local calls with the modem's call list without changing either
    pub async fn reconcile(&self) -> Result<ReconcileReport, TelephonyError> {
        let lines = self.modem.request_call_list().await?;
        let calls = self.calls();
        let mut report = ReconcileReport::default();

        for call in &calls {
            let number = call.number().as_str();
            match lines.iter().find(|line| line.number == number) {
                Some(line) if !agrees(call.state(), line.status) => {
                    report.mismatched.push(Mismatch {
                        call_id: call.id(),
                        local: call.state(),
                        modem: line.status,
                    });
                }
                Some(_) => {}
                None => report.missing_on_modem.push(call.id()),
            }
        }

        report.unknown_on_modem = lines
            .into_iter()
            .filter(|line| !calls.iter().any(|c| c.number().as_str() == line.number))
            .collect();

        if !report.is_consistent() {
            warn!("Call state differs from modem: {:?}", report);
        }
        Ok(report)
    }

    /// The active call, if any
    pub fn active(&self) -> Option<Arc<Call>> {
        lock(&self.registry).active.clone()
    }

    /// Live calls in dial order
    ///
    /// Each access returns a fresh vector; the calls inside are shared, so
    /// `Arc::ptr_eq` holds between accesses for the same call.
    pub fn calls(&self) -> Vec<Arc<Call>> {
        lock(&self.registry).calls.clone()
    }

    pub fn call(&self, id: CallId) -> Option<Arc<Call>> {
        lock(&self.registry)
            .calls
            .iter()
            .find(|c| c.id() == id)
            .cloned()
    }

    pub fn modem(&self) -> &Arc<ModemAdapter> {
        &self.modem
    }

    /// Move `call` to `target`, keeping `active` and `calls` in step.
    ///
    /// `active` is cleared before the disconnected listeners run; the call
    /// leaves `calls` only after they return.
    fn transition(
        &self,
        call: &Arc<Call>,
        target: CallState,
        reason: Option<DisconnectReason>,
    ) -> Result<bool, DomainError> {
        let Some(previous) = call.apply(target, reason)? else {
            return Ok(false);
        };

        if target.is_terminal() {
            let mut registry = lock(&self.registry);
            if registry
                .active
                .as_ref()
                .is_some_and(|active| Arc::ptr_eq(active, call))
            {
                registry.active = None;
            }
        }

        call.fire(previous, target);

        if target.is_terminal() {
            let mut registry = lock(&self.registry);
            registry.calls.retain(|c| !Arc::ptr_eq(c, call));
            metrics::gauge!("telephony_active_calls").set(registry.calls.len() as f64);
            info!(
                call_id = %call.id(),
                "Call to {} ended: {}",
                call.number(),
                call.disconnect_reason().unwrap_or(DisconnectReason::LocalHangup)
            );
        }

        Ok(true)
    }

    fn find_by_number(&self, number: &str) -> Option<Arc<Call>> {
        lock(&self.registry)
            .calls
            .iter()
            .rev()
            .find(|c| c.number().as_str() == number && c.is_live())
            .cloned()
    }

    fn is_tracked(&self, call: &Arc<Call>) -> bool {
        lock(&self.registry)
            .calls
            .iter()
            .any(|c| Arc::ptr_eq(c, call))
    }
}

impl Drop for Telephony {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.relay).take() {
            handle.abort();
        }
    }
}

/// Result of [`Telephony::reconcile`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Live local calls the modem does not list
    pub missing_on_modem: Vec<CallId>,
    /// Modem lines with no live local call
    pub unknown_on_modem: Vec<ModemStatusLine>,
    /// Calls both sides know, in disagreeing states
    pub mismatched: Vec<Mismatch>,
}

impl ReconcileReport {
    pub fn is_consistent(&self) -> bool {
        self.missing_on_modem.is_empty()
            && self.unknown_on_modem.is_empty()
            && self.mismatched.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub call_id: CallId,
    pub local: CallState,
    pub modem: ModemCallStatus,
}

fn agrees(local: CallState, modem: ModemCallStatus) -> bool {
    matches!(
        (local, modem),
        (CallState::Dialing, ModemCallStatus::Dialing)
            | (CallState::Alerting, ModemCallStatus::Ringing)
            | (CallState::Connecting, ModemCallStatus::Active)
            | (CallState::Connected, ModemCallStatus::Active | ModemCallStatus::Held)
            | (CallState::Disconnecting, _)
    )
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
