//! In-process GSM emulator console
//!
//! Understands the console subset a call lifecycle needs:
//!
//! | command | effect |
//! |---|---|
//! | `gsm dial <n>` | new outbound call, `dialing` (then `ringing` with `auto_alert`) |
//! | `gsm alert <n>` | remote party starts ringing, `ringing` |
//! | `gsm cancel <n>` | tear the call down, reports `released` |
//! | `gsm accept <n>` | remote party answers, `active` |
//! | `gsm busy <n>` | remote party busy, reports `busy` |
//! | `gsm hold <n>` | put an active call on hold, `held` |
//! | `gsm list` | one status line per call |
//!
//! Every status change is also broadcast as an unsolicited line.

use super::channel::{ModemChannel, RESPONSE_KO, RESPONSE_OK};
use super::error::ModemError;
use super::status::{LineDirection, ModemCallStatus, ModemStatusLine};
use crate::config::EmulatorConfig;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, info};

pub struct EmulatorChannel {
    config: EmulatorConfig,
    ready: AtomicBool,
    calls: Mutex<Vec<ModemStatusLine>>,
    commands: Mutex<Vec<String>>,
    events: broadcast::Sender<String>,
}

impl EmulatorChannel {
    pub fn new(config: EmulatorConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            config,
            ready: AtomicBool::new(true),
            calls: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            events,
        }
    }

    /// Simulate the radio going away or coming back
    pub fn set_ready(&self, ready: bool) {
        info!("Emulator channel {}", if ready { "ready" } else { "down" });
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Commands received so far, oldest first
    pub fn commands(&self) -> Vec<String> {
        lock(&self.commands).clone()
    }

    /// Broadcast an arbitrary unsolicited line
    pub fn inject(&self, line: impl Into<String>) {
        self.emit(line.into());
    }

    /// Current call lines as `gsm list` would print them
    pub fn call_list(&self) -> Vec<String> {
        lock(&self.calls).iter().map(ToString::to_string).collect()
    }

    fn execute(&self, command: &str) -> Result<Vec<String>, String> {
        let mut words = command.split_whitespace();
        if words.next() != Some("gsm") {
            return Err(format!("unknown command '{}'", command));
        }

        let verb = words.next().unwrap_or_default();
        if verb == "list" {
            return Ok(self.call_list());
        }

        let number = words
            .next()
            .ok_or_else(|| format!("missing number for '{}'", verb))?;

        match verb {
            "dial" => self.dial(number)?,
            "cancel" => self.release(number, ModemCallStatus::Released)?,
            "busy" => self.release(number, ModemCallStatus::Busy)?,
            "alert" => self.update(number, ModemCallStatus::Ringing, |s| {
                s == ModemCallStatus::Dialing
            })?,
            "accept" => self.update(number, ModemCallStatus::Active, |s| {
                matches!(
                    s,
                    ModemCallStatus::Dialing | ModemCallStatus::Ringing | ModemCallStatus::Incoming
                )
            })?,
            "hold" => self.update(number, ModemCallStatus::Held, |s| {
                s == ModemCallStatus::Active
            })?,
            _ => return Err(format!("unknown command '{}'", verb)),
        }

        Ok(Vec::new())
    }

    fn dial(&self, number: &str) -> Result<(), String> {
        let mut line = ModemStatusLine::new(LineDirection::Outbound, number, ModemCallStatus::Dialing);
        {
            let mut calls = lock(&self.calls);
            if calls.iter().any(|c| c.number == number) {
                return Err(format!("call to {} already exists", number));
            }
            calls.push(line.clone());
        }
        self.emit(line.to_string());

        if self.config.auto_alert {
            line.status = ModemCallStatus::Ringing;
            self.set_status(number, ModemCallStatus::Ringing);
            self.emit(line.to_string());
        }
        Ok(())
    }

    fn release(&self, number: &str, status: ModemCallStatus) -> Result<(), String> {
        let mut removed = {
            let mut calls = lock(&self.calls);
            let pos = calls
                .iter()
                .position(|c| c.number == number)
                .ok_or_else(|| format!("no call to {}", number))?;
            calls.remove(pos)
        };
        removed.status = status;
        self.emit(removed.to_string());
        Ok(())
    }

    fn update(
        &self,
        number: &str,
        status: ModemCallStatus,
        allowed: impl Fn(ModemCallStatus) -> bool,
    ) -> Result<(), String> {
        let line = {
            let mut calls = lock(&self.calls);
            let call = calls
                .iter_mut()
                .find(|c| c.number == number)
                .ok_or_else(|| format!("no call to {}", number))?;
            if !allowed(call.status) {
                return Err(format!("call to {} is {}", number, call.status));
            }
            call.status = status;
            call.clone()
        };
        self.emit(line.to_string());
        Ok(())
    }

    fn set_status(&self, number: &str, status: ModemCallStatus) {
        if let Some(call) = lock(&self.calls).iter_mut().find(|c| c.number == number) {
            call.status = status;
        }
    }

    fn emit(&self, line: String) {
        debug!("emulator >> {}", line);
        if self.events.send(line).is_err() {
            debug!("No subscribers for unsolicited line");
        }
    }
}

impl Default for EmulatorChannel {
    fn default() -> Self {
        Self::new(EmulatorConfig::default())
    }
}

#[async_trait]
impl ModemChannel for EmulatorChannel {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn send(&self, command: &str) -> Result<Vec<String>, ModemError> {
        if !self.is_ready() {
            return Err(ModemError::ChannelUnavailable);
        }
        lock(&self.commands).push(command.to_string());

        let mut response = match self.execute(command) {
            Ok(lines) => lines,
            Err(reason) => {
                debug!("emulator rejected '{}': {}", command, reason);
                return Ok(vec![format!("{}: {}", RESPONSE_KO, reason)]);
            }
        };
        response.push(RESPONSE_OK.to_string());
        Ok(response)
    }

    fn unsolicited(&self) -> broadcast::Receiver<String> {
        self.events.subscribe()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
