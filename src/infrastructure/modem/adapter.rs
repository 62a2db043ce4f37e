//! Modem adapter - serializes commands on the channel and turns its text
//! into structured call status

use super::channel::{ModemChannel, RESPONSE_KO, RESPONSE_OK};
use super::error::ModemError;
use super::status::{parse_call_list, ModemStatusLine};
use crate::config::{BusyPolicy, ModemConfig};
use crate::domain::shared::PhoneNumber;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Channel adapter
///
/// Only one command is outstanding on the channel at a time. Depending on
/// [`BusyPolicy`] a second caller either waits its turn or gets
/// [`ModemError::ChannelBusy`].
pub struct ModemAdapter {
    channel: Arc<dyn ModemChannel>,
    config: ModemConfig,
    gate: Mutex<()>,
}

impl ModemAdapter {
    pub fn new(channel: Arc<dyn ModemChannel>, config: ModemConfig) -> Self {
        Self {
            channel,
            config,
            gate: Mutex::new(()),
        }
    }

    /// Ask the channel to place a call
    pub async fn originate(&self, number: &PhoneNumber) -> Result<(), ModemError> {
        self.command(&format!("gsm dial {}", number)).await?;
        Ok(())
    }

    /// Ask the channel to tear a call down
    pub async fn terminate(&self, number: &PhoneNumber) -> Result<(), ModemError> {
        self.command(&format!("gsm cancel {}", number)).await?;
        Ok(())
    }

    /// Query the calls the channel currently knows about
    ///
    /// A malformed response is logged and reported as an empty list.
    pub async fn request_call_list(&self) -> Result<Vec<ModemStatusLine>, ModemError> {
        let lines = self.command("gsm list").await?;

        match parse_call_list(&lines) {
            Ok(calls) => Ok(calls),
            Err(e) => {
                warn!("Discarding call list: {}", e);
                metrics::counter!("modem_parse_errors_total").increment(1);
                Ok(Vec::new())
            }
        }
    }

    /// Raw call list lines, exactly as the channel printed them
    pub async fn raw_call_list(&self) -> Result<Vec<String>, ModemError> {
        self.command("gsm list").await
    }

    /// Subscribe to asynchronous status reports
    ///
    /// Subscribe before issuing the commands whose effects you want to see;
    /// reports sent earlier are not replayed.
    pub fn events(&self) -> ModemEventStream {
        ModemEventStream {
            rx: self.channel.unsolicited(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.channel.is_ready()
    }

    async fn command(&self, command: &str) -> Result<Vec<String>, ModemError> {
        if !self.channel.is_ready() {
            return Err(ModemError::ChannelUnavailable);
        }

        let _guard = match self.config.busy_policy {
            BusyPolicy::Queue => self.gate.lock().await,
            BusyPolicy::Reject => self.gate.try_lock().map_err(|_| ModemError::ChannelBusy)?,
        };

        debug!(">> {}", command);
        let timeout = Duration::from_millis(self.config.command_timeout_ms);
        let mut lines = tokio::time::timeout(timeout, self.channel.send(command))
            .await
            .map_err(|_| ModemError::Timeout(command.to_string()))??;
        debug!("<< {:?}", lines);

        match lines.pop() {
            Some(last) if last.trim() == RESPONSE_OK => Ok(lines),
            Some(last) if last.starts_with(RESPONSE_KO) => {
                let reason = last[RESPONSE_KO.len()..]
                    .trim_start_matches(':')
                    .trim()
                    .to_string();
                Err(ModemError::Rejected(reason))
            }
            Some(last) => Err(ModemError::Parse { line: last }),
            None => Err(ModemError::Parse {
                line: String::new(),
            }),
        }
    }
}

/// Ordered stream of status reports from the channel
///
/// Lines are yielded in the order the channel sent them. Malformed lines are
/// logged and skipped. The channel may repeat itself, so consumers must
/// tolerate duplicates.
pub struct ModemEventStream {
    rx: broadcast::Receiver<String>,
}

impl ModemEventStream {
    /// Next status report, or `None` once the channel is gone
    pub async fn next(&mut self) -> Option<ModemStatusLine> {
        loop {
            match self.rx.recv().await {
                Ok(line) => match line.parse::<ModemStatusLine>() {
                    Ok(status) => return Some(status),
                    Err(e) => {
                        warn!("Ignoring unsolicited line: {}", e);
                        metrics::counter!("modem_parse_errors_total").increment(1);
                    }
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Modem event stream lagged, {} status lines dropped", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
