//! Port to the textual command channel of a radio or simulator

use super::error::ModemError;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Final line of a successful command response
pub const RESPONSE_OK: &str = "OK";

/// Prefix of the final line of a failed command response
pub const RESPONSE_KO: &str = "KO";

/// Textual command channel
///
/// A command yields its response lines, ending with `OK` or `KO: <reason>`.
/// Call status changes arrive out of band as unsolicited lines in the
/// call-list format.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModemChannel: Send + Sync {
    /// Whether the channel can accept commands
    fn is_ready(&self) -> bool;

    /// Send one command and collect its response lines
    async fn send(&self, command: &str) -> Result<Vec<String>, ModemError>;

    /// Subscribe to unsolicited status lines
    fn unsolicited(&self) -> broadcast::Receiver<String>;
}
