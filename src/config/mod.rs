//! Configuration management
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `DIALTONE__SECTION__KEY` environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub telephony: TelephonyConfig,
    pub modem: ModemConfig,
    pub emulator: EmulatorConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelephonyConfig {
    /// Longest dial string accepted by `dial`
    pub max_number_length: usize,
}

/// What to do with a command sent while another is outstanding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyPolicy {
    /// Wait for the channel in FIFO order
    Queue,
    /// Fail immediately with `ChannelBusy`
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModemConfig {
    pub command_timeout_ms: u64,
    pub busy_policy: BusyPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Report the remote party as ringing right after a dial
    pub auto_alert: bool,
    /// Capacity of the unsolicited status line buffer
    pub event_buffer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            max_number_length: crate::domain::shared::DEFAULT_MAX_NUMBER_LENGTH,
        }
    }
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: 5000,
            busy_policy: BusyPolicy::Queue,
        }
    }
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            auto_alert: true,
            event_buffer: 64,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder
            .add_source(
                config::Environment::with_prefix("DIALTONE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.telephony.max_number_length, 20);
        assert_eq!(config.modem.command_timeout_ms, 5000);
        assert_eq!(config.modem.busy_policy, BusyPolicy::Queue);
        assert!(config.emulator.auto_alert);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("dialtone-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[modem]\nbusy_policy = \"reject\"\ncommand_timeout_ms = 250").unwrap();
        writeln!(file, "[emulator]\nauto_alert = false").unwrap();
        drop(file);

        let config = Config::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.modem.busy_policy, BusyPolicy::Reject);
        assert_eq!(config.modem.command_timeout_ms, 250);
        assert!(!config.emulator.auto_alert);
        assert_eq!(config.emulator.event_buffer, 64);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let path = std::env::temp_dir().join("dialtone-does-not-exist.toml");
        assert!(Config::load(Some(&path)).is_err());
    }
}
