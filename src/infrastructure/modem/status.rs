//! Call status lines as reported by the modem console
//!
//! Format, one call per line:
//!
//! ```text
//! outbound to  5555552368 : ringing
//! inbound from 5555550000 : incoming
//! ```
//!
//! The direction prefix is padded to 12 characters and the number to 10,
//! so the spacing is significant and must be reproduced exactly.

use super::error::ModemError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const OUTBOUND_PREFIX: &str = "outbound to ";
const INBOUND_PREFIX: &str = "inbound from";

/// Direction of a call line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineDirection {
    Outbound,
    Inbound,
}

impl LineDirection {
    fn prefix(&self) -> &'static str {
        match self {
            LineDirection::Outbound => OUTBOUND_PREFIX,
            LineDirection::Inbound => INBOUND_PREFIX,
        }
    }
}

/// Status token of a call line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModemCallStatus {
    Dialing,
    /// Remote party alerted. Spelled `ringing` on the wire.
    Ringing,
    Active,
    Held,
    Incoming,
    Waiting,
    /// Call torn down normally; only seen as an unsolicited report
    Released,
    /// Remote party busy or rejected; only seen as an unsolicited report
    Busy,
    /// Network could not reach the remote party; only seen as an unsolicited report
    Failed,
}

impl ModemCallStatus {
    pub fn token(&self) -> &'static str {
        match self {
            ModemCallStatus::Dialing => "dialing",
            ModemCallStatus::Ringing => "ringing",
            ModemCallStatus::Active => "active",
            ModemCallStatus::Held => "held",
            ModemCallStatus::Incoming => "incoming",
            ModemCallStatus::Waiting => "waiting",
            ModemCallStatus::Released => "released",
            ModemCallStatus::Busy => "busy",
            ModemCallStatus::Failed => "failed",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        let status = match token {
            "dialing" => ModemCallStatus::Dialing,
            "ringing" => ModemCallStatus::Ringing,
            "active" => ModemCallStatus::Active,
            "held" => ModemCallStatus::Held,
            "incoming" => ModemCallStatus::Incoming,
            "waiting" => ModemCallStatus::Waiting,
            "released" => ModemCallStatus::Released,
            "busy" => ModemCallStatus::Busy,
            "failed" => ModemCallStatus::Failed,
            _ => return None,
        };
        Some(status)
    }

    /// The call no longer exists on the modem
    pub fn is_release(&self) -> bool {
        matches!(
            self,
            ModemCallStatus::Released | ModemCallStatus::Busy | ModemCallStatus::Failed
        )
    }
}

impl fmt::Display for ModemCallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// One parsed call line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModemStatusLine {
    pub direction: LineDirection,
    pub number: String,
    pub status: ModemCallStatus,
}

impl ModemStatusLine {
    pub fn new(direction: LineDirection, number: impl Into<String>, status: ModemCallStatus) -> Self {
        Self {
            direction,
            number: number.into(),
            status,
        }
    }
}

impl fmt::Display for ModemStatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:<10} : {}",
            self.direction.prefix(),
            self.number,
            self.status
        )
    }
}

impl FromStr for ModemStatusLine {
    type Err = ModemError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let malformed = || ModemError::Parse {
            line: line.to_string(),
        };

        let line_trimmed = line.trim_end_matches(['\r', '\n']);
        let (head, token) = line_trimmed.rsplit_once(" : ").ok_or_else(malformed)?;

        let (direction, rest) = if let Some(rest) = head.strip_prefix(OUTBOUND_PREFIX) {
            (LineDirection::Outbound, rest)
        } else if let Some(rest) = head.strip_prefix(INBOUND_PREFIX) {
            (LineDirection::Inbound, rest)
        } else {
            return Err(malformed());
        };

        let number = rest.trim();
        if number.is_empty() || number.contains(char::is_whitespace) {
            return Err(malformed());
        }

        let status = ModemCallStatus::from_token(token.trim()).ok_or_else(malformed)?;

        Ok(Self::new(direction, number, status))
    }
}

/// Parse the body of a call list response
///
/// Blank lines are skipped. Any malformed line fails the whole list.
pub fn parse_call_list<S: AsRef<str>>(lines: &[S]) -> Result<Vec<ModemStatusLine>, ModemError> {
    lines
        .iter()
        .map(|line| line.as_ref())
        .filter(|line| !line.trim().is_empty())
        .map(str::parse)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_matches_console_spacing() {
        let line = ModemStatusLine::new(
            LineDirection::Outbound,
            "5555552368",
            ModemCallStatus::Ringing,
        );
        assert_eq!(line.to_string(), "outbound to  5555552368 : ringing");

        let inbound = ModemStatusLine::new(
            LineDirection::Inbound,
            "5555550000",
            ModemCallStatus::Incoming,
        );
        assert_eq!(inbound.to_string(), "inbound from 5555550000 : incoming");

        let short = ModemStatusLine::new(LineDirection::Outbound, "911", ModemCallStatus::Active);
        assert_eq!(short.to_string(), "outbound to  911        : active");
    }

    #[test]
    fn test_parse_status_line() {
        let line: ModemStatusLine = "outbound to  5555552368 : ringing".parse().unwrap();
        assert_eq!(line.direction, LineDirection::Outbound);
        assert_eq!(line.number, "5555552368");
        assert_eq!(line.status, ModemCallStatus::Ringing);

        let padded: ModemStatusLine = "outbound to  911        : active\r\n".parse().unwrap();
        assert_eq!(padded.number, "911");
        assert_eq!(padded.status, ModemCallStatus::Active);

        let inbound: ModemStatusLine = "inbound from 5555550000 : waiting".parse().unwrap();
        assert_eq!(inbound.direction, LineDirection::Inbound);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "",
            "outbound to  5555552368",
            "sideways to 5555552368 : ringing",
            "outbound to  5555552368 : ringng",
            "outbound to   : active",
            "outbound to  555 555 : active",
        ] {
            assert!(
                matches!(bad.parse::<ModemStatusLine>(), Err(ModemError::Parse { .. })),
                "{:?} should not parse",
                bad
            );
        }
    }

    #[test]
    fn test_parse_call_list() {
        let lines = vec![
            "outbound to  5555552368 : ringing".to_string(),
            String::new(),
            "inbound from 5555550000 : held".to_string(),
        ];
        let calls = parse_call_list(&lines).unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].status, ModemCallStatus::Held);

        let empty: Vec<String> = Vec::new();
        assert!(parse_call_list(&empty).unwrap().is_empty());

        assert!(parse_call_list(&["garbage"]).is_err());
    }

    #[test]
    fn test_release_tokens() {
        assert!(ModemCallStatus::Released.is_release());
        assert!(ModemCallStatus::Busy.is_release());
        assert!(!ModemCallStatus::Ringing.is_release());
        assert_eq!(ModemCallStatus::from_token("ringing"), Some(ModemCallStatus::Ringing));
        assert_eq!(ModemCallStatus::from_token("alerting"), None);
    }
}
