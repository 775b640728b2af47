//! Line protocol spoken over the daemon socket.
//!
//! ```text
//! client: GRAB\n
//! server: OK\n | ERR <reason>\n   (then closes)
//! ```

use std::fmt;

use kmsgrab_common::error::{KmsgrabError, KmsgrabResult};

/// Largest command the server reads from a client.
pub const MAX_COMMAND_LEN: usize = 128;

/// Commands understood by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Grab,
}

impl Command {
    /// Parse a raw request. Surrounding ASCII whitespace is ignored, the
    /// keyword itself is case-sensitive.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        match trim_ascii_whitespace(raw) {
            b"GRAB" => Some(Self::Grab),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grab => "GRAB",
        }
    }

    /// Wire form, newline terminated.
    pub fn to_line(&self) -> String {
        format!("{}\n", self.as_str())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server response to a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Err(String),
}

impl Reply {
    pub fn unsupported() -> Self {
        Self::Err("unsupported command".to_string())
    }

    /// Map a capture outcome to a reply.
    pub fn from_result(result: &KmsgrabResult<()>) -> Self {
        match result {
            Ok(()) => Self::Ok,
            Err(e) => Self::Err(e.reply_reason().to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Wire form, newline terminated.
    pub fn to_line(&self) -> String {
        format!("{self}\n")
    }

    /// Parse a reply line as received by a client.
    pub fn parse(line: &str) -> KmsgrabResult<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line == "OK" {
            return Ok(Self::Ok);
        }
        if let Some(reason) = line.strip_prefix("ERR ") {
            return Ok(Self::Err(reason.to_string()));
        }
        if line.is_empty() {
            return Err(KmsgrabError::protocol("connection closed without a reply"));
        }
        Err(KmsgrabError::protocol(format!("unexpected reply: {line:?}")))
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("OK"),
            Self::Err(reason) => write!(f, "ERR {reason}"),
        }
    }
}

fn trim_ascii_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}
