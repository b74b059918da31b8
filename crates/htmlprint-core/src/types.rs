// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the htmlprint service: the wire messages exchanged
// with clients, charsets, page orientation, and live printer state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{HtmlPrintError, Result};

/// Unique identifier for a single print request (used to correlate log lines).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Page orientation
// ---------------------------------------------------------------------------

/// Page orientation of a printer profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
    #[serde(alias = "INVERTEDPORTRAIT")]
    InvertedPortrait,
    Seascape,
}

impl Orientation {
    /// Value of the PDF `/Rotate` entry written on every page.
    pub fn rotation_degrees(&self) -> i64 {
        match self {
            Self::Portrait => 0,
            Self::Landscape => 90,
            Self::InvertedPortrait => 180,
            Self::Seascape => 270,
        }
    }

    /// Whether the page box is swapped (width ↔ height) relative to portrait.
    pub fn swaps_axes(&self) -> bool {
        matches!(self, Self::Landscape | Self::Seascape)
    }
}

// ---------------------------------------------------------------------------
// Charsets
// ---------------------------------------------------------------------------

/// The small fixed set of input charsets a request may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Utf8,
    Ascii,
    Iso8859_1,
    Utf16,
}

impl Charset {
    /// Look up a charset by name. Unrecognised names yield `None`.
    ///
    /// Accepts the canonical names plus the short aliases the CLI has always
    /// documented (`UTF8`, `UTF16`, `8859`).
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "UTF8" | "UTF-8" | "UTF_8" => Some(Self::Utf8),
            "ASCII" | "US-ASCII" | "US_ASCII" => Some(Self::Ascii),
            "8859" | "ISO-8859-1" | "ISO_8859_1" | "LATIN1" => Some(Self::Iso8859_1),
            "UTF16" | "UTF-16" | "UTF_16" => Some(Self::Utf16),
            _ => None,
        }
    }

    /// Canonical charset name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Ascii => "US-ASCII",
            Self::Iso8859_1 => "ISO-8859-1",
            Self::Utf16 => "UTF-16",
        }
    }

    /// First character of `text` that cannot be represented in this charset.
    pub fn first_unencodable(&self, text: &str) -> Option<char> {
        match self {
            Self::Ascii => text.chars().find(|c| !c.is_ascii()),
            Self::Iso8859_1 => text.chars().find(|c| u32::from(*c) > 0xFF),
            Self::Utf8 | Self::Utf16 => None,
        }
    }

    /// Decode raw file bytes using this charset.
    ///
    /// UTF-16 honours a byte-order mark and defaults to big-endian without
    /// one. A leading UTF-8 BOM is stripped.
    pub fn decode(&self, bytes: &[u8]) -> Result<String> {
        match self {
            Self::Utf8 => {
                let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
                String::from_utf8(body.to_vec()).map_err(|e| HtmlPrintError::Decode {
                    charset: self.name(),
                    reason: e.to_string(),
                })
            }
            Self::Ascii => match bytes.iter().position(|b| !b.is_ascii()) {
                Some(offset) => Err(HtmlPrintError::Decode {
                    charset: self.name(),
                    reason: format!("non-ASCII byte 0x{:02X} at offset {offset}", bytes[offset]),
                }),
                None => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
            },
            Self::Iso8859_1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
            Self::Utf16 => decode_utf16(bytes),
        }
    }
}

fn decode_utf16(bytes: &[u8]) -> Result<String> {
    let (little_endian, body) = match bytes {
        [0xFF, 0xFE, rest @ ..] => (true, rest),
        [0xFE, 0xFF, rest @ ..] => (false, rest),
        _ => (false, bytes),
    };

    if body.len() % 2 != 0 {
        return Err(HtmlPrintError::Decode {
            charset: Charset::Utf16.name(),
            reason: format!("odd byte length {}", body.len()),
        });
    }

    let units = body.chunks_exact(2).map(|pair| {
        if little_endian {
            u16::from_le_bytes([pair[0], pair[1]])
        } else {
            u16::from_be_bytes([pair[0], pair[1]])
        }
    });

    char::decode_utf16(units)
        .collect::<std::result::Result<String, _>>()
        .map_err(|e| HtmlPrintError::Decode {
            charset: Charset::Utf16.name(),
            reason: e.to_string(),
        })
}

// ---------------------------------------------------------------------------
// Inbound request
// ---------------------------------------------------------------------------

/// The JSON object a client sends, before validation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest {
    #[serde(default)]
    printer_id: Option<String>,
    #[serde(default)]
    charset: Option<String>,
    #[serde(default)]
    html: Option<String>,
}

/// A decoded, validated print request.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintRequest {
    /// Configured printer id; `None` selects the default profile.
    pub printer_id: Option<String>,
    /// Declared charset. `None` means the client named a charset we do not
    /// support; the conversion step rejects such requests.
    pub charset: Option<Charset>,
    /// HTML payload (never empty).
    pub html: String,
}

impl PrintRequest {
    /// Build a request for the default printer with UTF-8 content.
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            printer_id: None,
            charset: Some(Charset::Utf8),
            html: html.into(),
        }
    }

    /// Decode and validate an inbound JSON message.
    pub fn from_json(message: &str) -> Result<Self> {
        let wire: WireRequest = serde_json::from_str(message)
            .map_err(|e| HtmlPrintError::InvalidRequest(format!("malformed JSON: {e}")))?;

        let html = match wire.html {
            Some(html) if !html.trim().is_empty() => html,
            Some(_) => return Err(HtmlPrintError::InvalidRequest("html is empty".into())),
            None => return Err(HtmlPrintError::InvalidRequest("html is missing".into())),
        };

        let charset = match wire.charset {
            Some(name) => Charset::parse(&name),
            None => Some(Charset::Utf8),
        };

        Ok(Self {
            printer_id: wire.printer_id,
            charset,
            html,
        })
    }
}

// ---------------------------------------------------------------------------
// Outbound status events
// ---------------------------------------------------------------------------

/// Printer status reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrinterStatus {
    Free,
    Busy,
    Offline,
    Error,
}

/// Request lifecycle status reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    Received,
    Processing,
    Done,
    Rejected,
}

impl RequestStatus {
    /// No further events follow a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Rejected)
    }
}

/// One status notification sent back to the originating connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub printer_status: PrinterStatus,
    pub request_status: RequestStatus,
    pub message: String,
}

impl StatusEvent {
    pub fn new(
        printer_status: PrinterStatus,
        request_status: RequestStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            printer_status,
            request_status,
            message: message.into(),
        }
    }

    pub fn received() -> Self {
        Self::new(
            PrinterStatus::Free,
            RequestStatus::Received,
            "Request received and printer available.",
        )
    }

    pub fn processing() -> Self {
        Self::new(PrinterStatus::Busy, RequestStatus::Processing, "Printing started.")
    }

    pub fn done() -> Self {
        Self::new(PrinterStatus::Free, RequestStatus::Done, "Printing complete.")
    }

    pub fn rejected(printer_status: PrinterStatus, message: impl Into<String>) -> Self {
        Self::new(printer_status, RequestStatus::Rejected, message)
    }

    /// The terminal event describing `err`.
    pub fn from_error(err: &HtmlPrintError) -> Self {
        Self::rejected(err.printer_status(), err.to_string())
    }

    pub fn is_terminal(&self) -> bool {
        self.request_status.is_terminal()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ---------------------------------------------------------------------------
// Live printer state
// ---------------------------------------------------------------------------

/// Printer state as reported by the OS printing subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrinterState {
    Idle,
    Processing,
    Stopped,
    NotAcceptingJobs,
}

/// A live snapshot of one OS printer. Never cached between requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrinterSnapshot {
    /// OS printer name the snapshot was taken for.
    pub name: String,
    /// Raw `printer-state` (Idle, Processing or Stopped).
    pub state: PrinterState,
    /// Raw `printer-is-accepting-jobs`.
    pub accepting_jobs: bool,
    /// Optional `printer-state-message` text.
    pub state_message: Option<String>,
}

impl PrinterSnapshot {
    /// Collapse the snapshot into a single availability verdict.
    ///
    /// Priority: Stopped, then Processing, then not accepting jobs.
    pub fn availability(&self) -> PrinterState {
        match self.state {
            PrinterState::Stopped => PrinterState::Stopped,
            PrinterState::Processing => PrinterState::Processing,
            _ if !self.accepting_jobs => PrinterState::NotAcceptingJobs,
            other => other,
        }
    }
}

/// Status of the WebSocket print server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerStatus {
    Stopped,
    Starting,
    Running,
    Error,
}
