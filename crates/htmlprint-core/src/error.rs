// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for htmlprint.
//
// The `Display` text of request-level errors is sent verbatim to clients as
// the `message` of the terminal status event, so keep it human-readable.

use thiserror::Error;

use crate::types::PrinterStatus;

/// Top-level error type for all htmlprint operations.
#[derive(Debug, Error)]
pub enum HtmlPrintError {
    // -- Request validation --
    #[error("An error occurred during the message processing: {0}")]
    InvalidRequest(String),

    #[error("file not found: {0}")]
    MissingFile(String),

    #[error("{0}")]
    Usage(String),

    // -- Printer resolution --
    #[error("The printer was not found in the configuration of this service.")]
    PrinterNotFound(String),

    #[error("No printer id given and no default printer is configured.")]
    NoDefaultPrinter,

    #[error("Printer not found. Check the configuration and server setup.")]
    PrinterUnavailable(String),

    // -- Live printer state --
    #[error("Printer is not available.")]
    PrinterOffline(String),

    #[error("Printer is processing previous jobs.")]
    PrinterBusy(String),

    #[error("Printer is not accepting new jobs.")]
    PrinterNotAccepting(String),

    // -- Conversion --
    #[error("unsupported or unrecognised charset")]
    UnsupportedCharset,

    #[error("character {found:?} cannot be represented in {charset}")]
    CharsetMismatch { charset: &'static str, found: char },

    #[error("cannot decode input as {charset}: {reason}")]
    Decode { charset: &'static str, reason: String },

    #[error("document structure error: {0}")]
    Structural(String),

    #[error("HTML conversion failed: {0}")]
    Conversion(String),

    #[error("PDF operation failed: {0}")]
    Pdf(String),

    // -- Dispatch --
    #[error("print job failed: {0}")]
    Dispatch(String),

    #[error("print job did not finish within {0} seconds")]
    DispatchTimeout(u64),

    #[error("IPP request failed: {0}")]
    Ipp(String),

    // -- Infrastructure --
    #[error("configuration error: {0}")]
    Config(String),

    #[error("print server error: {0}")]
    Server(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification used for logging and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Resolution,
    State,
    Conversion,
    Dispatch,
    Infrastructure,
}

impl HtmlPrintError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) | Self::MissingFile(_) | Self::Usage(_) => {
                ErrorKind::Validation
            }
            Self::PrinterNotFound(_) | Self::NoDefaultPrinter | Self::PrinterUnavailable(_) => {
                ErrorKind::Resolution
            }
            Self::PrinterOffline(_) | Self::PrinterBusy(_) | Self::PrinterNotAccepting(_) => {
                ErrorKind::State
            }
            Self::UnsupportedCharset
            | Self::CharsetMismatch { .. }
            | Self::Decode { .. }
            | Self::Structural(_)
            | Self::Conversion(_)
            | Self::Pdf(_) => ErrorKind::Conversion,
            Self::Dispatch(_) | Self::DispatchTimeout(_) | Self::Ipp(_) => ErrorKind::Dispatch,
            Self::Config(_) | Self::Server(_) | Self::Io(_) | Self::Serialization(_) => {
                ErrorKind::Infrastructure
            }
        }
    }

    /// Printer status reported alongside the terminal event for this error.
    pub fn printer_status(&self) -> PrinterStatus {
        match self {
            Self::PrinterOffline(_) => PrinterStatus::Offline,
            Self::PrinterBusy(_) => PrinterStatus::Busy,
            _ => PrinterStatus::Error,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, HtmlPrintError>;
