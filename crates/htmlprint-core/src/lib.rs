// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// htmlprint-core: core types, configuration, and error definitions shared across
// all crates.

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    Margins, PrinterProfile, RenderEngine, ServiceConfig, mm_to_points, points_to_mm,
};
pub use error::{ErrorKind, HtmlPrintError, Result};
pub use types::*;
