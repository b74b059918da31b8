// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// htmlprint-print: printer directory, IPP job dispatch, per-request
// coordination, and the WebSocket print server.  This crate bridges the core
// domain types in `htmlprint-core` and the conversion pipeline in
// `htmlprint-document` to the OS printing subsystem.

pub mod coordinator;
pub mod cups;
pub mod directory;
pub mod dispatcher;
pub mod server;
pub mod system;

#[cfg(test)]
mod testing;

pub use coordinator::RequestCoordinator;
pub use cups::CupsPrintSystem;
pub use directory::{AdmissionPermit, PrinterDirectory};
pub use dispatcher::{JobDispatcher, JobOutcome};
pub use server::PrintServer;
pub use system::{ActiveJob, JobEvent, PrintSystem};
