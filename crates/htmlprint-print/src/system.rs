// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Abstraction over the OS printing subsystem.

use async_trait::async_trait;
use tokio::sync::oneshot;

use htmlprint_core::PrinterSnapshot;
use htmlprint_core::error::Result;

/// Terminal event of a submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Completed,
    Cancelled,
    Failed(String),
    /// The printing subsystem stopped reporting on the job without an error.
    NoMoreEvents,
}

/// One document submitted to the OS, paired with the channel that will carry
/// its terminal event.
#[derive(Debug)]
pub struct ActiveJob {
    pub job_id: i32,
    pub printer_name: String,
    events: oneshot::Receiver<JobEvent>,
}

impl ActiveJob {
    pub fn new(
        job_id: i32,
        printer_name: impl Into<String>,
        events: oneshot::Receiver<JobEvent>,
    ) -> Self {
        Self {
            job_id,
            printer_name: printer_name.into(),
            events,
        }
    }

    /// Give up the job handle for its event receiver.
    pub fn into_events(self) -> oneshot::Receiver<JobEvent> {
        self.events
    }
}

/// The OS printing subsystem, as seen by the service.
#[async_trait]
pub trait PrintSystem: Send + Sync {
    /// Live snapshot of the printer named `printer_name`, or `None` if the
    /// system does not expose such a printer.
    async fn lookup(&self, printer_name: &str) -> Result<Option<PrinterSnapshot>>;

    /// Submit a PDF document. The returned job reports exactly one terminal
    /// event, or its sender is dropped.
    async fn submit(
        &self,
        printer_name: &str,
        document: Vec<u8>,
        job_name: &str,
    ) -> Result<ActiveJob>;
}
