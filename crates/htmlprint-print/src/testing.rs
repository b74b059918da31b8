// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory print system used by the unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Notify, oneshot};

use htmlprint_core::error::{HtmlPrintError, Result};
use htmlprint_core::{PrinterSnapshot, PrinterState};

use crate::system::{ActiveJob, JobEvent, PrintSystem};

/// What a submitted job does after submission.
#[derive(Clone)]
pub(crate) enum JobBehaviour {
    Finish(JobEvent),
    /// Never reports; the sender lives until the receiver is dropped.
    Hang,
    /// Drops the sender without reporting.
    Vanish,
    /// Reports `Completed` once the notify fires.
    WaitFor(std::sync::Arc<Notify>),
    /// Submission itself fails.
    Reject(String),
}

pub(crate) struct FakePrintSystem {
    printers: Mutex<HashMap<String, PrinterSnapshot>>,
    behaviour: Mutex<JobBehaviour>,
    next_job_id: AtomicI32,
    submitted: AtomicUsize,
    lookups: AtomicUsize,
}

impl FakePrintSystem {
    pub fn new() -> Self {
        Self {
            printers: Mutex::new(HashMap::new()),
            behaviour: Mutex::new(JobBehaviour::Finish(JobEvent::Completed)),
            next_job_id: AtomicI32::new(1),
            submitted: AtomicUsize::new(0),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Expose an idle printer accepting jobs.
    pub fn with_idle(self, name: &str) -> Self {
        self.with_state(name, PrinterState::Idle, true)
    }

    pub fn with_state(self, name: &str, state: PrinterState, accepting_jobs: bool) -> Self {
        self.printers.lock().unwrap().insert(
            name.to_string(),
            PrinterSnapshot {
                name: name.to_string(),
                state,
                accepting_jobs,
                state_message: None,
            },
        );
        self
    }

    pub fn with_behaviour(self, behaviour: JobBehaviour) -> Self {
        *self.behaviour.lock().unwrap() = behaviour;
        self
    }

    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PrintSystem for FakePrintSystem {
    async fn lookup(&self, printer_name: &str) -> Result<Option<PrinterSnapshot>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.printers.lock().unwrap().get(printer_name).cloned())
    }

    async fn submit(
        &self,
        printer_name: &str,
        document: Vec<u8>,
        _job_name: &str,
    ) -> Result<ActiveJob> {
        assert!(document.starts_with(b"%PDF"), "dispatcher must receive a PDF");
        self.submitted.fetch_add(1, Ordering::SeqCst);

        let behaviour = self.behaviour.lock().unwrap().clone();
        let (tx, rx) = oneshot::channel();
        match behaviour {
            JobBehaviour::Finish(event) => {
                let _ = tx.send(event);
            }
            JobBehaviour::Hang => {
                tokio::spawn(async move {
                    let mut tx = tx;
                    tx.closed().await;
                });
            }
            JobBehaviour::Vanish => drop(tx),
            JobBehaviour::WaitFor(release) => {
                tokio::spawn(async move {
                    release.notified().await;
                    let _ = tx.send(JobEvent::Completed);
                });
            }
            JobBehaviour::Reject(reason) => return Err(HtmlPrintError::Ipp(reason)),
        }

        let job_id = self.next_job_id.fetch_add(1, Ordering::SeqCst);
        Ok(ActiveJob::new(job_id, printer_name, rx))
    }
}
