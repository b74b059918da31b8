// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job dispatcher: submits a rendered document and waits, bounded, for the
// printing subsystem to report the job's end.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use htmlprint_core::PrinterProfile;
use htmlprint_core::error::HtmlPrintError;
use htmlprint_document::RenderedDocument;

use crate::system::{JobEvent, PrintSystem};

/// How a dispatched job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Done,
    Failed(String),
    TimedOut,
}

impl JobOutcome {
    /// `Ok` for `Done`, the matching error otherwise.
    pub fn into_result(self, timeout: Duration) -> Result<(), HtmlPrintError> {
        match self {
            Self::Done => Ok(()),
            Self::Failed(reason) => Err(HtmlPrintError::Dispatch(reason)),
            Self::TimedOut => Err(HtmlPrintError::DispatchTimeout(timeout.as_secs())),
        }
    }
}

impl From<JobEvent> for JobOutcome {
    fn from(event: JobEvent) -> Self {
        match event {
            JobEvent::Completed | JobEvent::NoMoreEvents => Self::Done,
            JobEvent::Cancelled => Self::Failed("job was cancelled".into()),
            JobEvent::Failed(reason) => Self::Failed(reason),
        }
    }
}

#[derive(Clone)]
pub struct JobDispatcher {
    system: Arc<dyn PrintSystem>,
    timeout: Duration,
}

impl JobDispatcher {
    pub fn new(system: Arc<dyn PrintSystem>, timeout: Duration) -> Self {
        Self { system, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Submit `document` to `profile`'s printer and wait for its outcome.
    #[instrument(
        skip(self, document, profile),
        fields(printer = %profile.id, pages = document.page_count)
    )]
    pub async fn submit(
        &self,
        document: &RenderedDocument,
        profile: &PrinterProfile,
        job_name: &str,
    ) -> JobOutcome {
        let job = match self
            .system
            .submit(&profile.printer_name, document.bytes.clone(), job_name)
            .await
        {
            Ok(job) => job,
            Err(e) => {
                warn!(error = %e, "job submission failed");
                return JobOutcome::Failed(e.to_string());
            }
        };

        let job_id = job.job_id;
        info!(job_id, "job submitted, waiting for completion");

        let outcome = match tokio::time::timeout(self.timeout, job.into_events()).await {
            Ok(Ok(event)) => JobOutcome::from(event),
            Ok(Err(_)) => JobOutcome::Failed("printing system stopped reporting on the job".into()),
            Err(_) => JobOutcome::TimedOut,
        };

        match &outcome {
            JobOutcome::Done => info!(job_id, "job finished"),
            other => warn!(job_id, outcome = ?other, "job did not finish"),
        }
        outcome
    }
}
