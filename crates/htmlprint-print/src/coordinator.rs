// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Request coordinator: runs one print request from raw message to terminal
// status event.
//
// Lifecycle of a request:
//
//   decode → resolve printer → admit (per-printer gate) → live state check
//          → RECEIVED → convert → PROCESSING → dispatch → DONE
//
// Any failure ends the request with exactly one REJECTED event. The admission
// gate is held from the state check until dispatch returns, so two requests
// can never both pass the check for the same printer.

use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tracing::{Instrument, debug, info, info_span, warn};

use htmlprint_core::error::{HtmlPrintError, Result};
use htmlprint_core::{PrintRequest, RequestId, ServiceConfig, StatusEvent};
use htmlprint_document::ConversionPipeline;

use crate::directory::{PrinterDirectory, ensure_available};
use crate::dispatcher::JobDispatcher;
use crate::system::PrintSystem;

pub struct RequestCoordinator {
    directory: PrinterDirectory,
    pipeline: ConversionPipeline,
    dispatcher: JobDispatcher,
    workers: Arc<Semaphore>,
}

impl RequestCoordinator {
    pub fn new(
        config: Arc<ServiceConfig>,
        system: Arc<dyn PrintSystem>,
        pipeline: ConversionPipeline,
    ) -> Self {
        let dispatcher = JobDispatcher::new(Arc::clone(&system), config.job_timeout());
        let workers = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        Self {
            directory: PrinterDirectory::new(config, system),
            pipeline,
            dispatcher,
            workers,
        }
    }

    pub fn directory(&self) -> &PrinterDirectory {
        &self.directory
    }

    /// Process one inbound message, sending every status event for it to
    /// `events`. Always ends with a terminal event.
    pub async fn handle(&self, message: String, events: mpsc::Sender<StatusEvent>) {
        let id = RequestId::new();
        let span = info_span!("request", %id);

        async move {
            let _worker = match Arc::clone(&self.workers).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    let err = HtmlPrintError::Server("service is shutting down".into());
                    emit(&events, StatusEvent::from_error(&err)).await;
                    return;
                }
            };

            let terminal = match self.process(id, message, &events).await {
                Ok(()) => {
                    info!("request done");
                    StatusEvent::done()
                }
                Err(e) => {
                    warn!(error = %e, kind = ?e.kind(), "request rejected");
                    StatusEvent::from_error(&e)
                }
            };
            emit(&events, terminal).await;
        }
        .instrument(span)
        .await
    }

    async fn process(
        &self,
        id: RequestId,
        message: String,
        events: &mpsc::Sender<StatusEvent>,
    ) -> Result<()> {
        let request = PrintRequest::from_json(&message)?;
        debug!(printer = ?request.printer_id, html_len = request.html.len(), "request decoded");

        let profile = self.directory.resolve(request.printer_id.as_deref())?.clone();
        let _permit = self
            .directory
            .try_admit(&profile)
            .ok_or_else(|| HtmlPrintError::PrinterBusy(profile.id.clone()))?;

        let snapshot = self.directory.query_live_state(&profile).await?;
        ensure_available(&snapshot)?;

        emit(events, StatusEvent::received()).await;

        let pipeline = self.pipeline.clone();
        let render_profile = profile.clone();
        let document = tokio::task::spawn_blocking(move || {
            pipeline.render(&request.html, None, request.charset, &render_profile)
        })
        .await
        .map_err(|e| HtmlPrintError::Conversion(format!("render task failed: {e}")))??;

        emit(events, StatusEvent::processing()).await;

        let job_name = format!("htmlprint-{id}");
        self.dispatcher
            .submit(&document, &profile, &job_name)
            .await
            .into_result(self.dispatcher.timeout())
    }
}

/// Send `event` to the connection. A closed connection does not stop the
/// request.
async fn emit(events: &mpsc::Sender<StatusEvent>, event: StatusEvent) {
    if events.send(event).await.is_err() {
        debug!("connection closed, status event dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::JobEvent;
    use crate::testing::{FakePrintSystem, JobBehaviour};
    use htmlprint_core::{PrinterProfile, PrinterState, PrinterStatus, RequestStatus};
    use tokio::sync::Notify;

    const HELLO: &str = r#"{"html":"<html><head></head><body>hi</body></html>"}"#;

    fn coordinator(
        profiles: Vec<PrinterProfile>,
        system: Arc<FakePrintSystem>,
    ) -> Arc<RequestCoordinator> {
        Arc::new(RequestCoordinator::new(
            Arc::new(ServiceConfig::with_printers(profiles)),
            system,
            ConversionPipeline::default(),
        ))
    }

    async fn run(coordinator: &RequestCoordinator, message: &str) -> Vec<StatusEvent> {
        let (tx, mut rx) = mpsc::channel(16);
        coordinator.handle(message.to_string(), tx).await;
        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            seen.push(event);
        }
        seen
    }

    fn statuses(events: &[StatusEvent]) -> Vec<(PrinterStatus, RequestStatus)> {
        events.iter().map(|e| (e.printer_status, e.request_status)).collect()
    }

    #[tokio::test]
    async fn happy_path_emits_three_events() {
        let system = Arc::new(FakePrintSystem::new().with_idle("lp"));
        let coord = coordinator(vec![PrinterProfile::new("P1", "lp")], system.clone());

        let events = run(&coord, HELLO).await;
        assert_eq!(
            statuses(&events),
            vec![
                (PrinterStatus::Free, RequestStatus::Received),
                (PrinterStatus::Busy, RequestStatus::Processing),
                (PrinterStatus::Free, RequestStatus::Done),
            ]
        );
        assert_eq!(events[0].message, "Request received and printer available.");
        assert_eq!(events[2].message, "Printing complete.");
        assert_eq!(system.submitted(), 1);
    }

    #[tokio::test]
    async fn unknown_printer_is_rejected_without_work() {
        let system = Arc::new(FakePrintSystem::new().with_idle("lp"));
        let coord = coordinator(vec![PrinterProfile::new("P1", "lp")], system.clone());

        let events = run(&coord, r#"{"printerId":"P9","html":"<p>x</p>"}"#).await;
        assert_eq!(statuses(&events), vec![(PrinterStatus::Error, RequestStatus::Rejected)]);
        assert_eq!(
            events[0].message,
            "The printer was not found in the configuration of this service."
        );
        assert_eq!(system.lookups(), 0);
        assert_eq!(system.submitted(), 0);
    }

    #[tokio::test]
    async fn malformed_message_is_rejected() {
        let system = Arc::new(FakePrintSystem::new().with_idle("lp"));
        let coord = coordinator(vec![PrinterProfile::new("P1", "lp")], system);

        for message in ["not json", r#"{"printerId":"P1"}"#, r#"{"html":""}"#] {
            let events = run(&coord, message).await;
            assert_eq!(statuses(&events), vec![(PrinterStatus::Error, RequestStatus::Rejected)]);
        }
    }

    #[tokio::test]
    async fn no_profiles_means_no_default() {
        let system = Arc::new(FakePrintSystem::new());
        let coord = coordinator(vec![], system);
        let events = run(&coord, HELLO).await;
        assert_eq!(statuses(&events), vec![(PrinterStatus::Error, RequestStatus::Rejected)]);
    }

    #[tokio::test]
    async fn live_state_priority() {
        let cases = [
            (PrinterState::Stopped, false, PrinterStatus::Offline),
            (PrinterState::Processing, false, PrinterStatus::Busy),
            (PrinterState::Idle, false, PrinterStatus::Error),
        ];
        for (state, accepting, expected) in cases {
            let system = Arc::new(FakePrintSystem::new().with_state("lp", state, accepting));
            let coord = coordinator(vec![PrinterProfile::new("P1", "lp")], system.clone());
            let events = run(&coord, HELLO).await;
            assert_eq!(statuses(&events), vec![(expected, RequestStatus::Rejected)]);
            assert_eq!(system.submitted(), 0);
        }
    }

    #[tokio::test]
    async fn vanished_printer_is_an_error() {
        let system = Arc::new(FakePrintSystem::new());
        let coord = coordinator(vec![PrinterProfile::new("P1", "gone")], system);
        let events = run(&coord, HELLO).await;
        assert_eq!(statuses(&events), vec![(PrinterStatus::Error, RequestStatus::Rejected)]);
        assert_eq!(
            events[0].message,
            "Printer not found. Check the configuration and server setup."
        );
    }

    #[tokio::test]
    async fn conversion_failure_after_received() {
        let system = Arc::new(FakePrintSystem::new().with_idle("lp"));
        let coord = coordinator(vec![PrinterProfile::new("P1", "lp")], system.clone());

        let events = run(&coord, r#"{"charset":"EBCDIC","html":"<p>x</p>"}"#).await;
        assert_eq!(
            statuses(&events),
            vec![
                (PrinterStatus::Free, RequestStatus::Received),
                (PrinterStatus::Error, RequestStatus::Rejected),
            ]
        );
        assert_eq!(system.submitted(), 0);
    }

    #[tokio::test]
    async fn failed_job_is_rejected_after_processing() {
        let system = Arc::new(
            FakePrintSystem::new()
                .with_idle("lp")
                .with_behaviour(JobBehaviour::Finish(JobEvent::Failed("paper jam".into()))),
        );
        let coord = coordinator(vec![PrinterProfile::new("P1", "lp")], system);

        let events = run(&coord, HELLO).await;
        assert_eq!(
            statuses(&events),
            vec![
                (PrinterStatus::Free, RequestStatus::Received),
                (PrinterStatus::Busy, RequestStatus::Processing),
                (PrinterStatus::Error, RequestStatus::Rejected),
            ]
        );
        assert!(events[2].message.contains("paper jam"));
    }

    #[tokio::test]
    async fn second_request_for_held_printer_is_busy() {
        let release = Arc::new(Notify::new());
        let system = Arc::new(
            FakePrintSystem::new()
                .with_idle("lp")
                .with_behaviour(JobBehaviour::WaitFor(release.clone())),
        );
        let coord = coordinator(vec![PrinterProfile::new("P1", "lp")], system.clone());

        let (tx, mut first_rx) = mpsc::channel(16);
        let first = {
            let coord = Arc::clone(&coord);
            tokio::spawn(async move { coord.handle(HELLO.to_string(), tx).await })
        };

        // Wait until the first request is dispatching.
        assert_eq!(first_rx.recv().await.unwrap().request_status, RequestStatus::Received);
        assert_eq!(first_rx.recv().await.unwrap().request_status, RequestStatus::Processing);

        let events = run(&coord, HELLO).await;
        assert_eq!(statuses(&events), vec![(PrinterStatus::Busy, RequestStatus::Rejected)]);

        release.notify_one();
        first.await.unwrap();
        assert_eq!(first_rx.recv().await.unwrap().request_status, RequestStatus::Done);
        assert!(first_rx.recv().await.is_none());

        // The gate is free again.
        release.notify_one();
        let events = run(&coord, HELLO).await;
        assert_eq!(events.last().unwrap().request_status, RequestStatus::Done);
        assert_eq!(system.submitted(), 2);
    }
}
