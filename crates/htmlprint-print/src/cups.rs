// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// IPP-backed print system talking to the local CUPS scheduler.
//
// Uses the `ipp` crate's async API:
//   - Get-Printer-Attributes  (RFC 8011 §4.2.5) for live printer state
//   - Print-Job               (RFC 8011 §4.2.1) to submit the PDF
//   - Get-Job-Attributes      (RFC 8011 §4.3.4) to watch the job finish

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use ipp::prelude::*;
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, warn};

use htmlprint_core::error::{HtmlPrintError, Result};
use htmlprint_core::{PrinterSnapshot, PrinterState, ServiceConfig};

use crate::system::{ActiveJob, JobEvent, PrintSystem};

const DOCUMENT_FORMAT: &str = "application/pdf";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

// RFC 8011 §5.4.11 printer-state
const PRINTER_STATE_PROCESSING: i32 = 4;
const PRINTER_STATE_STOPPED: i32 = 5;

// RFC 8011 §5.3.7 job-state
const JOB_STATE_CANCELED: i32 = 7;
const JOB_STATE_ABORTED: i32 = 8;
const JOB_STATE_COMPLETED: i32 = 9;

/// Print system reached over IPP at `ipp://<host>:<port>/printers/<name>`.
#[derive(Debug, Clone)]
pub struct CupsPrintSystem {
    host: String,
    port: u16,
    poll_interval: Duration,
}

impl CupsPrintSystem {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(config.ipp_host.clone(), config.ipp_port)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Queue URI of `printer_name` on the scheduler.
    pub fn printer_uri(&self, printer_name: &str) -> Result<Uri> {
        let uri = format!("ipp://{}:{}/printers/{}", self.host, self.port, printer_name);
        uri.parse()
            .map_err(|e| HtmlPrintError::Ipp(format!("invalid URI '{uri}': {e}")))
    }
}

#[async_trait]
impl PrintSystem for CupsPrintSystem {
    #[instrument(skip(self), fields(host = %self.host, port = self.port))]
    async fn lookup(&self, printer_name: &str) -> Result<Option<PrinterSnapshot>> {
        let uri = self.printer_uri(printer_name)?;
        let operation = IppOperationBuilder::get_printer_attributes(uri.clone()).build();
        let client = AsyncIppClient::new(uri);

        debug!("sending Get-Printer-Attributes");
        let response = client
            .send(operation)
            .await
            .map_err(|e| HtmlPrintError::Ipp(format!("Get-Printer-Attributes: {e}")))?;

        let code = response.header().status_code();
        if code == StatusCode::ClientErrorNotFound {
            debug!("printer not known to the scheduler");
            return Ok(None);
        }
        if !code.is_success() {
            error!(status = ?code, "Get-Printer-Attributes failed");
            return Err(HtmlPrintError::Ipp(format!(
                "Get-Printer-Attributes returned status {code:?}"
            )));
        }

        let snapshot = parse_snapshot(printer_name, response.attributes());
        debug!(state = ?snapshot.state, accepting = snapshot.accepting_jobs, "printer state");
        Ok(Some(snapshot))
    }

    #[instrument(skip(self, document), fields(bytes = document.len()))]
    async fn submit(
        &self,
        printer_name: &str,
        document: Vec<u8>,
        job_name: &str,
    ) -> Result<ActiveJob> {
        let uri = self.printer_uri(printer_name)?;
        let payload = IppPayload::new(Cursor::new(document));
        let operation = IppOperationBuilder::print_job(uri.clone(), payload)
            .job_title(job_name)
            .document_format(DOCUMENT_FORMAT)
            .build();
        let client = AsyncIppClient::new(uri.clone());

        info!("sending Print-Job");
        let response = client
            .send(operation)
            .await
            .map_err(|e| HtmlPrintError::Ipp(format!("Print-Job: {e}")))?;

        if !response.header().status_code().is_success() {
            let code = response.header().status_code();
            error!(status = ?code, "Print-Job failed");
            return Err(HtmlPrintError::Ipp(format!("Print-Job returned status {code:?}")));
        }

        let job_id = extract_job_id(response.attributes()).ok_or_else(|| {
            HtmlPrintError::Ipp("Print-Job response missing job-id attribute".into())
        })?;
        info!(job_id, "print job accepted by scheduler");

        let (tx, rx) = oneshot::channel();
        tokio::spawn(watch_job(uri, job_id, self.poll_interval, tx));
        Ok(ActiveJob::new(job_id, printer_name, rx))
    }
}

/// Poll Get-Job-Attributes until `job_id` reaches a terminal state, the
/// scheduler forgets it, or the receiver goes away.
pub(crate) async fn watch_job(
    uri: Uri,
    job_id: i32,
    interval: Duration,
    mut tx: oneshot::Sender<JobEvent>,
) {
    loop {
        tokio::select! {
            _ = tx.closed() => {
                debug!(job_id, "job watcher abandoned");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        let status = match job_status(&uri, job_id).await {
            Ok(status) => status,
            Err(e) => {
                warn!(job_id, error = %e, "job watcher lost the scheduler");
                let _ = tx.send(JobEvent::Failed(e.to_string()));
                return;
            }
        };

        let Some(event) = terminal_event(status) else {
            continue;
        };
        debug!(job_id, ?event, "job finished");
        let _ = tx.send(event);
        return;
    }
}

/// What the scheduler currently reports about one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum JobStatus {
    /// The scheduler no longer knows the job (purged from history).
    Gone,
    State {
        state: Option<i32>,
        message: Option<String>,
    },
}

fn terminal_event(status: JobStatus) -> Option<JobEvent> {
    match status {
        JobStatus::Gone => Some(JobEvent::NoMoreEvents),
        JobStatus::State { state, message } => match state? {
            JOB_STATE_COMPLETED => Some(JobEvent::Completed),
            JOB_STATE_CANCELED => Some(JobEvent::Cancelled),
            JOB_STATE_ABORTED => Some(JobEvent::Failed(
                message.unwrap_or_else(|| "job aborted by the printing system".into()),
            )),
            _ => None,
        },
    }
}

/// `job-state` and `job-state-message` of `job_id` on `uri`.
async fn job_status(uri: &Uri, job_id: i32) -> Result<JobStatus> {
    let operation = IppOperationBuilder::get_job_attributes(uri.clone(), job_id).build();
    let client = AsyncIppClient::new(uri.clone());

    let response = client
        .send(operation)
        .await
        .map_err(|e| HtmlPrintError::Ipp(format!("Get-Job-Attributes: {e}")))?;

    let code = response.header().status_code();
    if code == StatusCode::ClientErrorNotFound {
        return Ok(JobStatus::Gone);
    }
    if !code.is_success() {
        return Err(HtmlPrintError::Ipp(format!(
            "Get-Job-Attributes returned status {code:?}"
        )));
    }

    let mut state = None;
    let mut message = None;
    for group in response.attributes().groups_of(DelimiterTag::JobAttributes) {
        let attributes = group.attributes();
        if let Some(value) = attributes
            .get(IppAttribute::JOB_STATE)
            .and_then(|a| as_integer(a.value()))
        {
            state = Some(value);
        }
        if let Some(attr) = attributes.get("job-state-message") {
            let text = attr.value().to_string();
            if !text.is_empty() {
                message = Some(text);
            }
        }
    }
    Ok(JobStatus::State { state, message })
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

fn as_integer(value: &IppValue) -> Option<i32> {
    match value {
        IppValue::Integer(n) | IppValue::Enum(n) => Some(*n),
        _ => None,
    }
}

fn parse_snapshot(printer_name: &str, attrs: &IppAttributes) -> PrinterSnapshot {
    let mut state = PrinterState::Idle;
    let mut accepting_jobs = true;
    let mut state_message = None;

    for group in attrs.groups_of(DelimiterTag::PrinterAttributes) {
        let attributes = group.attributes();
        if let Some(code) = attributes.get("printer-state").and_then(|a| as_integer(a.value())) {
            state = match code {
                PRINTER_STATE_PROCESSING => PrinterState::Processing,
                PRINTER_STATE_STOPPED => PrinterState::Stopped,
                _ => PrinterState::Idle,
            };
        }
        if let Some(attr) = attributes.get("printer-is-accepting-jobs") {
            if let IppValue::Boolean(accepting) = attr.value() {
                accepting_jobs = *accepting;
            }
        }
        if let Some(attr) = attributes.get("printer-state-message") {
            let text = attr.value().to_string();
            if !text.is_empty() {
                state_message = Some(text);
            }
        }
    }

    PrinterSnapshot {
        name: printer_name.to_string(),
        state,
        accepting_jobs,
        state_message,
    }
}

fn extract_job_id(attrs: &IppAttributes) -> Option<i32> {
    attrs
        .groups_of(DelimiterTag::JobAttributes)
        .find_map(|group| group.attributes().get("job-id").and_then(|a| as_integer(a.value())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::dispatcher::{JobDispatcher, JobOutcome};
    use htmlprint_core::{Charset, PrinterProfile};
    use htmlprint_document::ConversionPipeline;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const POLL: Duration = Duration::from_millis(10);

    fn job_response(status: StatusCode, job_state: Option<i32>) -> IppRequestResponse {
        let mut response = IppRequestResponse::new_response(IppVersion::v1_1(), status, 1);
        let attrs = response.attributes_mut();
        attrs.add(
            DelimiterTag::JobAttributes,
            IppAttribute::new("job-id", IppValue::Integer(42)),
        );
        if let Some(state) = job_state {
            attrs.add(
                DelimiterTag::JobAttributes,
                IppAttribute::new(IppAttribute::JOB_STATE, IppValue::Enum(state)),
            );
        }
        response
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    /// Consume one HTTP request (fixed-length or chunked body).
    async fn read_http_request(stream: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            let Some(end) = find(&buf, b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let body = &buf[end + 4..];
            let complete = match head.lines().find_map(|l| l.strip_prefix("content-length:")) {
                Some(len) => body.len() >= len.trim().parse::<usize>().unwrap_or(0),
                None if head.contains("transfer-encoding: chunked") => {
                    find(body, b"0\r\n\r\n").is_some()
                }
                None => true,
            };
            if complete {
                return;
            }
        }
    }

    /// Local scheduler answering every IPP request with `response`.
    async fn scheduler(response: IppRequestResponse) -> Uri {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let body = response.to_bytes();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let body = body.clone();
                tokio::spawn(async move {
                    read_http_request(&mut stream).await;
                    let head = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/ipp\r\n\
                         Content-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    let _ = stream.write_all(head.as_bytes()).await;
                    let _ = stream.write_all(&body).await;
                    let _ = stream.shutdown().await;
                });
            }
        });
        format!("ipp://127.0.0.1:{port}/printers/lp").parse().unwrap()
    }

    async fn watched(response: IppRequestResponse) -> JobEvent {
        let uri = scheduler(response).await;
        let (tx, rx) = oneshot::channel();
        tokio::spawn(watch_job(uri, 42, POLL, tx));
        tokio::time::timeout(Duration::from_secs(10), rx)
            .await
            .expect("watcher reported nothing")
            .unwrap()
    }

    #[test]
    fn job_states_map_to_events() {
        let state = |state| JobStatus::State { state, message: None };
        assert_eq!(terminal_event(state(Some(9))), Some(JobEvent::Completed));
        assert_eq!(terminal_event(state(Some(7))), Some(JobEvent::Cancelled));
        assert!(matches!(terminal_event(state(Some(8))), Some(JobEvent::Failed(_))));
        assert_eq!(terminal_event(state(Some(5))), None);
        // A response without job-state says nothing about the outcome.
        assert_eq!(terminal_event(state(None)), None);
        assert_eq!(terminal_event(JobStatus::Gone), Some(JobEvent::NoMoreEvents));
    }

    #[tokio::test]
    async fn aborted_job_is_reported_as_failed() {
        let event = watched(job_response(StatusCode::SuccessfulOk, Some(JOB_STATE_ABORTED))).await;
        assert!(matches!(event, JobEvent::Failed(_)));
    }

    #[tokio::test]
    async fn completed_job_is_reported_as_completed() {
        let event =
            watched(job_response(StatusCode::SuccessfulOk, Some(JOB_STATE_COMPLETED))).await;
        assert_eq!(event, JobEvent::Completed);
    }

    #[tokio::test]
    async fn purged_job_has_no_more_events() {
        let event = watched(job_response(StatusCode::ClientErrorNotFound, None)).await;
        assert_eq!(event, JobEvent::NoMoreEvents);
    }

    #[tokio::test]
    async fn aborted_job_fails_the_dispatch() {
        let uri = scheduler(job_response(StatusCode::SuccessfulOk, Some(JOB_STATE_ABORTED))).await;
        let port = uri.port_u16().unwrap();
        let system = Arc::new(CupsPrintSystem::new("127.0.0.1", port).with_poll_interval(POLL));

        let profile = PrinterProfile::new("P1", "lp");
        let document = ConversionPipeline::default()
            .render("<p>job</p>", None, Some(Charset::Utf8), &profile)
            .unwrap();
        let outcome = JobDispatcher::new(system, Duration::from_secs(10))
            .submit(&document, &profile, "test")
            .await;
        assert!(matches!(outcome, JobOutcome::Failed(_)));
    }

    #[test]
    fn builds_scheduler_queue_uri() {
        let system = CupsPrintSystem::new("localhost", 631);
        let uri = system.printer_uri("Office_Laser").unwrap();
        assert_eq!(uri.to_string(), "ipp://localhost:631/printers/Office_Laser");
    }

    #[test]
    fn from_config_uses_ipp_endpoint() {
        let mut config = ServiceConfig::default();
        config.ipp_host = "print.local".into();
        config.ipp_port = 8631;
        let system = CupsPrintSystem::from_config(&config);
        let uri = system.printer_uri("lp").unwrap();
        assert_eq!(uri.to_string(), "ipp://print.local:8631/printers/lp");
    }

    #[test]
    fn rejects_unparseable_printer_names() {
        let system = CupsPrintSystem::new("localhost", 631);
        assert!(system.printer_uri("bad name %%").is_err());
    }

    #[tokio::test]
    async fn unreachable_scheduler_is_an_ipp_error() {
        // Port 9 (discard) is essentially never an IPP endpoint.
        let system = CupsPrintSystem::new("127.0.0.1", 9);
        let err = system.lookup("lp").await.unwrap_err();
        assert!(matches!(err, HtmlPrintError::Ipp(_)));
    }
}
