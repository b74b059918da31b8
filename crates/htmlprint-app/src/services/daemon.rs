// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service mode: serve print requests over WebSocket until the operator types
// `exit` or sends Ctrl-C.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{info, warn};

use htmlprint_core::ServiceConfig;
use htmlprint_core::error::Result;
use htmlprint_document::ConversionPipeline;
use htmlprint_print::{PrintServer, PrintSystem, RequestCoordinator};

/// Typed on stdin to stop the service.
pub const EXIT_COMMAND: &str = "exit";

/// Start the server, block until asked to stop, then shut it down.
///
/// A port that cannot be bound is fatal.
pub async fn run(
    config: Arc<ServiceConfig>,
    system: Arc<dyn PrintSystem>,
    pipeline: ConversionPipeline,
) -> Result<()> {
    let port = config.web_socket_port;
    info!(
        port,
        printers = config.printers.len(),
        max_jobs = config.max_concurrent_jobs,
        "starting print service"
    );

    let coordinator = Arc::new(RequestCoordinator::new(config, system, pipeline));
    let mut server = PrintServer::new(Some(port), coordinator);
    server.start().await?;

    println!("Print service running on port {port}. Type \"{EXIT_COMMAND}\" to stop.");

    tokio::select! {
        _ = wait_for_exit(tokio::io::stdin()) => info!("exit requested"),
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("interrupt received"),
            Err(e) => warn!(error = %e, "cannot listen for Ctrl-C"),
        },
    }

    server.stop().await
}

/// Resolve once a line reading `exit` arrives. If input ends first (no
/// terminal attached) this never resolves, leaving shutdown to signals.
async fn wait_for_exit<R: AsyncRead + Unpin>(input: R) {
    let mut lines = BufReader::new(input).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().eq_ignore_ascii_case(EXIT_COMMAND) => return,
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => std::future::pending::<()>().await,
        }
    }
}
