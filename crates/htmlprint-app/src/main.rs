// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// htmlprint: render HTML to PDF and print it.
//
// Entry point. Loads configuration, initialises logging, then either prints a
// single file or runs the WebSocket print service.

mod cli;
mod logging;
mod services;

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};

use htmlprint_core::ServiceConfig;
use htmlprint_core::error::{HtmlPrintError, Result};
use htmlprint_document::ConversionPipeline;
use htmlprint_print::{CupsPrintSystem, PrintSystem};

use cli::Cli;
use services::file_job::FileJob;

#[tokio::main]
async fn main() -> ExitCode {
    let Some(cli) = Cli::from_args(std::env::args_os()) else {
        return match Cli::print_usage() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("htmlprint: {e}");
                ExitCode::FAILURE
            }
        };
    };
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if tracing::dispatcher::has_been_set() {
                error!(error = %e, kind = ?e.kind(), "htmlprint failed");
            } else {
                eprintln!("htmlprint: {e}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();

    if cli.init {
        logging::init(None)?;
        ServiceConfig::init(&config_path)?;
        return Ok(());
    }

    let loaded = ServiceConfig::load(&config_path);
    let run_service = cli.run_service || loaded.as_ref().is_ok_and(|c| c.run_as_service);
    if cli.needs_usage(run_service) {
        return Cli::print_usage();
    }

    let error_log = if !cli.error_log {
        None
    } else if run_service {
        Some(logging::service_log_path(&config_path))
    } else {
        cli.html_file.as_deref().map(logging::file_log_path)
    };
    logging::init(error_log.as_deref())?;

    let mut config = loaded.map_err(|e| match e {
        HtmlPrintError::MissingFile(path) => HtmlPrintError::Config(format!(
            "configuration file {path} not found; run with --init to create one"
        )),
        other => other,
    })?;
    cli.apply_overrides(&mut config);
    info!(
        path = %config_path.display(),
        printers = config.printers.len(),
        service = config.run_as_service,
        "configuration applied"
    );

    let system: Arc<dyn PrintSystem> = Arc::new(CupsPrintSystem::from_config(&config));
    let pipeline = ConversionPipeline::for_engine(config.render_engine);
    info!(engine = pipeline.engine_name(), "conversion engine selected");
    let config = Arc::new(config);

    if config.run_as_service {
        services::daemon::run(config, system, pipeline).await
    } else {
        FileJob::from_cli(&cli)?.run(config, system, pipeline).await
    }
}
