// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// One-shot mode: read an HTML file (plus optional CSS), render it for the
// selected printer profile, then either save the PDF or print it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, instrument};

use htmlprint_core::error::{HtmlPrintError, Result};
use htmlprint_core::{Charset, ServiceConfig};
use htmlprint_document::{ConversionPipeline, RenderedDocument};
use htmlprint_print::{JobDispatcher, PrintSystem, PrinterDirectory};

use crate::cli::Cli;

#[derive(Debug, Clone)]
pub struct FileJob {
    pub html_file: PathBuf,
    pub css_file: Option<PathBuf>,
    pub printer_id: Option<String>,
    pub charset: Charset,
    /// Save the PDF here instead of sending it to the printer.
    pub to_pdf: Option<PathBuf>,
}

impl FileJob {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let html_file = cli.html_file.clone().ok_or_else(|| {
            HtmlPrintError::Usage("HTML file argument missing (see --help)".into())
        })?;
        let charset = Charset::parse(&cli.charset).ok_or(HtmlPrintError::UnsupportedCharset)?;
        Ok(Self {
            html_file,
            css_file: cli.css.clone(),
            printer_id: cli.printer.clone(),
            charset,
            to_pdf: cli.to_pdf.clone(),
        })
    }

    #[instrument(skip_all, fields(file = %self.html_file.display()))]
    pub async fn run(
        self,
        config: Arc<ServiceConfig>,
        system: Arc<dyn PrintSystem>,
        pipeline: ConversionPipeline,
    ) -> Result<()> {
        let html = read_text(&self.html_file, self.charset)?;
        let css = self
            .css_file
            .as_deref()
            .map(|path| read_text(path, self.charset))
            .transpose()?;

        let timeout = config.job_timeout();
        let directory = PrinterDirectory::new(config, Arc::clone(&system));
        let profile = directory.resolve(self.printer_id.as_deref())?.clone();
        info!(printer = %profile.id, name = %profile.printer_name, "printer profile selected");

        let charset = self.charset;
        let render_profile = profile.clone();
        let document: RenderedDocument = tokio::task::spawn_blocking(move || {
            pipeline.render(&html, css.as_deref(), Some(charset), &render_profile)
        })
        .await
        .map_err(|e| HtmlPrintError::Conversion(format!("render task failed: {e}")))??;

        if let Some(out) = &self.to_pdf {
            document.write_to(out)?;
            info!(path = %out.display(), pages = document.page_count, "PDF written");
            return Ok(());
        }

        let snapshot = directory.query_live_state(&profile).await?;
        info!(state = ?snapshot.availability(), "printer found");

        let job_name = self
            .html_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "htmlprint".to_string());
        let dispatcher = JobDispatcher::new(system, timeout);
        dispatcher
            .submit(&document, &profile, &job_name)
            .await
            .into_result(timeout)?;

        info!("printing complete");
        Ok(())
    }
}

fn read_text(path: &Path, charset: Charset) -> Result<String> {
    if !path.is_file() {
        return Err(HtmlPrintError::MissingFile(path.display().to_string()));
    }
    charset.decode(&std::fs::read(path)?)
}
