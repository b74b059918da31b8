// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Logging setup: console output filtered by RUST_LOG (default `info`), plus
// an optional plain-text file receiving warnings and errors.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use htmlprint_core::error::{HtmlPrintError, Result};

/// Folder, next to the configuration file, holding daily service error logs.
pub const SERVICE_ERROR_LOGS_FOLDER: &str = "service_error_logs";

/// `service_error_logs/YYYYMMDD.log` beside `config_path`.
pub fn service_log_path(config_path: &Path) -> PathBuf {
    let dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let day = chrono::Local::now().format("%Y%m%d");
    dir.join(SERVICE_ERROR_LOGS_FOLDER).join(format!("{day}.log"))
}

/// Error log for a one-shot run: the HTML file with a `.log` extension.
pub fn file_log_path(html_file: &Path) -> PathBuf {
    html_file.with_extension("log")
}

/// Install the global subscriber. Call once, before any work starts.
pub fn init(error_log: Option<&Path>) -> Result<()> {
    let console = fmt::layer().with_target(false).with_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    );

    let file = match error_log {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)?;
            }
            let handle = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(handle))
                    .with_ansi(false)
                    .with_filter(LevelFilter::WARN),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| HtmlPrintError::Config(format!("cannot install logger: {e}")))?;

    if let Some(path) = error_log {
        tracing::info!(path = %path.display(), "logging errors to file");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_logs_live_beside_the_config() {
        let path = service_log_path(Path::new("/opt/htmlprint/htmlprint.json"));
        assert!(path.starts_with("/opt/htmlprint/service_error_logs"));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name.len(), "YYYYMMDD.log".len());
        assert!(name.ends_with(".log"));
    }

    #[test]
    fn file_log_replaces_extension() {
        assert_eq!(
            file_log_path(Path::new("/tmp/invoice.html")),
            PathBuf::from("/tmp/invoice.log")
        );
    }
}
