// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command-line interface.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{CommandFactory, Parser};

use htmlprint_core::ServiceConfig;
use htmlprint_core::error::Result;

#[derive(Debug, Parser)]
#[command(name = "htmlprint")]
#[command(version, about = "Render HTML to PDF and print it, once or as a WebSocket service")]
#[command(after_help = "Supported charsets: UTF8, UTF16, ASCII and 8859.")]
pub struct Cli {
    /// HTML file to print (ignored when running as a service)
    pub html_file: Option<PathBuf>,

    /// Printer id from the configuration file (default printer if omitted)
    #[arg(short, long, value_name = "ID")]
    pub printer: Option<String>,

    /// Additional CSS file injected before </head>
    #[arg(long, value_name = "FILE")]
    pub css: Option<PathBuf>,

    /// Charset used to read the HTML and CSS files
    #[arg(long, value_name = "NAME", default_value = "UTF8")]
    pub charset: String,

    /// Write the PDF to FILE instead of printing it
    #[arg(long, value_name = "FILE")]
    pub to_pdf: Option<PathBuf>,

    /// Write a starter configuration file and exit
    #[arg(long)]
    pub init: bool,

    /// Configuration file path (default: htmlprint.json next to the executable)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Also write warnings and errors to a log file
    #[arg(long)]
    pub error_log: bool,

    /// Run as a WebSocket print service
    #[arg(short = 's', long)]
    pub run_service: bool,

    /// WebSocket port of the print service
    #[arg(short = 'w', long, value_name = "PORT")]
    pub websocket_port: Option<u16>,
}

impl Cli {
    /// Parse `args` (program name first). `None` when no arguments were
    /// given and usage should be shown instead.
    pub fn from_args<I, T>(args: I) -> Option<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        if args.len() <= 1 {
            return None;
        }
        Some(Self::parse_from(args))
    }

    /// A file-mode run without an HTML file only shows usage.
    pub fn needs_usage(&self, run_service: bool) -> bool {
        !run_service && !self.init && self.html_file.is_none()
    }

    pub fn print_usage() -> Result<()> {
        Self::command().print_help()?;
        println!();
        Ok(())
    }

    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(ServiceConfig::default_path)
    }

    /// Service flags given on the command line win over the file.
    pub fn apply_overrides(&self, config: &mut ServiceConfig) {
        if self.run_service {
            config.run_as_service = true;
        }
        if let Some(port) = self.websocket_port {
            config.web_socket_port = port;
        }
    }
}
