// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service configuration: printer profiles plus daemon settings, persisted as
// a JSON file next to the executable.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{HtmlPrintError, Result};
use crate::types::Orientation;

/// File name of the configuration file.
pub const CONFIG_FILE: &str = "htmlprint.json";

/// Default WebSocket port of the print service.
pub const DEFAULT_WEBSOCKET_PORT: u16 = 3333;

const DEFAULT_IPP_PORT: u16 = 631;
const DEFAULT_JOB_TIMEOUT_SECS: u64 = 300;
const DEFAULT_MAX_CONCURRENT_JOBS: usize = 16;

/// Millimetres per PostScript point.
const MM_PER_POINT: f64 = 25.4 / 72.0;

/// Convert millimetres to PDF points.
pub fn mm_to_points(mm: f64) -> f64 {
    mm / MM_PER_POINT
}

/// Convert PDF points to millimetres.
pub fn points_to_mm(points: f64) -> f64 {
    points * MM_PER_POINT
}

// ---------------------------------------------------------------------------
// Printer profiles
// ---------------------------------------------------------------------------

/// Page margins in millimetres. Values may be negative.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Margins {
    #[serde(rename = "marginLeft", default)]
    pub left: f64,
    #[serde(rename = "marginRight", default)]
    pub right: f64,
    #[serde(rename = "marginTop", default)]
    pub top: f64,
    #[serde(rename = "marginBottom", default)]
    pub bottom: f64,
}

/// A named printer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrinterProfile {
    /// Key of this profile in the `printers` map (filled in at load time).
    #[serde(skip)]
    pub id: String,
    /// Name under which the OS printing subsystem exposes the printer.
    pub printer_name: String,
    /// Paper width in millimetres.
    pub paper_width: f64,
    /// Paper height in millimetres.
    pub paper_height: f64,
    #[serde(flatten)]
    pub margins: Margins,
    pub page_orientation: Orientation,
    pub is_default: bool,
}

impl Default for PrinterProfile {
    fn default() -> Self {
        Self {
            id: String::new(),
            printer_name: String::new(),
            paper_width: 210.0,
            paper_height: 297.0,
            margins: Margins::default(),
            page_orientation: Orientation::Portrait,
            is_default: false,
        }
    }
}

impl PrinterProfile {
    pub fn new(id: impl Into<String>, printer_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            printer_name: printer_name.into(),
            ..Self::default()
        }
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.page_orientation = orientation;
        self
    }

    pub fn with_paper(mut self, width_mm: f64, height_mm: f64) -> Self {
        self.paper_width = width_mm;
        self.paper_height = height_mm;
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.printer_name.trim().is_empty() {
            return Err(HtmlPrintError::Config(format!(
                "printer '{}' has no printerName",
                self.id
            )));
        }
        let paper = [("paperWidth", self.paper_width), ("paperHeight", self.paper_height)];
        for (label, value) in paper {
            if !value.is_finite() || value <= 0.0 {
                return Err(HtmlPrintError::Config(format!(
                    "printer '{}' has invalid {label} {value}",
                    self.id
                )));
            }
        }
        let m = &self.margins;
        if ![m.left, m.right, m.top, m.bottom].iter().all(|v| v.is_finite()) {
            return Err(HtmlPrintError::Config(format!(
                "printer '{}' has a non-finite margin",
                self.id
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Service configuration
// ---------------------------------------------------------------------------

/// HTML rendering engine used by the conversion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderEngine {
    /// Full HTML and CSS box layout.
    #[default]
    Layout,
    /// Plain text flow honouring body font size, line height and `display: none`.
    Text,
}

/// Complete configuration of one htmlprint process. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Printer profiles keyed by id. Ordered so default selection is stable.
    pub printers: BTreeMap<String, PrinterProfile>,
    #[serde(default)]
    pub run_as_service: bool,
    #[serde(default = "default_websocket_port")]
    pub web_socket_port: u16,
    /// Host of the IPP endpoint of the OS printing subsystem (CUPS).
    #[serde(default = "default_ipp_host")]
    pub ipp_host: String,
    #[serde(default = "default_ipp_port")]
    pub ipp_port: u16,
    /// Upper bound on waiting for a submitted job to finish.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
    /// Number of requests processed concurrently by the service.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(default)]
    pub render_engine: RenderEngine,
}

fn default_websocket_port() -> u16 {
    DEFAULT_WEBSOCKET_PORT
}

fn default_ipp_host() -> String {
    "localhost".into()
}

fn default_ipp_port() -> u16 {
    DEFAULT_IPP_PORT
}

fn default_job_timeout_secs() -> u64 {
    DEFAULT_JOB_TIMEOUT_SECS
}

fn default_max_concurrent_jobs() -> usize {
    DEFAULT_MAX_CONCURRENT_JOBS
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            printers: BTreeMap::new(),
            run_as_service: false,
            web_socket_port: DEFAULT_WEBSOCKET_PORT,
            ipp_host: default_ipp_host(),
            ipp_port: DEFAULT_IPP_PORT,
            job_timeout_secs: DEFAULT_JOB_TIMEOUT_SECS,
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            render_engine: RenderEngine::default(),
        }
    }
}

impl ServiceConfig {
    /// Build a configuration from a set of profiles, keyed by their ids.
    pub fn with_printers(profiles: impl IntoIterator<Item = PrinterProfile>) -> Self {
        Self {
            printers: profiles.into_iter().map(|p| (p.id.clone(), p)).collect(),
            ..Self::default()
        }
    }

    /// The configuration written by `--init`.
    pub fn starter() -> Self {
        Self::with_printers([PrinterProfile::new("ExamplePrinter", "ExamplePrinter").as_default()])
    }

    /// Parse and validate a configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut config: Self = serde_json::from_str(json)
            .map_err(|e| HtmlPrintError::Config(format!("cannot parse configuration: {e}")))?;
        for (id, profile) in config.printers.iter_mut() {
            profile.id = id.clone();
        }
        config.validate()?;
        Ok(config)
    }

    /// Load the configuration from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(HtmlPrintError::MissingFile(path.display().to_string()));
        }
        let data = std::fs::read_to_string(path)?;
        let config = Self::from_json(&data)?;
        info!(
            path = %path.display(),
            printers = config.printers.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Persist the configuration as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Write the starter configuration to `path`, replacing any existing file.
    pub fn init(path: &Path) -> Result<Self> {
        let config = Self::starter();
        config.save(path)?;
        info!(path = %path.display(), "starter configuration written");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for profile in self.printers.values() {
            profile.validate()?;
        }
        let defaults: Vec<&str> = self
            .printers
            .values()
            .filter(|p| p.is_default)
            .map(|p| p.id.as_str())
            .collect();
        if defaults.len() > 1 {
            return Err(HtmlPrintError::Config(format!(
                "more than one default printer: {}",
                defaults.join(", ")
            )));
        }
        if self.max_concurrent_jobs == 0 {
            return Err(HtmlPrintError::Config("maxConcurrentJobs must be at least 1".into()));
        }
        if self.job_timeout_secs == 0 {
            return Err(HtmlPrintError::Config("jobTimeoutSecs must be at least 1".into()));
        }
        Ok(())
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    /// `htmlprint.json` in the directory holding the running executable,
    /// falling back to the working directory.
    pub fn default_path() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "printers": {
            "P1": { "printerName": "Office_Laser", "paperWidth": 210.0,
                    "paperHeight": 297.0, "marginLeft": 5, "marginTop": -2,
                    "pageOrientation": "LANDSCAPE", "isDefault": true },
            "P2": { "printerName": "Label" }
        },
        "webSocketPort": 4000
    }"#;

    #[test]
    fn parses_profiles_with_defaults() {
        let config = ServiceConfig::from_json(SAMPLE).unwrap();
        assert_eq!(config.web_socket_port, 4000);
        assert_eq!(config.ipp_port, 631);
        assert_eq!(config.job_timeout_secs, 300);
        assert_eq!(config.render_engine, RenderEngine::Layout);
        assert!(!config.run_as_service);

        let p1 = &config.printers["P1"];
        assert_eq!(p1.id, "P1");
        assert_eq!(p1.page_orientation, Orientation::Landscape);
        assert_eq!(p1.margins.left, 5.0);
        assert_eq!(p1.margins.top, -2.0);
        assert_eq!(p1.margins.right, 0.0);

        let p2 = &config.printers["P2"];
        assert_eq!(p2.paper_width, 210.0);
        assert_eq!(p2.paper_height, 297.0);
        assert_eq!(p2.page_orientation, Orientation::Portrait);
        assert!(!p2.is_default);
    }

    #[test]
    fn selects_text_engine() {
        let json = r#"{"printers":{},"renderEngine":"text"}"#;
        let config = ServiceConfig::from_json(json).unwrap();
        assert_eq!(config.render_engine, RenderEngine::Text);
        assert!(ServiceConfig::from_json(r#"{"printers":{},"renderEngine":"gecko"}"#).is_err());
    }

    #[test]
    fn rejects_two_defaults() {
        let json = r#"{"printers":{
            "A":{"printerName":"a","isDefault":true},
            "B":{"printerName":"b","isDefault":true}}}"#;
        let err = ServiceConfig::from_json(json).unwrap_err();
        assert!(matches!(err, HtmlPrintError::Config(_)));
    }

    #[test]
    fn rejects_non_positive_paper() {
        let json = r#"{"printers":{"A":{"printerName":"a","paperWidth":0}}}"#;
        assert!(ServiceConfig::from_json(json).is_err());
    }

    #[test]
    fn missing_printers_key_is_an_error() {
        assert!(ServiceConfig::from_json(r#"{"webSocketPort":1}"#).is_err());
    }

    #[test]
    fn init_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        let written = ServiceConfig::init(&path).unwrap();
        let loaded = ServiceConfig::load(&path).unwrap();
        assert_eq!(written, loaded);
        assert!(loaded.printers["ExamplePrinter"].is_default);
    }

    #[test]
    fn load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ServiceConfig::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, HtmlPrintError::MissingFile(_)));
    }

    #[test]
    fn unit_conversion() {
        assert!((mm_to_points(25.4) - 72.0).abs() < 1e-9);
        assert!((points_to_mm(mm_to_points(210.0)) - 210.0).abs() < 1e-9);
    }
}
