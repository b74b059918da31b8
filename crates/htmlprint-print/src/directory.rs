// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer directory: maps request printer ids onto configured profiles, asks
// the OS for live printer state, and owns the per-printer admission gates.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, instrument, warn};

use htmlprint_core::error::{HtmlPrintError, Result};
use htmlprint_core::{PrinterProfile, PrinterSnapshot, PrinterState, ServiceConfig};

use crate::system::PrintSystem;

/// Exclusive right to use one printer until dropped.
#[derive(Debug)]
pub struct AdmissionPermit {
    printer_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl AdmissionPermit {
    pub fn printer_id(&self) -> &str {
        &self.printer_id
    }
}

pub struct PrinterDirectory {
    config: Arc<ServiceConfig>,
    system: Arc<dyn PrintSystem>,
    gates: HashMap<String, Arc<Mutex<()>>>,
}

impl PrinterDirectory {
    pub fn new(config: Arc<ServiceConfig>, system: Arc<dyn PrintSystem>) -> Self {
        let gates = config
            .printers
            .keys()
            .map(|id| (id.clone(), Arc::new(Mutex::new(()))))
            .collect();
        Self {
            config,
            system,
            gates,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Resolve a request's printer id to its profile.
    ///
    /// With no id: a single profile is used as-is; otherwise the profile
    /// flagged default wins, then the lowest id.
    pub fn resolve(&self, printer_id: Option<&str>) -> Result<&PrinterProfile> {
        let printers = &self.config.printers;
        match printer_id {
            Some(id) => printers
                .get(id)
                .ok_or_else(|| HtmlPrintError::PrinterNotFound(id.to_string())),
            None => printers
                .values()
                .find(|p| p.is_default)
                .or_else(|| printers.values().next())
                .ok_or(HtmlPrintError::NoDefaultPrinter),
        }
    }

    /// Reserve `profile`'s printer without waiting. `None` if another request
    /// holds it.
    pub fn try_admit(&self, profile: &PrinterProfile) -> Option<AdmissionPermit> {
        let gate = self.gates.get(&profile.id)?;
        match Arc::clone(gate).try_lock_owned() {
            Ok(guard) => Some(AdmissionPermit {
                printer_id: profile.id.clone(),
                _guard: guard,
            }),
            Err(_) => {
                debug!(printer = %profile.id, "admission gate held");
                None
            }
        }
    }

    /// Ask the OS for the current state of `profile`'s printer.
    #[instrument(skip(self, profile), fields(printer = %profile.id, name = %profile.printer_name))]
    pub async fn query_live_state(&self, profile: &PrinterProfile) -> Result<PrinterSnapshot> {
        self.system
            .lookup(&profile.printer_name)
            .await?
            .ok_or_else(|| {
                warn!("printer no longer exposed by the OS");
                HtmlPrintError::PrinterUnavailable(profile.printer_name.clone())
            })
    }
}

/// Turn a live snapshot into an error unless the printer can take a job now.
pub fn ensure_available(snapshot: &PrinterSnapshot) -> Result<()> {
    let name = snapshot.name.clone();
    match snapshot.availability() {
        PrinterState::Stopped => Err(HtmlPrintError::PrinterOffline(name)),
        PrinterState::Processing => Err(HtmlPrintError::PrinterBusy(name)),
        PrinterState::NotAcceptingJobs => Err(HtmlPrintError::PrinterNotAccepting(name)),
        PrinterState::Idle => Ok(()),
    }
}
