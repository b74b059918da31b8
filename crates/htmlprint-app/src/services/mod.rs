// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Run modes: a single file printed (or saved) once, or the long-running
// WebSocket print service.

pub mod daemon;
pub mod file_job;
