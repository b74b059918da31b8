// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// htmlprint-document: HTML to PDF conversion for the htmlprint service.
//
// Provides the conversion pipeline (charset check, CSS injection, page
// geometry, rendering, rotation stamping) and the pluggable rendering engine.

pub mod engine;
pub mod geometry;
pub mod html;
pub mod pipeline;

pub use engine::{HtmlEngine, LayoutEngine, TextLayoutEngine};
pub use geometry::{PageGeometry, Rotation};
pub use pipeline::{ConversionPipeline, RenderedDocument};
