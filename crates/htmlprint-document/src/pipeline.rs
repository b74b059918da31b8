// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Conversion pipeline: HTML (+ optional CSS) → paginated PDF for one printer
// profile.

use std::path::Path;
use std::sync::Arc;

use htmlprint_core::error::{HtmlPrintError, Result};
use htmlprint_core::{Charset, PrinterProfile, RenderEngine};
use lopdf::{Document, Object};
use tracing::{debug, info, instrument};

use crate::engine::{HtmlEngine, LayoutEngine, TextLayoutEngine};
use crate::geometry::{PageGeometry, Rotation};

const HEAD_CLOSE: &str = "</head>";

/// A finished document ready for dispatch.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub bytes: Vec<u8>,
    pub page_count: usize,
    pub geometry: PageGeometry,
}

impl RenderedDocument {
    /// Write the PDF to `path`.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, &self.bytes)?;
        info!(path = %path.display(), pages = self.page_count, "wrote PDF");
        Ok(())
    }
}

/// Stateless converter shared by every request.
#[derive(Clone)]
pub struct ConversionPipeline {
    engine: Arc<dyn HtmlEngine>,
}

impl Default for ConversionPipeline {
    fn default() -> Self {
        Self::new(Arc::new(TextLayoutEngine::default()))
    }
}

impl std::fmt::Debug for ConversionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionPipeline")
            .field("engine", &self.engine.name())
            .finish()
    }
}

impl ConversionPipeline {
    pub fn new(engine: Arc<dyn HtmlEngine>) -> Self {
        Self { engine }
    }

    /// Pipeline backed by the configured built-in engine.
    pub fn for_engine(kind: RenderEngine) -> Self {
        match kind {
            RenderEngine::Layout => Self::new(Arc::new(LayoutEngine)),
            RenderEngine::Text => Self::new(Arc::new(TextLayoutEngine::default())),
        }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Render `html` for `profile`.
    ///
    /// `charset` is `None` when the request named a charset that is not
    /// supported; such requests fail before anything is rendered.
    #[instrument(
        skip(self, html, extra_css, profile),
        fields(printer = %profile.id, html_len = html.len(), engine = self.engine.name())
    )]
    pub fn render(
        &self,
        html: &str,
        extra_css: Option<&str>,
        charset: Option<Charset>,
        profile: &PrinterProfile,
    ) -> Result<RenderedDocument> {
        let charset = charset.ok_or(HtmlPrintError::UnsupportedCharset)?;
        check_charset(charset, html)?;

        let html = match extra_css {
            Some(css) => inject_css(html, css)?,
            None => html.to_string(),
        };

        let geometry = PageGeometry::for_profile(profile);
        debug!(
            width_pt = geometry.width_pt,
            height_pt = geometry.height_pt,
            rotation = geometry.rotation.0,
            "page geometry"
        );

        let pdf = self.engine.render(&html, &geometry, &profile.id)?;
        let (bytes, page_count) = stamp_rotation(&pdf, geometry.rotation)?;

        info!(pages = page_count, bytes = bytes.len(), "document rendered");

        Ok(RenderedDocument {
            bytes,
            page_count,
            geometry,
        })
    }
}

fn check_charset(charset: Charset, html: &str) -> Result<()> {
    match charset.first_unencodable(html) {
        Some(found) => Err(HtmlPrintError::CharsetMismatch {
            charset: charset.name(),
            found,
        }),
        None => Ok(()),
    }
}

/// Insert `css` as a `<style>` element immediately before the first closing
/// head tag.
pub fn inject_css(html: &str, css: &str) -> Result<String> {
    let at = html.to_ascii_lowercase().find(HEAD_CLOSE).ok_or_else(|| {
        HtmlPrintError::Structural("cannot add CSS: document has no </head> tag".into())
    })?;

    let style = format!("\n<style>{css}</style>\n");
    let mut out = String::with_capacity(html.len() + style.len());
    out.push_str(&html[..at]);
    out.push_str(&style);
    out.push_str(&html[at..]);
    Ok(out)
}

/// Set `/Rotate` on every page and return the re-serialised PDF and its page
/// count.
fn stamp_rotation(pdf: &[u8], rotation: Rotation) -> Result<(Vec<u8>, usize)> {
    let mut doc = Document::load_mem(pdf)
        .map_err(|err| HtmlPrintError::Pdf(format!("engine produced an unreadable PDF: {err}")))?;

    let pages = doc.get_pages();
    for page_id in pages.values() {
        if let Ok(Object::Dictionary(dict)) = doc.get_object_mut(*page_id) {
            dict.set("Rotate", Object::Integer(rotation.0));
        }
    }

    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|err| HtmlPrintError::Pdf(format!("failed to serialise rotated PDF: {err}")))?;

    Ok((output, pages.len()))
}
