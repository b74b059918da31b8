// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTML rendering engines.
//
// printpdf 0.8 uses a data-oriented API: documents are built by constructing
// `PdfPage` structs containing `Vec<Op>` operation lists, then serialised via
// `PdfDocument::save()`. Its `html` feature adds `PdfDocument::from_html`, a
// CSS box layout over an html5ever DOM, which backs `LayoutEngine`.

use std::collections::BTreeMap;

use htmlprint_core::error::{HtmlPrintError, Result};
use htmlprint_core::points_to_mm;
use printpdf::{
    BuiltinFont, GeneratePdfOptions, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg,
    Point, Pt, TextItem,
};
use tracing::{debug, instrument, warn};

use crate::geometry::PageGeometry;
use crate::html;

/// Something that turns an HTML document into PDF bytes laid out on `geometry`.
///
/// Engines are called from blocking worker threads and must not assume an
/// async runtime.
pub trait HtmlEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Render `html` to a complete PDF. Malformed input is a
    /// [`HtmlPrintError::Conversion`].
    fn render(&self, html: &str, geometry: &PageGeometry, title: &str) -> Result<Vec<u8>>;
}

/// HTML and CSS box layout through printpdf's html renderer.
///
/// Style sheets in the document, including CSS injected by the pipeline, are
/// inlined onto matching elements before layout. The printer profile's
/// margins are applied as the body margin and win over document rules.
#[derive(Debug, Clone, Default)]
pub struct LayoutEngine;

impl LayoutEngine {
    /// Prepend the page margins as a body rule.
    fn with_page_margins(html: &str, geometry: &PageGeometry) -> String {
        let m = &geometry.margins;
        format!(
            "<style>body {{ margin: {:.2}pt {:.2}pt {:.2}pt {:.2}pt; }}</style>\n{html}",
            m.top, m.right, m.bottom, m.left
        )
    }
}

impl HtmlEngine for LayoutEngine {
    fn name(&self) -> &str {
        "html-layout"
    }

    #[instrument(skip(self, html, geometry), fields(html_len = html.len()))]
    fn render(&self, html: &str, geometry: &PageGeometry, title: &str) -> Result<Vec<u8>> {
        // Truncated markup fails here as it does in the text engine.
        html::parse(html)?;

        let options = GeneratePdfOptions {
            page_width: Some(points_to_mm(geometry.width_pt) as f32),
            page_height: Some(points_to_mm(geometry.height_pt) as f32),
            ..GeneratePdfOptions::default()
        };
        let html = Self::with_page_margins(html, geometry);

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let no_assets = BTreeMap::new();
        let mut doc = PdfDocument::from_html(&html, &no_assets, &no_assets, &options, &mut warnings)
            .map_err(|e| HtmlPrintError::Conversion(format!("html layout failed: {e}")))?;
        if doc.pages.is_empty() {
            let page_w = Mm(points_to_mm(geometry.width_pt) as f32);
            let page_h = Mm(points_to_mm(geometry.height_pt) as f32);
            doc.with_pages(vec![PdfPage::new(page_w, page_h, Vec::new())]);
        }
        if doc.metadata.info.document_title.is_empty() {
            doc.metadata.info.document_title = title.to_string();
        }

        if !warnings.is_empty() {
            warn!(count = warnings.len(), "html layout reported warnings");
        }
        debug!(pages = doc.pages.len(), "html layout complete");
        Ok(doc.save(&PdfSaveOptions::default(), &mut warnings))
    }
}

/// Extracts the document text and lays it out with the standard Helvetica
/// font. Body `font-size` and `line-height` rules override the defaults.
#[derive(Debug, Clone)]
pub struct TextLayoutEngine {
    font_size_pt: f32,
    line_height_pt: f32,
}

impl Default for TextLayoutEngine {
    fn default() -> Self {
        Self {
            font_size_pt: 11.0,
            line_height_pt: 14.0,
        }
    }
}

impl TextLayoutEngine {
    pub fn new(font_size_pt: f32, line_height_pt: f32) -> Self {
        Self {
            font_size_pt,
            line_height_pt,
        }
    }
}

impl HtmlEngine for TextLayoutEngine {
    fn name(&self) -> &str {
        "text-layout"
    }

    #[instrument(skip(self, html, geometry), fields(html_len = html.len()))]
    fn render(&self, html: &str, geometry: &PageGeometry, title: &str) -> Result<Vec<u8>> {
        let parsed = html::parse(html)?;
        let font_size_pt = parsed.style.font_size_pt.unwrap_or(self.font_size_pt);
        let line_height_pt = match parsed.style.line_height {
            Some(lh) => lh.resolve(font_size_pt),
            None => font_size_pt * self.line_height_pt / self.font_size_pt,
        };

        let usable_width_pt = geometry.content_width() as f32;
        let usable_height_pt = geometry.content_height() as f32;
        if usable_width_pt <= 0.0 || usable_height_pt < line_height_pt {
            return Err(HtmlPrintError::Conversion(format!(
                "margins leave no printable area ({usable_width_pt:.1}pt x {usable_height_pt:.1}pt)"
            )));
        }

        // Average Helvetica glyph width is roughly half the font size.
        let avg_char_width_pt = 0.5 * font_size_pt;
        let max_chars_per_line = ((usable_width_pt / avg_char_width_pt) as usize).max(1);
        let lines_per_page = (usable_height_pt / line_height_pt) as usize;

        let wrapped_lines = wrap_text(&parsed.text, max_chars_per_line);

        let page_w = Mm(points_to_mm(geometry.width_pt) as f32);
        let page_h = Mm(points_to_mm(geometry.height_pt) as f32);
        let left_pt = geometry.margins.left as f32;
        // Baseline of the first line sits one font size below the top margin.
        let top_pt = (geometry.height_pt - geometry.margins.top) as f32 - font_size_pt;

        let mut doc = PdfDocument::new(title);
        let mut pages: Vec<PdfPage> = Vec::new();

        for chunk in wrapped_lines.chunks(lines_per_page) {
            let mut ops: Vec<Op> = Vec::with_capacity(chunk.len() * 5);
            for (line_idx, line) in chunk.iter().enumerate() {
                if line.is_empty() {
                    continue;
                }
                let y_pt = top_pt - (line_idx as f32 * line_height_pt);
                ops.push(Op::StartTextSection);
                ops.push(Op::SetTextCursor {
                    pos: Point {
                        x: Pt(left_pt),
                        y: Pt(y_pt),
                    },
                });
                ops.push(Op::SetFontSizeBuiltinFont {
                    size: Pt(font_size_pt),
                    font: BuiltinFont::Helvetica,
                });
                ops.push(Op::WriteTextBuiltinFont {
                    items: vec![TextItem::Text(line.clone())],
                    font: BuiltinFont::Helvetica,
                });
                ops.push(Op::EndTextSection);
            }
            pages.push(PdfPage::new(page_w, page_h, ops));
        }

        if pages.is_empty() {
            pages.push(PdfPage::new(page_w, page_h, Vec::new()));
        }

        doc.with_pages(pages);

        debug!(
            font_size_pt,
            line_height_pt,
            total_lines = wrapped_lines.len(),
            pages = doc.pages.len(),
            "text layout complete"
        );

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        Ok(doc.save(&PdfSaveOptions::default(), &mut warnings))
    }
}

/// Wrap a multi-line string so that no line exceeds `max_width` characters.
///
/// Splits on existing newlines first, then word-wraps each paragraph. Words
/// longer than `max_width` are force-broken on character boundaries.
fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    let mut result = Vec::new();

    for paragraph in text.split('\n') {
        let leading: String = paragraph.chars().take_while(|c| *c == ' ').collect();
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        if words.is_empty() {
            result.push(String::new());
            continue;
        }

        let mut current_line = String::with_capacity(max_width);
        let mut current_len = 0usize;
        if leading.len() < max_width {
            current_line.push_str(&leading);
            current_len = leading.len();
        }

        for word in words {
            let word_len = word.chars().count();
            if word_len > max_width {
                if current_len > 0 {
                    result.push(std::mem::take(&mut current_line));
                    current_len = 0;
                }
                let chars: Vec<char> = word.chars().collect();
                let mut pieces = chars.chunks(max_width).peekable();
                while let Some(piece) = pieces.next() {
                    if pieces.peek().is_some() {
                        result.push(piece.iter().collect());
                    } else {
                        current_line = piece.iter().collect();
                        current_len = piece.len();
                    }
                }
            } else if current_len == 0 || current_line.trim().is_empty() {
                current_line.push_str(word);
                current_len += word_len;
            } else if current_len + 1 + word_len <= max_width {
                current_line.push(' ');
                current_line.push_str(word);
                current_len += 1 + word_len;
            } else {
                result.push(std::mem::take(&mut current_line));
                current_line.push_str(word);
                current_len = word_len;
            }
        }

        if current_len > 0 {
            result.push(current_line);
        }
    }

    result
}
