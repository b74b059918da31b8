// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTML parsing for the text engine.
//
// Documents are parsed with html5ever (through kuchiki) and flattened into
// printable lines. Author style sheets are read for the properties the text
// engine can honour: `display: none` on any selector, and `font-size` /
// `line-height` on the root or body element.

use std::borrow::Cow;
use std::cell::RefCell;
use std::rc::Rc;

use htmlprint_core::error::{HtmlPrintError, Result};
use kuchiki::traits::TendrilSink;
use kuchiki::{NodeRef, ParseOpts};
use tracing::debug;

/// Elements whose content is never printed.
const HIDDEN: &[&str] = &["head", "noscript", "script", "style", "template", "title"];

/// Elements that start and end on their own line.
const BLOCK: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "dd", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hr", "html", "li", "main", "nav", "ol", "p", "pre", "section", "table", "tbody", "td",
    "tfoot", "th", "thead", "tr", "ul",
];

/// Tokenizer error html5ever reports when input ends inside markup.
const TRUNCATED: &str = "Unexpected EOF";

/// Root font size that relative lengths resolve against.
const BASE_FONT_PT: f32 = 12.0;

/// Text properties set by the document's style sheets.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TextStyle {
    pub font_size_pt: Option<f32>,
    pub line_height: Option<LineHeight>,
}

/// `line-height` either as an absolute length or a multiple of the font size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineHeight {
    Points(f32),
    Factor(f32),
}

impl LineHeight {
    pub fn resolve(self, font_size_pt: f32) -> f32 {
        match self {
            Self::Points(pt) => pt,
            Self::Factor(factor) => factor * font_size_pt,
        }
    }
}

/// A parsed document reduced to what the text engine prints.
#[derive(Debug, Clone, PartialEq)]
pub struct TextDocument {
    /// Lines separated by `\n`; runs of blank lines collapse to one.
    pub text: String,
    pub style: TextStyle,
}

/// Parse `html` and extract its printable text and body style.
///
/// html5ever recovers from most malformed markup the way a browser does.
/// Input that ends inside a tag, comment or doctype is rejected.
pub fn parse(html: &str) -> Result<TextDocument> {
    let errors: Rc<RefCell<Vec<Cow<'static, str>>>> = Rc::default();
    let sink = Rc::clone(&errors);
    let opts = ParseOpts {
        on_parse_error: Some(Box::new(move |message: Cow<'static, str>| {
            sink.borrow_mut().push(message)
        })),
        ..ParseOpts::default()
    };
    let document = kuchiki::parse_html_with_options(opts).one(html);

    let errors = errors.borrow();
    if errors.iter().any(|e| *e == TRUNCATED) {
        return Err(HtmlPrintError::Conversion("document ends inside markup".into()));
    }
    debug!(recovered = errors.len(), "html parsed");

    let rules = style_rules(&document);
    let style = apply_rules(&document, &rules);

    let mut out = TextSink::default();
    walk(&document, &mut out, false);
    Ok(TextDocument {
        text: out.finish(),
        style,
    })
}

/// Extract the printable text of an HTML document.
pub fn extract_text(html: &str) -> Result<String> {
    parse(html).map(|doc| doc.text)
}

/// One `selector { declarations }` rule from an author style sheet.
#[derive(Debug, Clone, PartialEq)]
struct StyleRule {
    selector: String,
    declarations: Vec<(String, String)>,
}

/// Rules from every `<style>` element, in document order.
fn style_rules(document: &NodeRef) -> Vec<StyleRule> {
    let Ok(styles) = document.select("style") else {
        return Vec::new();
    };
    styles
        .flat_map(|style| parse_rules(&style.text_contents()))
        .collect()
}

fn parse_rules(css: &str) -> Vec<StyleRule> {
    let css = strip_comments(css);
    let mut rules = Vec::new();
    for block in css.split('}') {
        let Some((selector, body)) = block.split_once('{') else {
            continue;
        };
        let selector = selector.trim();
        // At-rules (@media, @page, ...) are not applied.
        if selector.is_empty() || selector.starts_with('@') {
            continue;
        }
        let declarations: Vec<(String, String)> = body
            .split(';')
            .filter_map(|decl| decl.split_once(':'))
            .map(|(name, value)| {
                let value = value.trim().trim_end_matches("!important").trim_end();
                (name.trim().to_ascii_lowercase(), value.to_ascii_lowercase())
            })
            .filter(|(name, value)| !name.is_empty() && !value.is_empty())
            .collect();
        if !declarations.is_empty() {
            rules.push(StyleRule {
                selector: selector.to_string(),
                declarations,
            });
        }
    }
    rules
}

fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        rest = match rest[start + 2..].find("*/") {
            Some(end) => &rest[start + 2 + end + 2..],
            None => "",
        };
    }
    out.push_str(rest);
    out
}

/// Detach elements hidden by `display: none` and resolve the body text
/// style. Later rules win, as in the cascade for equal specificity.
fn apply_rules(document: &NodeRef, rules: &[StyleRule]) -> TextStyle {
    let mut style = TextStyle::default();
    for rule in rules {
        let Ok(selected) = document.select(&rule.selector) else {
            debug!(selector = %rule.selector, "unsupported selector ignored");
            continue;
        };
        let matched: Vec<NodeRef> = selected.map(|el| el.as_node().clone()).collect();
        if matched.is_empty() {
            continue;
        }
        let targets_body = matched.iter().any(|node| {
            node.as_element()
                .is_some_and(|el| matches!(&*el.name.local, "html" | "body"))
        });

        for (name, value) in &rule.declarations {
            match name.as_str() {
                "display" if value == "none" => matched.iter().for_each(|node| node.detach()),
                "font-size" if targets_body => {
                    if let Some(pt) = length_pt(value) {
                        style.font_size_pt = Some(pt);
                    }
                }
                "line-height" if targets_body => {
                    if let Some(lh) = line_height(value) {
                        style.line_height = Some(lh);
                    }
                }
                _ => {}
            }
        }
    }
    style
}

/// Absolute size in points of a CSS length such as `12pt`, `16px` or `1.5em`.
fn length_pt(value: &str) -> Option<f32> {
    if let Some(pct) = value.strip_suffix('%') {
        let pt = pct.trim().parse::<f32>().ok()? * BASE_FONT_PT / 100.0;
        return (pt.is_finite() && pt > 0.0).then_some(pt);
    }
    let (number, factor) = if let Some(n) = value.strip_suffix("pt") {
        (n, 1.0)
    } else if let Some(n) = value.strip_suffix("px") {
        (n, 0.75)
    } else if let Some(n) = value.strip_suffix("rem") {
        (n, BASE_FONT_PT)
    } else if let Some(n) = value.strip_suffix("em") {
        (n, BASE_FONT_PT)
    } else if let Some(n) = value.strip_suffix("mm") {
        (n, 72.0 / 25.4)
    } else {
        return None;
    };
    let pt = number.trim().parse::<f32>().ok()? * factor;
    (pt.is_finite() && pt > 0.0).then_some(pt)
}

fn line_height(value: &str) -> Option<LineHeight> {
    if value == "normal" {
        return None;
    }
    if let Ok(factor) = value.parse::<f32>() {
        return (factor.is_finite() && factor > 0.0).then_some(LineHeight::Factor(factor));
    }
    if let Some(pct) = value.strip_suffix('%') {
        let factor = pct.trim().parse::<f32>().ok()? / 100.0;
        return (factor.is_finite() && factor > 0.0).then_some(LineHeight::Factor(factor));
    }
    if let Some(em) = value.strip_suffix("em").filter(|_| !value.ends_with("rem")) {
        let factor = em.trim().parse::<f32>().ok()?;
        return (factor.is_finite() && factor > 0.0).then_some(LineHeight::Factor(factor));
    }
    length_pt(value).map(LineHeight::Points)
}

fn walk(node: &NodeRef, out: &mut TextSink, preformatted: bool) {
    if let Some(text) = node.as_text() {
        out.push_text(&text.borrow(), preformatted);
        return;
    }

    let Some(element) = node.as_element() else {
        for child in node.children() {
            walk(&child, out, preformatted);
        }
        return;
    };

    let name = &*element.name.local;
    if HIDDEN.contains(&name) {
        return;
    }
    let block = BLOCK.contains(&name);
    match name {
        "br" => out.hard_break(),
        "li" => {
            out.block_break();
            out.push_text("- ", false);
        }
        "td" | "th" => out.push_text(" ", false),
        _ if block => out.block_break(),
        _ => {}
    }

    let preformatted = preformatted || name == "pre";
    for child in node.children() {
        walk(&child, out, preformatted);
    }

    if block {
        out.block_break();
    }
}

/// Accumulates text lines with HTML whitespace collapsing.
#[derive(Default)]
struct TextSink {
    lines: Vec<String>,
    current: String,
    pending_space: bool,
}

impl TextSink {
    fn push_text(&mut self, text: &str, preformatted: bool) {
        if preformatted {
            let mut parts = text.split('\n');
            if let Some(first) = parts.next() {
                self.current.push_str(first);
            }
            for part in parts {
                self.hard_break();
                self.current.push_str(part);
            }
            self.pending_space = false;
            return;
        }

        for ch in text.chars() {
            if ch.is_whitespace() && ch != '\u{a0}' {
                self.pending_space = true;
                continue;
            }
            if self.pending_space && !self.current.is_empty() {
                self.current.push(' ');
            }
            self.pending_space = false;
            self.current.push(if ch == '\u{a0}' { ' ' } else { ch });
        }
    }

    fn hard_break(&mut self) {
        let line = std::mem::take(&mut self.current);
        self.lines.push(line.trim_end().to_string());
        self.pending_space = false;
    }

    fn block_break(&mut self) {
        if !self.current.trim().is_empty() {
            self.hard_break();
        } else {
            self.current.clear();
            self.pending_space = false;
        }
    }

    fn finish(mut self) -> String {
        self.block_break();
        let mut result: Vec<&str> = Vec::with_capacity(self.lines.len());
        for line in &self.lines {
            let blank = line.trim().is_empty();
            if blank && result.last().is_none_or(|l| l.is_empty()) {
                continue;
            }
            result.push(if blank { "" } else { line.as_str() });
        }
        while result.last().is_some_and(|l| l.is_empty()) {
            result.pop();
        }
        result.join("\n")
    }
}
