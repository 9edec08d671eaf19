//! Precedent block extraction from compilation pages.
//!
//! Two passes over the same HTML. The tabular pass reads the listing table the
//! tribunal publishes (one row per thesis: ordinal, rubro, clave, fecha). When
//! that yields too little (client-rendered shells, layout changes), a
//! free-text pass segments the visible page text on uppercase heading runs.
//! Extraction is deterministic: the same HTML always produces the same blocks
//! in the same order, and a page that produces nothing is an error, never a
//! fabricated corpus.

use std::collections::HashSet;
use std::io::Cursor;

use html_scraper::{Html, Selector};
use jurisearch_core::{Error, ExtractConfig, PrecedentBlock, Result};
use regex::Regex;

/// Marker appended to bodies cut at `max_body_chars`.
pub const TRUNCATION_MARKER: &str = "...";

/// Render width for text extraction. Wide enough that a paragraph survives as
/// a single line, which the line filter and the title heuristic depend on.
const TEXT_WIDTH: usize = 1000;

pub struct BlockExtractor {
    cfg: ExtractConfig,
    /// Uppercase heading runs used as segment boundaries in free text.
    anchor: Regex,
    /// Thesis keys as published: two digits, slash, four-digit year.
    key_strict: Regex,
    /// Looser digits/digits shape, for relacionadas and older numbering.
    key_loose: Regex,
    /// Spanish long-form dates ("3 de agosto de 2018").
    date: Regex,
}

impl BlockExtractor {
    pub fn new(cfg: ExtractConfig) -> Self {
        let cfg = cfg.sanitized();
        let anchor = Regex::new(&format!(
            r"[A-Z\s]{{{},{}}}",
            cfg.min_anchor_chars, cfg.max_anchor_chars
        ))
        .unwrap_or_else(|_| Regex::new(r"[A-Z\s]{3,50}").unwrap());
        Self {
            cfg,
            anchor,
            key_strict: Regex::new(r"\d{2}/\d{4}").unwrap(),
            key_loose: Regex::new(r"\d+/\d+").unwrap(),
            date: Regex::new(r"\d{1,2}\s+de\s+[a-zA-Z]+\s+de\s+\d{4}").unwrap(),
        }
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.cfg
    }

    /// Extracts the precedent corpus from one fetched page.
    ///
    /// Tabular blocks come first; the free-text fallback only runs when the
    /// table pass produced fewer than `fallback_min_blocks`, and it never
    /// re-adds a key the table already contributed.
    pub fn extract(&self, html: &str) -> Result<Vec<PrecedentBlock>> {
        let mut blocks = self.extract_tabular(html);
        if blocks.len() < self.cfg.fallback_min_blocks {
            self.extract_free_text_into(html, &mut blocks);
        }
        if blocks.is_empty() {
            return Err(Error::Extract("no precedent blocks found in page".into()));
        }
        Ok(blocks)
    }

    /// Primary pass: one block per qualifying table row.
    ///
    /// A row qualifies when it has at least three cells, the second cell looks
    /// like a rubro (longer than `min_title_chars`) and the third carries a
    /// digits/digits key. Anything else (headers, paginators, decorative
    /// rows) falls through silently.
    fn extract_tabular(&self, html: &str) -> Vec<PrecedentBlock> {
        let doc = Html::parse_document(html);
        let Some(row_sel) = Selector::parse("table tr").ok() else {
            return Vec::new();
        };
        let Some(cell_sel) = Selector::parse("td, th").ok() else {
            return Vec::new();
        };

        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();
        for row in doc.select(&row_sel) {
            let cells: Vec<String> = row
                .select(&cell_sel)
                .map(|c| norm_ws(&c.text().collect::<String>()))
                .collect();
            if cells.len() < 3 {
                continue;
            }
            let title = cells[1].clone();
            if title.chars().count() <= self.cfg.min_title_chars {
                continue;
            }
            let key = cells[2].clone();
            if !self.key_loose.is_match(&key) {
                continue;
            }
            if !seen.insert(key.clone()) {
                continue;
            }
            let row_text = cells.join(" ");
            let date = self.date.find(&row_text).map(|m| m.as_str().to_string());
            out.push(PrecedentBlock {
                key: Some(key),
                title,
                date,
                body: bounded_body(&row_text, self.cfg.max_body_chars),
            });
        }
        out
    }

    /// Fallback pass: segment visible text on uppercase heading runs.
    ///
    /// Each anchor opens a segment that runs to the next anchor. Segments keep
    /// only substantial bodies (more than `min_body_chars` characters) that
    /// carry a thesis key; a body without a key cannot be cited or
    /// deduplicated, so it is dropped rather than invented around. A key the
    /// corpus already holds, or a heading that already produced a block, is
    /// not mined twice.
    fn extract_free_text_into(&self, html: &str, blocks: &mut Vec<PrecedentBlock>) {
        let text = self.visible_text(html);
        let mut seen: HashSet<String> = blocks.iter().filter_map(|b| b.key.clone()).collect();
        let mut used_headings: HashSet<String> = HashSet::new();

        let anchors: Vec<(usize, usize, String)> = self
            .anchor
            .find_iter(&text)
            .map(|m| (m.start(), m.end(), norm_ws(m.as_str())))
            .collect();

        for (i, (_, end, heading)) in anchors.iter().enumerate() {
            if heading.chars().count() < self.cfg.min_anchor_chars {
                // Still a boundary for the previous segment, just not a
                // heading worth emitting.
                continue;
            }
            let body_end = anchors.get(i + 1).map_or(text.len(), |next| next.0);
            let raw = text[*end..body_end].trim();
            if raw.chars().count() <= self.cfg.min_body_chars {
                continue;
            }
            let Some(key) = self.find_key(raw) else {
                continue;
            };
            if seen.contains(&key) || used_headings.contains(heading) {
                continue;
            }
            seen.insert(key.clone());
            used_headings.insert(heading.clone());
            let date = self.date.find(raw).map(|m| m.as_str().to_string());
            let title = first_uppercase_line(raw).unwrap_or_else(|| heading.clone());
            blocks.push(PrecedentBlock {
                key: Some(key),
                title,
                date,
                body: bounded_body(raw, self.cfg.max_body_chars),
            });
        }
    }

    /// Readable page text, one collapsed line per source line, with short
    /// lines (menus, paginators, cell borders) filtered out.
    fn visible_text(&self, html: &str) -> String {
        let mut stripped = strip_tag_blocks(html, "script");
        stripped = strip_tag_blocks(&stripped, "style");
        stripped = strip_tag_blocks(&stripped, "noscript");
        let text = html_to_text(&stripped, TEXT_WIDTH);
        let lines: Vec<String> = text
            .lines()
            .map(norm_ws)
            .filter(|l| l.chars().count() > self.cfg.min_line_chars)
            .collect();
        lines.join("\n")
    }

    /// Published key (`21/2018`) preferred; looser digits/digits accepted.
    fn find_key(&self, body: &str) -> Option<String> {
        self.key_strict
            .find(body)
            .or_else(|| self.key_loose.find(body))
            .map(|m| m.as_str().to_string())
    }
}

/// Convert HTML to readable plain text.
///
/// Intentionally "good enough" and deterministic, not a readability engine.
fn html_to_text(html: &str, width: usize) -> String {
    // html2text expects bytes; Cursor avoids allocating a second large buffer.
    html2text::from_read(Cursor::new(html.as_bytes()), width).unwrap_or_else(|_| html.to_string())
}

fn norm_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First line that starts with an ASCII capital. The tribunal publishes
/// rubros in full caps, so this is the rubro when the segment carries one.
fn first_uppercase_line(body: &str) -> Option<String> {
    body.lines()
        .find(|l| l.chars().next().is_some_and(|c| c.is_ascii_uppercase()))
        .map(|l| l.to_string())
}

fn bounded_body(s: &str, max_chars: usize) -> String {
    let (body, truncated) = truncate_chars(s, max_chars);
    if truncated {
        format!("{body}{TRUNCATION_MARKER}")
    } else {
        body
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> (String, bool) {
    if max_chars == 0 {
        return ("".to_string(), !s.is_empty());
    }
    let mut out = String::new();
    for (n, ch) in s.chars().enumerate() {
        if n >= max_chars {
            return (out, true);
        }
        out.push(ch);
    }
    (out, false)
}

fn strip_tag_blocks(html: &str, tag: &str) -> String {
    // Minimal, best-effort stripper for <tag ...> ... </tag> blocks. It only
    // removes when it finds a close tag, ASCII-case-insensitive on tag names.
    let tag_lc = tag.to_ascii_lowercase();
    let open_pat = format!("<{}", tag_lc);
    let close_pat = format!("</{}>", tag_lc);

    let mut out = String::new();
    let mut i = 0usize;
    let lower = html.to_ascii_lowercase();
    while let Some(rel_start) = lower[i..].find(&open_pat) {
        let start = i + rel_start;
        let after_open = start + open_pat.len();
        if let Some(rel_end) = lower[after_open..].find(&close_pat) {
            let end = after_open + rel_end + close_pat.len();
            out.push_str(&html[i..start]);
            i = end;
        } else {
            // No close tag; stop stripping.
            break;
        }
    }
    out.push_str(&html[i..]);
    out
}
