//! Fuzzy matching of query variants against an extracted corpus.
//!
//! Distances live in `[0, 1]` with 0 exact; a block is a hit when its
//! distance stays at or below the configured threshold. Per query token
//! the matcher takes the best Sørensen-Dice bigram overlap among the field's
//! tokens, averages across the query, and keeps the better of the title and
//! body fields. Everything is request-scoped: no state survives a search.

use std::collections::HashSet;

use jurisearch_core::{MatchConfig, MatchResult, PrecedentBlock, SearchOutcome};

use crate::textnorm::match_tokens;
use crate::variants::query_variants;

/// Appended to the first variant when a search comes back empty.
pub const SUGGESTION_HINT: &str = " (intenta con sinónimos como \"electoral\" o \"política\")";

/// Pre-tokenized corpus, built once per request and queried per variant.
pub struct FuzzyIndex {
    fields: Vec<(Vec<String>, Vec<String>)>,
    threshold: f64,
}

/// One accepted block for one variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub block: usize,
    pub distance: f64,
}

impl FuzzyIndex {
    pub fn new(blocks: &[PrecedentBlock], threshold: f64) -> Self {
        let fields = blocks
            .iter()
            .map(|b| (match_tokens(&b.title), match_tokens(&b.body)))
            .collect();
        Self {
            fields,
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    /// Hits for one query, best distance first; ties keep corpus order.
    pub fn query(&self, query: &str) -> Vec<Hit> {
        let needles = match_tokens(query);
        if needles.is_empty() {
            return Vec::new();
        }
        let mut hits: Vec<Hit> = self
            .fields
            .iter()
            .enumerate()
            .filter_map(|(i, (title, body))| {
                let score = field_score(&needles, title).max(field_score(&needles, body));
                let distance = 1.0 - score;
                (distance <= self.threshold).then_some(Hit { block: i, distance })
            })
            .collect();
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.block.cmp(&b.block))
        });
        hits
    }
}

/// Mean of each query token's best bigram overlap inside the field.
fn field_score(needles: &[String], field: &[String]) -> f64 {
    if needles.is_empty() || field.is_empty() {
        return 0.0;
    }
    let mut total = 0.0;
    for needle in needles {
        let mut best = 0.0f64;
        for token in field {
            let s = strsim::sorensen_dice(needle, token);
            if s > best {
                best = s;
            }
            if best >= 1.0 {
                break;
            }
        }
        total += best;
    }
    total / needles.len() as f64
}

/// Runs the variant sequence against the corpus and accumulates up to
/// `max_results` results with distinct keys, earlier variants first.
///
/// Blocks without a key are skipped even when they score well: a result that
/// cannot be cited cannot be deduplicated or verified, so it never leaves the
/// matcher.
pub fn search_blocks(
    blocks: &[PrecedentBlock],
    variants: &[String],
    want_full: bool,
    cfg: &MatchConfig,
) -> Vec<MatchResult> {
    let cfg = cfg.clone().sanitized();
    let index = FuzzyIndex::new(blocks, cfg.threshold);
    let mut seen_keys: HashSet<String> = HashSet::new();
    let mut out: Vec<MatchResult> = Vec::new();

    'variants: for variant in variants {
        for hit in index.query(variant) {
            let block = &blocks[hit.block];
            let Some(key) = block.key.as_ref() else {
                continue;
            };
            if !seen_keys.insert(key.clone()) {
                continue;
            }
            out.push(MatchResult {
                key: key.clone(),
                title: block.title.clone(),
                date: block.date.clone(),
                summary: block.title.clone(),
                full: want_full.then(|| block.body.clone()),
            });
            if out.len() >= cfg.max_results {
                break 'variants;
            }
        }
    }
    out
}

/// Suggestion for an empty search: the first variant plus the synonym hint.
pub fn empty_suggestion(variants: &[String]) -> String {
    let first = variants.first().map(String::as_str).unwrap_or("");
    format!("{first}{SUGGESTION_HINT}")
}

/// One full pass over an extracted corpus: expand the query, match every
/// variant, fold into the wire-level outcome.
pub fn search_outcome(
    blocks: &[PrecedentBlock],
    query: &str,
    want_full: bool,
    cfg: &MatchConfig,
) -> SearchOutcome {
    let variants = query_variants(query);
    let results = search_blocks(blocks, &variants, want_full, cfg);
    if results.is_empty() {
        SearchOutcome::Empty {
            suggestion: empty_suggestion(&variants),
        }
    } else {
        SearchOutcome::Found(results)
    }
}
