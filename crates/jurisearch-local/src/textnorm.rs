//! Minimal, deterministic text normalization helpers.
//!
//! Matching-only: display text keeps its accents and casing. `scrub` output is
//! what the fuzzy matcher scores against, never what callers see.

/// Lossy "scrub" used for matching/scoring keys.
///
/// - lowercase
/// - Spanish diacritics folded to their ASCII base letter (á → a, ñ → n, ü → u)
/// - anything non-alphanumeric treated as a separator (collapsed to single spaces)
pub fn scrub(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_space = true;
    for ch in s.chars().flat_map(char::to_lowercase) {
        let folded = match ch {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            c => c,
        };
        if folded.is_alphanumeric() {
            out.push(folded);
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    out.trim().to_string()
}

/// Scrubbed tokens of at least two characters, for scoring.
///
/// Single-character leftovers ("y", "o", list markers) add noise without
/// discriminating between blocks, so they are dropped on both the query and
/// the field side.
pub fn match_tokens(s: &str) -> Vec<String> {
    scrub(s)
        .split_whitespace()
        .filter(|t| t.chars().count() >= 2)
        .map(|t| t.to_string())
        .collect()
}
