//! Query expansion for short Spanish legal queries.

use std::collections::HashSet;

/// Expands a user query into the sequence of variants the matcher tries, in
/// priority order. The untouched query always comes first; the rest widen
/// recall with electoral-domain phrasing. At most four, deduplicated.
pub fn query_variants(query: &str) -> Vec<String> {
    let lower = query.to_lowercase();
    let mut variants = vec![query.to_string()];
    if !lower.contains("electoral") {
        variants.push(format!("{query} electoral"));
    }
    if lower.contains("contra") || lower.contains("por") {
        variants.push(format!("{query} política"));
    } else {
        variants.push(format!("{query} por razones de"));
    }
    variants.push(or_joined(query));

    let mut seen = HashSet::new();
    variants.retain(|v| seen.insert(v.clone()));
    variants.truncate(4);
    variants
}

/// Every whitespace character becomes an ` OR ` connector.
fn or_joined(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    for ch in query.chars() {
        if ch.is_whitespace() {
            out.push_str(" OR ");
        } else {
            out.push(ch);
        }
    }
    out
}
