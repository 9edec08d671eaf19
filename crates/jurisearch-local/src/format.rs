//! Spanish response text for matched theses. Layout is stable: downstream
//! bots parse these lines.

use jurisearch_core::MatchResult;

/// Pointer shown in place of the body when the full text was not requested.
pub fn source_pointer(source_url: &str) -> String {
    format!("Bloque full en sitio oficial: {source_url}")
}

/// One response block. Dates the extractor could not find render as "n/d".
pub fn format_match(m: &MatchResult, source_url: &str) -> String {
    let fecha = m.date.as_deref().unwrap_or("n/d");
    let mut out = format!(
        "Clave: {}\nRubro: {}\nFecha: {}\nResumen: {}\n",
        m.key, m.title, fecha, m.summary
    );
    match m.full.as_deref() {
        Some(full) if !full.is_empty() => {
            out.push_str(&format!("Completo: {full}\n"));
        }
        _ => {
            out.push_str(&format!("Completo: {}\n", source_pointer(source_url)));
        }
    }
    out
}
