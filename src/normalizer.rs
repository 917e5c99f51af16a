// 🔤 Normalizer - Canonical text form for place-name comparison
//
// "Città", "CITTA'", "  citta  " must all compare equal before any matching runs.
//
// Steps (in order):
// - Lowercase
// - Unicode canonical decomposition (NFD), combining marks dropped
// - Apostrophe variants (’ `) folded to '
// - Leading/trailing whitespace trimmed

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Canonical apostrophe every variant is folded into
pub const APOSTROPHE: char = '\'';

/// Glyphs treated as apostrophes in free-text addresses
const APOSTROPHE_VARIANTS: [char; 3] = ['\'', '\u{2019}', '`'];

/// Normalize text for comparison
///
/// Idempotent: `normalize(&normalize(s)) == normalize(s)`.
///
/// Example: "Città" → "citta", "L’angolo" → "l'angolo"
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| {
            if APOSTROPHE_VARIANTS.contains(&c) {
                APOSTROPHE
            } else {
                c
            }
        })
        .collect();

    folded.trim().to_string()
}

/// True when the text has nothing left after normalization
pub fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

// ============================================================================
// TESTS
// ============================================================================
