// ✂️ Tokenizer - Split normalized place names into scoring tokens
//
// Separators: whitespace, '/', ',', '-', '(', ')'
// Tokens shorter than MIN_TOKEN_LEN are noise (articles, abbreviations) and dropped.

/// Minimum token length (in chars) kept for scoring
pub const MIN_TOKEN_LEN: usize = 3;

fn is_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, '/' | ',' | '-' | '(' | ')')
}

/// Tokenize already-normalized text, left to right
///
/// Example: "porta genova/navigli" → ["porta", "genova", "navigli"]
pub fn tokenize(normalized: &str) -> impl Iterator<Item = &str> {
    normalized
        .split(is_separator)
        .filter(|token| token.chars().count() >= MIN_TOKEN_LEN)
}

/// Length used for token comparison and scoring
pub fn token_len(token: &str) -> usize {
    token.chars().count()
}
