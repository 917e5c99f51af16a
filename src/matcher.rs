// 🔍 Fuzzy Matcher - Pick the neighborhood a free-text fragment refers to
// Three strategies, first success wins: Exact → Containment → Token Overlap

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entities::Neighborhood;
use crate::normalizer::{is_blank, normalize};
use crate::tokenizer::{token_len, tokenize};

/// Minimum token-overlap score accepted (one 3-char token match)
pub const MIN_MATCH_SCORE: usize = 3;

// ============================================================================
// MATCH STRATEGY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStrategy {
    /// Normalized input equals normalized candidate name
    Exact,

    /// One normalized string contains the other ("zona Isola" ↔ "Isola")
    Containment,

    /// Summed length of substring-overlapping token pairs
    TokenOverlap,
}

// ============================================================================
// MATCH RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborhoodMatch {
    /// Candidate name as stored in the catalog
    pub name: String,

    /// Which strategy produced this match
    pub strategy: MatchStrategy,

    /// Token-overlap score (0 for exact / containment)
    pub score: usize,
}

/// Match raw text against the candidates of a single municipality
///
/// Blank input never matches.
pub fn match_neighborhood(raw_text: &str, candidates: &[Neighborhood]) -> Option<NeighborhoodMatch> {
    if is_blank(raw_text) || candidates.is_empty() {
        return None;
    }

    let input = normalize(raw_text);
    let normalized: Vec<(String, &Neighborhood)> = candidates
        .iter()
        .map(|c| (normalize(&c.name), c))
        .filter(|(name, _)| !name.is_empty())
        .collect();

    let found = exact_match(&input, &normalized)
        .or_else(|| containment_match(&input, &normalized))
        .or_else(|| token_overlap_match(&input, &normalized));

    debug!(
        input = %input,
        matched = ?found.as_ref().map(|m| &m.name),
        strategy = ?found.as_ref().map(|m| m.strategy),
        "neighborhood match"
    );

    found
}

/// Convenience: only the matched name
pub fn match_neighborhood_name(raw_text: &str, candidates: &[Neighborhood]) -> Option<String> {
    match_neighborhood(raw_text, candidates).map(|m| m.name)
}

/// Strategy 1: Exact
fn exact_match(input: &str, candidates: &[(String, &Neighborhood)]) -> Option<NeighborhoodMatch> {
    candidates
        .iter()
        .find(|(name, _)| name == input)
        .map(|(_, c)| NeighborhoodMatch {
            name: c.name.clone(),
            strategy: MatchStrategy::Exact,
            score: 0,
        })
}

/// Strategy 2: Containment, either direction
fn containment_match(
    input: &str,
    candidates: &[(String, &Neighborhood)],
) -> Option<NeighborhoodMatch> {
    candidates
        .iter()
        .find(|(name, _)| name.contains(input) || input.contains(name.as_str()))
        .map(|(_, c)| NeighborhoodMatch {
            name: c.name.clone(),
            strategy: MatchStrategy::Containment,
            score: 0,
        })
}

/// Strategy 3: Token overlap
///
/// Each (input token, candidate token) pair where one contains the other adds
/// the shorter token's length. Highest total wins; ties keep the earlier
/// candidate. Accepted only at MIN_MATCH_SCORE or above.
fn token_overlap_match(
    input: &str,
    candidates: &[(String, &Neighborhood)],
) -> Option<NeighborhoodMatch> {
    let input_tokens: Vec<&str> = tokenize(input).collect();
    if input_tokens.is_empty() {
        return None;
    }

    let mut best: Option<(&Neighborhood, usize)> = None;

    for (name, candidate) in candidates {
        let score = overlap_score(&input_tokens, name);

        let better = match best {
            Some((_, best_score)) => score > best_score,
            None => score > 0,
        };
        if better {
            best = Some((*candidate, score));
        }
    }

    match best {
        Some((candidate, score)) if score >= MIN_MATCH_SCORE => Some(NeighborhoodMatch {
            name: candidate.name.clone(),
            strategy: MatchStrategy::TokenOverlap,
            score,
        }),
        _ => None,
    }
}

/// Token-overlap score of one normalized candidate name
pub fn overlap_score(input_tokens: &[&str], normalized_candidate: &str) -> usize {
    let mut score = 0;

    for candidate_token in tokenize(normalized_candidate) {
        for input_token in input_tokens {
            if input_token.contains(candidate_token) || candidate_token.contains(input_token) {
                score += token_len(input_token).min(token_len(candidate_token));
            }
        }
    }

    score
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Municipality;

    fn candidates(names: &[&str]) -> Vec<Neighborhood> {
        let milano = Municipality::new("Milano", 45.4642, 9.19);
        names
            .iter()
            .map(|name| Neighborhood::new(name, "", &milano))
            .collect()
    }

    #[test]
    fn test_exact_wins_over_containment() {
        let list = candidates(&["Bovisa Garibaldi", "Bovisa"]);
        let m = match_neighborhood("bovisa", &list).unwrap();

        assert_eq!(m.name, "Bovisa");
        assert_eq!(m.strategy, MatchStrategy::Exact);
    }

    #[test]
    fn test_exact_ignores_accents_and_case() {
        let list = candidates(&["Città Studi", "Lambrate"]);
        let m = match_neighborhood("  CITTA STUDI ", &list).unwrap();

        assert_eq!(m.name, "Città Studi");
        assert_eq!(m.strategy, MatchStrategy::Exact);
    }

    #[test]
    fn test_containment_input_contains_candidate() {
        let list = candidates(&["Isola", "Maciachini"]);
        let m = match_neighborhood("zona Isola", &list).unwrap();

        assert_eq!(m.name, "Isola");
        assert_eq!(m.strategy, MatchStrategy::Containment);
    }

    #[test]
    fn test_containment_candidate_contains_input() {
        let list = candidates(&["Lorenteggio", "Porta Genova/Navigli"]);
        let m = match_neighborhood("Navigli", &list).unwrap();

        assert_eq!(m.name, "Porta Genova/Navigli");
        assert_eq!(m.strategy, MatchStrategy::Containment);
    }

    #[test]
    fn test_token_overlap() {
        let list = candidates(&["Isola", "Padova/Loreto", "Precotto"]);
        let m = match_neighborhood("Via Padova", &list).unwrap();

        assert_eq!(m.name, "Padova/Loreto");
        assert_eq!(m.strategy, MatchStrategy::TokenOverlap);
        assert_eq!(m.score, 6);
    }

    #[test]
    fn test_token_overlap_prefers_higher_score() {
        let list = candidates(&["Villa San Giovanni", "Sesto Rondò/San Giovanni Bosco"]);
        let m = match_neighborhood("viale san giovanni bosco", &list).unwrap();

        // "giovanni" + "bosco" beat "giovanni" alone
        assert_eq!(m.name, "Sesto Rondò/San Giovanni Bosco");
        assert_eq!(m.strategy, MatchStrategy::TokenOverlap);
    }

    #[test]
    fn test_token_overlap_tie_keeps_first() {
        let list = candidates(&["Greco Nord", "Greco Sud"]);
        let m = match_neighborhood("piazza greco", &list).unwrap();

        assert_eq!(m.name, "Greco Nord");
        assert_eq!(m.score, 5);
    }

    #[test]
    fn test_short_tokens_never_match() {
        let list = candidates(&["Isola", "Bovisa"]);
        assert!(match_neighborhood("xy", &list).is_none());
    }

    #[test]
    fn test_unrelated_text_does_not_match() {
        let list = candidates(&["Isola", "Bovisa"]);
        assert!(match_neighborhood("Corso Buenos Aires", &list).is_none());
    }

    #[test]
    fn test_blank_input_short_circuits() {
        let list = candidates(&["Isola"]);
        assert!(match_neighborhood("", &list).is_none());
        assert!(match_neighborhood("   ", &list).is_none());
        assert!(match_neighborhood("Isola", &[]).is_none());
    }

    #[test]
    fn test_overlap_score_substring_pairs() {
        // partial token scores its own length
        assert_eq!(overlap_score(&["lore"], "padova/loreto"), 4);
        assert_eq!(overlap_score(&["via", "padova"], "padova/loreto"), 6);
        assert_eq!(overlap_score(&["corso"], "padova/loreto"), 0);
    }

    #[test]
    fn test_match_neighborhood_name() {
        let list = candidates(&["Isola"]);
        assert_eq!(match_neighborhood_name("isola", &list), Some("Isola".to_string()));
        assert_eq!(match_neighborhood_name("Bovisa", &list), None);
    }
}
