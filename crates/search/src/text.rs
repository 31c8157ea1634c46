//! Tokenization and the word matching rules shared by ranking and
//! highlighting.

use crate::consts::{MIN_TOKEN_CHARS, WORD_REGEX};

/// Split `text` into lowercase letter-run tokens, keeping every length.
pub fn tokenize_all(text: &str) -> Vec<String> {
    WORD_REGEX.find_iter(text).map(|m| m.as_str().to_lowercase()).collect()
}

/// Split a search query into lowercase tokens of at least three letters.
pub fn tokenize(query: &str) -> Vec<String> {
    WORD_REGEX
        .find_iter(query)
        .map(|m| m.as_str().to_lowercase())
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
        .collect()
}

/// How a query token relates to a word from the index (or from page text).
///
/// Variants are ordered by precedence; [`classify`] returns the first one
/// that applies.
///
/// The two prefix weights follow the worked example rather than the rule
/// table: `udstødningsrør` against the indexed `udstødning` must score 6, so
/// a query that extends the word outranks a word that extends the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Identical tokens.
    Exact,
    /// The query token extends the word, e.g. `udstødningsrør` vs `udstødning`.
    QueryExtendsWord,
    /// The word extends the query token, e.g. `motoren` vs `motor`.
    WordExtendsQuery,
    /// The word contains the query token and the two are of similar length.
    Contains,
}
impl MatchKind {
    pub fn weight(self) -> u32 {
        match self {
            MatchKind::Exact => 10,
            MatchKind::QueryExtendsWord => 6,
            MatchKind::WordExtendsQuery => 4,
            MatchKind::Contains => 2,
        }
    }

    pub fn is_exact(self) -> bool {
        self == MatchKind::Exact
    }
}

/// Classify a (query token, word) pair. Both are expected lowercase.
pub fn classify(query: &str, word: &str) -> Option<MatchKind> {
    if query == word {
        return Some(MatchKind::Exact);
    }
    let query_len = query.chars().count();
    let word_len = word.chars().count();
    if word_len >= MIN_TOKEN_CHARS && query.starts_with(word) {
        return Some(MatchKind::QueryExtendsWord);
    }
    if query_len >= MIN_TOKEN_CHARS && word.starts_with(query) {
        return Some(MatchKind::WordExtendsQuery);
    }
    if query_len >= 5 && word_len >= 5 && word.contains(query) && query_len as f64 >= 0.6 * word_len as f64 {
        return Some(MatchKind::Contains);
    }
    None
}
