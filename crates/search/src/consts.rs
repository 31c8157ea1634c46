use regex::Regex;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

/// Letters of the index alphabet: ASCII plus the Danish/Norwegian extended
/// letters (and é, which the OCR output uses in loanwords).
pub const LETTER_CLASS: &str = "a-zA-ZæøåÆØÅéÉ";

regex!(WORD_REGEX, format!("[{LETTER_CLASS}]+").as_str());

/// Query tokens shorter than this (in characters) are ignored.
pub const MIN_TOKEN_CHARS: usize = 3;
/// Maximum number of results returned by a search.
pub const MAX_RESULTS: usize = 20;
/// Pages whose summed match weight falls below this are dropped.
pub const MIN_PAGE_WEIGHT: u32 = 4;
/// Results whose final score falls below this are dropped.
pub const MIN_FINAL_SCORE: u32 = 6;
/// Bonus added to the final score per exact match.
pub const EXACT_MATCH_BONUS: u32 = 5;

// Context extraction
pub const CONTEXT_WINDOW_CHARS: usize = 100;
pub const CONTEXT_STEP_CHARS: usize = 10;
pub const CONTEXT_LEAD_CHARS: usize = 25;
pub const CONTEXT_SPAN_CHARS: usize = 125;
pub const WEAK_PREFIX_CHARS: usize = 3;
pub const ELLIPSIS: &str = "...";
pub const NO_CONTEXT: &str = "No context available";

// Highlighting
pub const HIGHLIGHT_OPEN: &str = "<mark>";
pub const HIGHLIGHT_CLOSE: &str = "</mark>";
