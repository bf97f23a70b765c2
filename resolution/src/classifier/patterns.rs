//! Ordered rule tables and the matching routines that evaluate them.
//!
//! All inputs are expected upper-cased; callers normalize once per text.

use super::classification::ErrorPattern;

/// Literal token that triggers the `<WORD>_ERROR` heuristic.
pub const ERROR_TOKEN: &str = "ERROR";

/// A composite keyword rule: every keyword must be present.
#[derive(Debug, Clone, Copy)]
pub struct KeywordRule {
    pub all_of: &'static [&'static str],
    pub pattern: ErrorPattern,
}

/// Composite keyword checks for profile error messages, in priority order.
pub const KEYWORD_RULES: [KeywordRule; 4] = [
    KeywordRule {
        all_of: &["SUPPLIER", "CONFIRMATION"],
        pattern: ErrorPattern::SupplierConfirmation,
    },
    KeywordRule {
        all_of: &["CONNECTION"],
        pattern: ErrorPattern::Connection,
    },
    KeywordRule {
        all_of: &["TIMEOUT"],
        pattern: ErrorPattern::Timeout,
    },
    KeywordRule {
        all_of: &["PROVIDER"],
        pattern: ErrorPattern::Provider,
    },
];

/// First fixed pattern (in table order) contained in any of `texts`.
pub fn first_pattern<'a, I>(texts: I) -> Option<ErrorPattern>
where
    I: IntoIterator<Item = &'a str> + Clone,
{
    ErrorPattern::TABLE
        .into_iter()
        .find(|pattern| texts.clone().into_iter().any(|t| t.contains(pattern.code())))
}

/// First composite keyword rule satisfied by `text`.
pub fn first_keyword(text: &str) -> Option<ErrorPattern> {
    KEYWORD_RULES
        .iter()
        .find(|rule| rule.all_of.iter().all(|kw| text.contains(kw)))
        .map(|rule| rule.pattern)
}

/// `<WORD>_ERROR` from the first whitespace-separated word containing
/// `ERROR` that has a word before it. Punctuation on the preceding word is
/// kept as-is.
pub fn word_before_error(text: &str) -> Option<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, word)| word.contains(ERROR_TOKEN))
        .map(|(i, _)| format!("{}_ERROR", words[i - 1]))
}
