//! Boundary normalization for the enumerated request dimensions.
//!
//! Stored rows and API payloads carry either the localized (pt-BR) literals or
//! the English ones, in mixed case and with or without accents. Everything is
//! folded into one token shape here so the domain enums match on a single
//! canonical spelling.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Raised when a closed vocabulary receives a value it cannot map.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized {dimension} value '{value}'")]
pub struct VocabularyError {
    pub dimension: &'static str,
    pub value: String,
}

impl VocabularyError {
    pub(crate) fn new(dimension: &'static str, value: &str) -> Self {
        Self {
            dimension,
            value: value.to_string(),
        }
    }
}

/// Lowercases, strips diacritics, and folds `_`/space into `-`.
///
/// Input is decomposed first, so precomposed and combining-mark spellings of
/// the same word land on the same token.
pub(crate) fn normalize_token(raw: &str) -> String {
    raw.trim()
        .nfd()
        .filter(|ch| !is_combining_mark(*ch))
        .flat_map(char::to_lowercase)
        .map(|ch| match ch {
            '_' | ' ' => '-',
            other => other,
        })
        .collect()
}
