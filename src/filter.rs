//! Profanity filter
//!
//! Pure lexical masking of banned terms. Every case-insensitive occurrence
//! of a configured term is replaced by an equal-length run of `*`, scanning
//! left-to-right with greedy non-overlapping matches, terms applied in
//! configured order. No stemming, never errors, idempotent.
//!
//! The word list lives behind an `RwLock` so it can be hot-reloaded while
//! the server runs.

use std::sync::{PoisonError, RwLock};

/// Mask character substituted for banned term characters
const MASK: char = '*';

/// Case-insensitive masking filter over a configurable ordered term list
#[derive(Debug)]
pub struct ProfanityFilter {
    /// Lowercased banned terms, in application order
    words: RwLock<Vec<String>>,
}

impl ProfanityFilter {
    /// Create a filter with the given ordered term list
    ///
    /// Terms are lowercased; empty terms are dropped.
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            words: RwLock::new(normalize(words)),
        }
    }

    /// Replace the term list (hot reload)
    pub fn reload<I, S>(&self, words: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut guard = self
            .words
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = normalize(words);
    }

    /// Mask every banned-term occurrence in `text`
    pub fn filter(&self, text: &str) -> String {
        let words = self
            .words
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut chars: Vec<char> = text.chars().collect();
        for word in words.iter() {
            mask_term(&mut chars, word);
        }
        chars.into_iter().collect()
    }
}

/// Lowercase and drop empty terms, preserving order
fn normalize<I, S>(words: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    words
        .into_iter()
        .map(|w| w.as_ref().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Mask all case-insensitive occurrences of `term` in place
///
/// Greedy left-to-right scan: after a match the cursor jumps past it, so
/// overlapping candidates resolve to the leftmost match.
fn mask_term(chars: &mut [char], term: &str) {
    let term_chars: Vec<char> = term.chars().collect();
    let n = term_chars.len();
    if n == 0 || chars.len() < n {
        return;
    }
    let mut i = 0;
    while i + n <= chars.len() {
        let matched = (0..n).all(|k| eq_ignore_case(chars[i + k], term_chars[k]));
        if matched {
            for slot in chars.iter_mut().skip(i).take(n) {
                *slot = MASK;
            }
            i += n;
        } else {
            i += 1;
        }
    }
}

/// Case-insensitive char comparison
fn eq_ignore_case(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}
