//! Autocomplete suggestions over a cached list.
//!
//! The engine is a pure function of a [`Snapshot`] and a query: it extracts
//! candidate strings from the cached data with an injected mapping, keeps the
//! ones containing the query (case-insensitively), removes duplicates and
//! ranks them.
//!
//! Ranking, for identical inputs always the same:
//!
//! 1. candidates starting with the query before those merely containing it
//! 2. shorter candidates before longer ones
//! 3. source order
//!
//! ```
//! use fresco::suggest::{SuggestionLimit, rank};
//!
//! let source = ["Computer Science", "Data Science", "Applied Science"];
//! let ranked = rank(source, "sci", SuggestionLimit::default());
//! assert_eq!(ranked, ["Data Science", "Applied Science", "Computer Science"]);
//! ```

mod debounce;
mod memo;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use bounded_integer::bounded_integer;

use crate::bridge::Snapshot;
use crate::store::EntryStatus;

pub use debounce::{DEFAULT_DEBOUNCE, QueryDebouncer};
pub use memo::SuggestionMemo;

bounded_integer! {
    /// Maximum number of suggestions returned (1-255).
    #[repr(u8)]
    pub struct SuggestionLimit { 1..=255 }
}

/// Limit used when none is configured.
pub const DEFAULT_SUGGESTION_LIMIT: u8 = 8;

impl Default for SuggestionLimit {
    fn default() -> Self {
        SuggestionLimit::new_saturating(DEFAULT_SUGGESTION_LIMIT)
    }
}

type Extractor<T> = dyn Fn(&T) -> Vec<String> + Send + Sync;

/// Suggestion engine bound to one payload shape.
pub struct SuggestionEngine<T> {
    extract: Arc<Extractor<T>>,
    limit: SuggestionLimit,
}

impl<T> Clone for SuggestionEngine<T> {
    fn clone(&self) -> Self {
        SuggestionEngine {
            extract: Arc::clone(&self.extract),
            limit: self.limit,
        }
    }
}

impl<T> fmt::Debug for SuggestionEngine<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuggestionEngine")
            .field("limit", &self.limit)
            .finish()
    }
}

impl<T> SuggestionEngine<T> {
    /// Creates an engine that reads candidates with `extract`.
    ///
    /// `extract` returns the searchable fields of the cached payload in source
    /// order (names, types, keywords, ...).
    pub fn new<F>(extract: F) -> Self
    where
        F: Fn(&T) -> Vec<String> + Send + Sync + 'static,
    {
        SuggestionEngine {
            extract: Arc::new(extract),
            limit: SuggestionLimit::default(),
        }
    }

    /// Sets the maximum number of suggestions.
    pub fn with_limit(self, limit: SuggestionLimit) -> Self {
        Self { limit, ..self }
    }

    /// Maximum number of suggestions.
    pub fn limit(&self) -> SuggestionLimit {
        self.limit
    }

    /// Ranked suggestions for `query`.
    ///
    /// Surrounding whitespace of the query and of every candidate is ignored,
    /// so a whitespace-only query counts as blank. Empty when the query is
    /// blank, the source has no data yet or its last fetch failed.
    pub fn suggest(&self, source: &Snapshot<T>, query: &str) -> Vec<String> {
        suggest(source, query, self.limit, |data| (self.extract)(data))
    }

    /// Memoizing wrapper around this engine.
    pub fn memo(&self) -> SuggestionMemo<T> {
        SuggestionMemo::new(self.clone())
    }
}

/// Ranked suggestions for `query` over the data of `source`.
///
/// See [`SuggestionEngine::suggest`].
pub fn suggest<T, F>(
    source: &Snapshot<T>,
    query: &str,
    limit: SuggestionLimit,
    extract: F,
) -> Vec<String>
where
    F: FnOnce(&T) -> Vec<String>,
{
    if source.status == EntryStatus::Error {
        return Vec::new();
    }
    match source.data.as_deref() {
        Some(data) => rank(extract(data), query, limit),
        None => Vec::new(),
    }
}

/// Filters, deduplicates and ranks `candidates` against `query`.
///
/// Query and candidates are trimmed first; a blank query yields nothing.
pub fn rank<I>(candidates: I, query: &str, limit: SuggestionLimit) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return Vec::new();
    }

    let mut seen = HashSet::new();
    let mut matches: Vec<(bool, usize, usize, String)> = Vec::new();
    for (position, candidate) in candidates.into_iter().enumerate() {
        let candidate = candidate.as_ref().trim();
        let folded = candidate.to_lowercase();
        if !seen.insert(folded.clone()) {
            continue;
        }
        if folded.contains(&query) {
            let substring_only = !folded.starts_with(&query);
            matches.push((
                substring_only,
                candidate.chars().count(),
                position,
                candidate.to_owned(),
            ));
        }
    }

    matches.sort_by_key(|(substring_only, length, position, _)| {
        (*substring_only, *length, *position)
    });
    matches
        .into_iter()
        .take(usize::from(limit.get()))
        .map(|(_, _, _, candidate)| candidate)
        .collect()
}
