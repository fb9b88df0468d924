use std::fmt;
use std::sync::Arc;

use crate::bridge::Snapshot;
use crate::store::EntryStatus;

use super::SuggestionEngine;

struct Memoized<T> {
    data: Option<Arc<T>>,
    usable: bool,
    query: String,
    suggestions: Vec<String>,
}

/// Remembers the last suggestions of a [`SuggestionEngine`].
///
/// Suggestions are recomputed only when the query text or the identity of the
/// cached data changes. Data identity is the `Arc` allocation, so a refetch
/// that produced a new value recomputes even when it compares equal.
pub struct SuggestionMemo<T> {
    engine: SuggestionEngine<T>,
    last: Option<Memoized<T>>,
    recomputations: usize,
}

impl<T> SuggestionMemo<T> {
    /// Wraps `engine`.
    pub fn new(engine: SuggestionEngine<T>) -> Self {
        SuggestionMemo {
            engine,
            last: None,
            recomputations: 0,
        }
    }

    /// Suggestions for `query` over `source`, recomputed only if needed.
    pub fn suggest(&mut self, source: &Snapshot<T>, query: &str) -> &[String] {
        let usable = source.status != EntryStatus::Error;
        let hit = self.last.as_ref().is_some_and(|last| {
            last.usable == usable
                && last.query == query
                && match (&last.data, &source.data) {
                    (Some(previous), Some(current)) => Arc::ptr_eq(previous, current),
                    (None, None) => true,
                    _ => false,
                }
        });

        if !hit {
            self.recomputations += 1;
            self.last = Some(Memoized {
                data: source.data.clone(),
                usable,
                query: query.to_owned(),
                suggestions: self.engine.suggest(source, query),
            });
        }

        self.last
            .as_ref()
            .map(|last| last.suggestions.as_slice())
            .unwrap_or_default()
    }

    /// How many times suggestions were actually computed.
    pub fn recomputations(&self) -> usize {
        self.recomputations
    }

    /// Forgets the remembered result.
    pub fn clear(&mut self) {
        self.last = None;
    }
}

impl<T> fmt::Debug for SuggestionMemo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuggestionMemo")
            .field("engine", &self.engine)
            .field("query", &self.last.as_ref().map(|last| last.query.as_str()))
            .field("recomputations", &self.recomputations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn snapshot(names: &[&str]) -> Snapshot<Vec<String>> {
        Snapshot {
            data: Some(Arc::new(names.iter().map(|s| s.to_string()).collect())),
            status: EntryStatus::Fresh,
            ..Snapshot::default()
        }
    }

    #[test]
    fn test_recomputes_only_on_query_or_data_change() {
        let extracted = Arc::new(AtomicUsize::new(0));
        let engine = {
            let extracted = extracted.clone();
            SuggestionEngine::new(move |names: &Vec<String>| {
                extracted.fetch_add(1, Ordering::SeqCst);
                names.clone()
            })
        };
        let mut memo = engine.memo();
        let source = snapshot(&["Computer Science", "Data Science"]);

        assert_eq!(memo.suggest(&source, "sci"), ["Data Science", "Computer Science"]);
        assert_eq!(memo.suggest(&source.clone(), "sci"), ["Data Science", "Computer Science"]);
        assert_eq!(memo.recomputations(), 1);

        assert_eq!(memo.suggest(&source, "com"), ["Computer Science"]);
        assert_eq!(memo.recomputations(), 2);

        // same contents, new allocation
        let refetched = snapshot(&["Computer Science", "Data Science"]);
        memo.suggest(&refetched, "com");
        assert_eq!(memo.recomputations(), 3);
        assert_eq!(extracted.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_failure_status_invalidates_memo() {
        let mut memo = SuggestionEngine::new(|names: &Vec<String>| names.clone()).memo();
        let source = snapshot(&["Computer Science"]);
        assert_eq!(memo.suggest(&source, "com"), ["Computer Science"]);

        let failed = Snapshot {
            status: EntryStatus::Error,
            ..source.clone()
        };
        assert!(memo.suggest(&failed, "com").is_empty());
        assert_eq!(memo.recomputations(), 2);
    }
}
