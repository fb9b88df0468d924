use std::time::Duration;

use tokio::sync::watch;

/// Default quiet period before a query is considered settled.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(150);

/// Latest-value-wins debouncing of a live query.
///
/// Yields a query once it has not changed for the configured delay, skipping
/// every intermediate value typed in between. A settled query equal to the
/// previously yielded one is not yielded again.
#[derive(Debug)]
pub struct QueryDebouncer {
    input: watch::Receiver<String>,
    delay: Duration,
    last: String,
}

impl QueryDebouncer {
    /// Debounces `input` with `delay`.
    ///
    /// The query current at construction counts as already yielded.
    pub fn new(mut input: watch::Receiver<String>, delay: Duration) -> Self {
        let last = input.borrow_and_update().clone();
        QueryDebouncer { input, delay, last }
    }

    /// Debounces `input` with [`DEFAULT_DEBOUNCE`].
    pub fn with_default_delay(input: watch::Receiver<String>) -> Self {
        Self::new(input, DEFAULT_DEBOUNCE)
    }

    /// Last yielded query.
    pub fn current(&self) -> &str {
        &self.last
    }

    /// Waits for the next settled query.
    ///
    /// Returns `None` once the sender is gone and every change was yielded.
    pub async fn next(&mut self) -> Option<String> {
        loop {
            self.input.changed().await.ok()?;

            // every change restarts the quiet period
            loop {
                tokio::select! {
                    changed = self.input.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(self.delay) => break,
                }
            }

            let query = self.input.borrow_and_update().clone();
            if query != self.last {
                self.last = query.clone();
                return Some(query);
            }
        }
    }
}
