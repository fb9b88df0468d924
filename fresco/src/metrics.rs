//! Metrics declaration and initialization.

use std::time::Duration;

use crate::store::FetchKind;

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    // Observation metrics

    /// Track observations by the state the entry was found in.
    pub static ref OBSERVE_COUNTER: &'static str = {
        metrics::describe_counter!(
            "fresco_observe_total",
            "Total number of observations, labelled by entry state."
        );
        "fresco_observe_total"
    };

    // Fetch metrics

    /// Track number of producer calls started.
    pub static ref FETCH_STARTED_COUNTER: &'static str = {
        metrics::describe_counter!(
            "fresco_fetch_started_total",
            "Total number of producer calls started."
        );
        "fresco_fetch_started_total"
    };
    /// Track number of callers that joined an in-flight request.
    pub static ref FETCH_DEDUPLICATED_COUNTER: &'static str = {
        metrics::describe_counter!(
            "fresco_fetch_deduplicated_total",
            "Total number of fetches joined to a request already in flight."
        );
        "fresco_fetch_deduplicated_total"
    };
    /// Track number of failed producer calls.
    pub static ref FETCH_FAILED_COUNTER: &'static str = {
        metrics::describe_counter!(
            "fresco_fetch_failed_total",
            "Total number of failed producer calls."
        );
        "fresco_fetch_failed_total"
    };
    /// Histogram of producer call duration.
    pub static ref FETCH_DURATION: &'static str = {
        metrics::describe_histogram!(
            "fresco_fetch_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of producer calls in seconds."
        );
        "fresco_fetch_duration_seconds"
    };

    // Store metrics

    /// Track number of evicted entries.
    pub static ref EVICTION_COUNTER: &'static str = {
        metrics::describe_counter!(
            "fresco_evictions_total",
            "Total number of evicted cache entries."
        );
        "fresco_evictions_total"
    };

    // Offload manager metrics

    /// Track number of offload tasks spawned.
    pub static ref OFFLOAD_TASKS_SPAWNED: &'static str = {
        metrics::describe_counter!(
            "fresco_offload_tasks_spawned_total",
            "Total number of offload tasks spawned."
        );
        "fresco_offload_tasks_spawned_total"
    };
    /// Track number of offload tasks completed.
    pub static ref OFFLOAD_TASKS_COMPLETED: &'static str = {
        metrics::describe_counter!(
            "fresco_offload_tasks_completed_total",
            "Total number of offload tasks completed."
        );
        "fresco_offload_tasks_completed_total"
    };
    /// Gauge of currently active offload tasks.
    pub static ref OFFLOAD_TASKS_ACTIVE: &'static str = {
        metrics::describe_gauge!(
            "fresco_offload_tasks_active",
            "Number of currently active offload tasks."
        );
        "fresco_offload_tasks_active"
    };
    /// Histogram of offload task duration.
    pub static ref OFFLOAD_TASK_DURATION: &'static str = {
        metrics::describe_histogram!(
            "fresco_offload_task_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of offload tasks in seconds."
        );
        "fresco_offload_task_duration_seconds"
    };
}

/// Record the state an observed entry was found in
/// (`fresh`, `stale` or `miss`).
#[cfg(feature = "metrics")]
#[inline]
pub fn record_observe(state: &'static str) {
    metrics::counter!(*OBSERVE_COUNTER, "state" => state).increment(1);
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_observe(_state: &'static str) {}

/// Record a started or joined fetch.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_fetch_start(kind: FetchKind, deduplicated: bool) {
    let counter = if deduplicated {
        *FETCH_DEDUPLICATED_COUNTER
    } else {
        *FETCH_STARTED_COUNTER
    };
    metrics::counter!(counter, "kind" => kind.as_str()).increment(1);
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_fetch_start(_kind: FetchKind, _deduplicated: bool) {}

/// Record the outcome of a producer call.
///
/// `error_kind` is the [`FetchError::kind`](fresco_core::FetchError::kind)
/// label of a failure, `None` on success.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_fetch_outcome(kind: FetchKind, duration: Duration, error_kind: Option<&'static str>) {
    metrics::histogram!(
        *FETCH_DURATION,
        "kind" => kind.as_str(),
        "outcome" => if error_kind.is_some() { "error" } else { "ok" }
    )
    .record(duration.as_secs_f64());

    if let Some(error_kind) = error_kind {
        metrics::counter!(*FETCH_FAILED_COUNTER, "kind" => error_kind).increment(1);
    }
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_fetch_outcome(
    _kind: FetchKind,
    _duration: Duration,
    _error_kind: Option<&'static str>,
) {
}

/// Record evicted entries.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_evictions(count: usize) {
    metrics::counter!(*EVICTION_COUNTER).increment(count as u64);
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_evictions(_count: usize) {}

/// Record a spawned offload task.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_offload_spawned(kind: FetchKind) {
    metrics::counter!(*OFFLOAD_TASKS_SPAWNED, "kind" => kind.as_str()).increment(1);
    metrics::gauge!(*OFFLOAD_TASKS_ACTIVE, "kind" => kind.as_str()).increment(1.0);
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_offload_spawned(_kind: FetchKind) {}

/// Record an offload task leaving the manager.
///
/// `completed` is false for a task that was aborted before it finished; it
/// only leaves the active gauge.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_offload_finished(kind: FetchKind, duration: Duration, completed: bool) {
    metrics::gauge!(*OFFLOAD_TASKS_ACTIVE, "kind" => kind.as_str()).decrement(1.0);
    if completed {
        metrics::counter!(*OFFLOAD_TASKS_COMPLETED, "kind" => kind.as_str()).increment(1);
        metrics::histogram!(*OFFLOAD_TASK_DURATION, "kind" => kind.as_str())
            .record(duration.as_secs_f64());
    }
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_offload_finished(_kind: FetchKind, _duration: Duration, _completed: bool) {}
