//! Time accounting for a single issue.
//!
//! Everything here works on one issue's timestamps and changelog. Folding
//! results across a project lives in [`crate::aggregate`].

use crate::status::TerminalPredicate;
use crate::types::{StatusDurations, Transition};
use chrono::{DateTime, Utc};
use serde::Serialize;

const SECONDS_PER_DAY: f64 = 24.0 * 3600.0;

/// Fractional days between two instants. Negative when `end` precedes `start`.
pub fn days_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 1000.0 / SECONDS_PER_DAY
}

/// A changelog inconsistency found while accounting time.
///
/// The interval involved is left out of the result; no negative duration is
/// ever emitted.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataQualityFault {
    /// A transition is stamped earlier than the point the previous status began.
    OutOfOrderTransition {
        issue_key: String,
        timestamp: DateTime<Utc>,
        status_start: DateTime<Utc>,
    },
    /// The issue was last updated before its final recorded transition.
    UpdatedBeforeLastTransition {
        status: String,
        updated_at: DateTime<Utc>,
        status_start: DateTime<Utc>,
    },
}

/// Per-issue output of [`compute_time_in_status`].
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TimeInStatus {
    pub durations: StatusDurations,
    pub faults: Vec<DataQualityFault>,
}

impl TimeInStatus {
    pub fn total_days(&self) -> f64 {
        self.durations.values().sum()
    }
}

/// Reconstructs how many days an issue spent in each status.
///
/// Intervals between consecutive transitions are charged to the transition's
/// `from_status`; an interval whose `from_status` is unknown is dropped. The
/// interval after the last transition is only charged when the issue is in a
/// terminal status, ending at `updated_at`. Open issues never get a
/// "time so far" entry.
///
/// Transitions are stable-sorted by timestamp first, so same-second events keep
/// their fetch order.
pub fn compute_time_in_status<P>(
    created_at: DateTime<Utc>,
    current_status: &str,
    transitions: &[Transition],
    updated_at: DateTime<Utc>,
    terminal: &P,
) -> TimeInStatus
where
    P: TerminalPredicate + ?Sized,
{
    let mut ordered: Vec<&Transition> = transitions.iter().collect();
    ordered.sort_by_key(|t| t.timestamp);

    let mut result = TimeInStatus::default();
    let mut status_start = created_at;
    let mut status = ordered
        .first()
        .and_then(|t| t.from_status.as_deref())
        .unwrap_or(current_status)
        .to_string();

    for transition in ordered {
        if transition.timestamp < status_start {
            tracing::warn!(
                issue = %transition.issue_key,
                timestamp = %transition.timestamp,
                status_start = %status_start,
                "Transition precedes the start of the previous status, skipping interval"
            );
            result.faults.push(DataQualityFault::OutOfOrderTransition {
                issue_key: transition.issue_key.clone(),
                timestamp: transition.timestamp,
                status_start,
            });
        } else {
            if let Some(from) = &transition.from_status {
                let elapsed = days_between(status_start, transition.timestamp);
                *result.durations.entry(from.clone()).or_insert(0.0) += elapsed;
            }
            status_start = transition.timestamp;
        }
        status = transition.to_status.clone();
    }

    if terminal.is_terminal(&status) {
        if updated_at < status_start {
            result.faults.push(DataQualityFault::UpdatedBeforeLastTransition {
                status,
                updated_at,
                status_start,
            });
        } else {
            let elapsed = days_between(status_start, updated_at);
            *result.durations.entry(status).or_insert(0.0) += elapsed;
        }
    }

    result
}

/// Outcome of [`classify_open_duration`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum OpenDuration {
    /// Days from creation to last update, for an issue in a terminal status.
    Closed(f64),
    /// The issue is not finished and is excluded from the open-duration metric.
    NotClosed,
}

impl OpenDuration {
    pub fn days(self) -> Option<f64> {
        match self {
            OpenDuration::Closed(days) => Some(days),
            OpenDuration::NotClosed => None,
        }
    }
}

/// How long a finished issue stayed open.
///
/// `updated_at` stands in for the closure time. That over-counts issues that
/// were touched after closing (a late comment, say); the final-interval boundary
/// of [`compute_time_in_status`] is the precise alternative. Both numbers are
/// reported as they are, so this approximation is kept on purpose.
pub fn classify_open_duration<P>(
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    status_name: &str,
    terminal: &P,
) -> OpenDuration
where
    P: TerminalPredicate + ?Sized,
{
    if !terminal.is_terminal(status_name) {
        return OpenDuration::NotClosed;
    }
    OpenDuration::Closed(days_between(created_at, updated_at).max(0.0))
}
