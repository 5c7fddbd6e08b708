//! Service layer that turns tracker data into a project report.
//!
//! This module implements `ReportQuerier`, the single entry point used by both
//! the CLI and the HTTP API. It:
//! 1. Fetches every issue of a project (keeping partial results if paging fails).
//! 2. Fetches each finished issue's status history with bounded concurrency.
//! 3. Runs the time-in-status engine per issue as its history arrives.
//! 4. Folds everything into a `ProjectReport`.

use crate::aggregate::{ProjectReport, ReportInput};
use crate::config::AppConfig;
use crate::error::FetchError;
use crate::jira::JiraClient;
use crate::metrics::{compute_time_in_status, TimeInStatus};
use crate::status::{TerminalPredicate, TerminalStatuses};
use crate::tracker::IssueTracker;
use crate::types::{Issue, ProjectKey};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct ReportQuerier {
    tracker: Arc<dyn IssueTracker>,
    terminal: TerminalStatuses,
    concurrency_limit: usize,
    top_n: usize,
}

/// Time-in-status results for a set of issues.
#[derive(Debug, Default)]
pub struct StatusHistory {
    pub by_issue: HashMap<String, TimeInStatus>,
    /// Issue keys whose history could not be fetched.
    pub failed: Vec<String>,
}

impl ReportQuerier {
    /// Builds a querier backed by the Jira REST client.
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let client = JiraClient::new(config)?;
        Ok(Self::with_tracker(config, Arc::new(client)))
    }

    /// Builds a querier backed by any tracker implementation.
    pub fn with_tracker(config: &AppConfig, tracker: Arc<dyn IssueTracker>) -> Self {
        Self {
            tracker,
            terminal: config.terminal_statuses.clone(),
            concurrency_limit: config.transition_fetch_concurrency.max(1),
            top_n: config.report_top_n,
        }
    }

    /// Fetches a project and computes its full report.
    ///
    /// Fails only when no issues could be fetched at all. A failed search page
    /// or a failed history fetch is logged and reflected in the report summary.
    pub async fn report(&self, project: &ProjectKey) -> Result<ProjectReport, FetchError> {
        tracing::info!(project = %project, "Starting analysis");

        let fetched = self.tracker.fetch_issues(project).await?;
        let incomplete = !fetched.is_complete();
        tracing::info!(
            project = %project,
            fetched = fetched.issues.len(),
            total = fetched.total,
            "Fetched issues"
        );

        // The stream owns its issues so the fan-out future stays `Send` for axum.
        let closed: Vec<Issue> = fetched
            .issues
            .iter()
            .filter(|issue| self.terminal.is_terminal(&issue.status))
            .cloned()
            .collect();
        tracing::info!(project = %project, closed = closed.len(), "Found closed issues");

        let history = self.status_history(closed).await;

        let report = ProjectReport::build(
            &fetched.issues,
            ReportInput {
                project,
                time_in_status: &history.by_issue,
                transition_fetch_failures: history.failed.len(),
                incomplete,
                terminal: &self.terminal,
                top_n: self.top_n,
                now: Utc::now(),
            },
        );

        tracing::info!(
            project = %project,
            statuses = report.status_durations.len(),
            days = report.daily_trend.len(),
            "Analysis complete"
        );
        Ok(report)
    }

    /// Fetches histories and computes time-in-status for `issues`.
    ///
    /// At most `concurrency_limit` history requests are in flight. Results are
    /// keyed by issue, so completion order is irrelevant.
    pub async fn status_history(&self, issues: Vec<Issue>) -> StatusHistory {
        let mut results = stream::iter(issues)
            .map(|issue| async move {
                let outcome = self
                    .tracker
                    .fetch_transitions(&issue.key)
                    .await
                    .map(|transitions| {
                        compute_time_in_status(
                            issue.created_at,
                            &issue.status,
                            &transitions,
                            issue.updated_at,
                            &self.terminal,
                        )
                    });
                (issue.key, outcome)
            })
            .buffer_unordered(self.concurrency_limit);

        let mut history = StatusHistory::default();
        while let Some((key, outcome)) = results.next().await {
            match outcome {
                Ok(time_in_status) => {
                    if !time_in_status.faults.is_empty() {
                        tracing::warn!(
                            issue = %key,
                            faults = time_in_status.faults.len(),
                            "Inconsistent status history, affected intervals skipped"
                        );
                    }
                    history.by_issue.insert(key, time_in_status);
                }
                Err(e) => {
                    tracing::error!(issue = %key, "Failed to fetch transitions: {}", e);
                    history.failed.push(key);
                }
            }
        }
        history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::FetchedIssues;
    use crate::types::Transition;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone};
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn issue(key: &str, status: &str, created: u32, updated: u32) -> Issue {
        Issue {
            key: key.to_string(),
            created_at: at(created),
            updated_at: at(updated),
            status: status.to_string(),
            assignee: Some("alice".to_string()),
            reporter: Some("bob".to_string()),
            priority: Some("Major".to_string()),
            time_spent_seconds: Some(3600),
        }
    }

    /// In-memory tracker that records peak request concurrency.
    struct FakeTracker {
        issues: Vec<Issue>,
        transitions: HashMap<String, Vec<Transition>>,
        failing: Vec<String>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FakeTracker {
        fn new(issues: Vec<Issue>) -> Self {
            Self {
                issues,
                transitions: HashMap::new(),
                failing: Vec::new(),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl IssueTracker for FakeTracker {
        async fn fetch_issues(&self, _project: &ProjectKey) -> Result<FetchedIssues, FetchError> {
            Ok(FetchedIssues::complete(self.issues.clone()))
        }

        async fn fetch_transitions(&self, issue_key: &str) -> Result<Vec<Transition>, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(StdDuration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.iter().any(|k| k == issue_key) {
                return Err(FetchError::Status {
                    url: format!("fake://issue/{}", issue_key),
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                });
            }
            Ok(self.transitions.get(issue_key).cloned().unwrap_or_default())
        }
    }

    fn config(concurrency: usize) -> AppConfig {
        AppConfig {
            transition_fetch_concurrency: concurrency,
            report_top_n: 5,
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn test_report_combines_engine_and_aggregates() {
        let mut tracker = FakeTracker::new(vec![
            issue("K-1", "Done", 1, 10),
            issue("K-2", "In Progress", 2, 4),
        ]);
        tracker.transitions.insert(
            "K-1".to_string(),
            vec![
                Transition {
                    issue_key: "K-1".to_string(),
                    timestamp: at(3),
                    from_status: Some("Open".to_string()),
                    to_status: "In Progress".to_string(),
                    author: "alice".to_string(),
                },
                Transition {
                    issue_key: "K-1".to_string(),
                    timestamp: at(10),
                    from_status: Some("In Progress".to_string()),
                    to_status: "Done".to_string(),
                    author: "alice".to_string(),
                },
            ],
        );

        let querier = ReportQuerier::with_tracker(&config(4), Arc::new(tracker));
        let report = querier.report(&ProjectKey::new("K")).await.unwrap();

        assert_eq!(report.summary.total_issues, 2);
        assert_eq!(report.summary.closed_issues, 1);
        assert_eq!(report.open_durations, vec![9.0]);
        assert_eq!(report.status_durations["Open"], vec![2.0]);
        assert_eq!(report.status_durations["In Progress"], vec![7.0]);
        assert_eq!(report.top_assignees[0].count, 2);
        assert!(!report.summary.incomplete);
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_report_future_is_send() {
        // axum handlers require `Send` futures.
        let tracker = Arc::new(FakeTracker::new(vec![]));
        let querier = ReportQuerier::with_tracker(&config(2), tracker);
        let project = ProjectKey::new("K");
        assert_send(&querier.report(&project));
        assert_send(&querier.status_history(vec![issue("K-1", "Done", 1, 2)]));
    }

    #[tokio::test]
    async fn test_history_fetch_respects_concurrency_limit() {
        let issues: Vec<Issue> = (1..=12)
            .map(|i| issue(&format!("K-{}", i), "Closed", 1, 2))
            .collect();
        let tracker = Arc::new(FakeTracker::new(issues.clone()));

        let querier = ReportQuerier::with_tracker(&config(3), tracker.clone());
        let history = querier.status_history(issues).await;

        assert_eq!(history.by_issue.len(), 12);
        assert!(tracker.peak.load(Ordering::SeqCst) <= 3);
        // No transitions: whole lifetime lands in the final status.
        assert_eq!(history.by_issue["K-7"].durations["Closed"], 1.0);
    }

    #[tokio::test]
    async fn test_failed_history_is_counted_not_fatal() {
        let mut tracker = FakeTracker::new(vec![
            issue("K-1", "Done", 1, 3),
            issue("K-2", "Done", 1, 5),
        ]);
        tracker.failing.push("K-2".to_string());

        let querier = ReportQuerier::with_tracker(&config(2), Arc::new(tracker));
        let report = querier.report(&ProjectKey::new("K")).await.unwrap();

        assert_eq!(report.summary.transition_fetch_failures, 1);
        assert_eq!(report.status_durations["Done"], vec![2.0]);
        // The open-duration metric does not need the history.
        assert_eq!(report.open_durations.len(), 2);
    }
}
