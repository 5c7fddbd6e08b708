//! The seam between the analysis pipeline and whatever serves issue data.

use crate::error::FetchError;
use crate::types::{Issue, ProjectKey, Transition};
use async_trait::async_trait;

/// Issues returned by a project search.
///
/// When a page after the first fails, the issues gathered so far are kept and
/// the page error is carried in `incomplete` so callers can still report on them.
#[derive(Debug, Default)]
pub struct FetchedIssues {
    pub issues: Vec<Issue>,
    /// Total number of issues the tracker reported for the search.
    pub total: u64,
    pub incomplete: Option<FetchError>,
}

impl FetchedIssues {
    pub fn complete(issues: Vec<Issue>) -> Self {
        let total = issues.len() as u64;
        Self {
            issues,
            total,
            incomplete: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.incomplete.is_none()
    }
}

/// Remote source of issues and their status history.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Fetches every issue of a project, following pagination.
    ///
    /// Returns `Err` only when nothing could be fetched at all.
    async fn fetch_issues(&self, project: &ProjectKey) -> Result<FetchedIssues, FetchError>;

    /// Fetches the status changes of one issue, ordered by timestamp.
    async fn fetch_transitions(&self, issue_key: &str) -> Result<Vec<Transition>, FetchError>;
}
