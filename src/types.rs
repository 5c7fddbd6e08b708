use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Days spent in each status, keyed by the status name as the tracker spells it.
pub type StatusDurations = BTreeMap<String, f64>;

/// Identifier of a tracker project (e.g. "KAFKA").
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct ProjectKey(String);

impl ProjectKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for Jira-style keys: an uppercase ASCII letter followed by
    /// uppercase letters, digits or underscores.
    ///
    /// Only valid keys are ever interpolated into a JQL query.
    pub fn is_valid(&self) -> bool {
        let mut chars = self.0.chars();
        chars.next().is_some_and(|c| c.is_ascii_uppercase())
            && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
    }
}

impl From<String> for ProjectKey {
    fn from(key: String) -> Self {
        Self::new(key)
    }
}

impl fmt::Display for ProjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot of one issue as returned by the tracker search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: String,
    pub assignee: Option<String>,
    pub reporter: Option<String>,
    pub priority: Option<String>,
    /// Logged work in seconds, when the tracker has time tracking enabled.
    pub time_spent_seconds: Option<u64>,
}

/// A single recorded status change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub issue_key: String,
    pub timestamp: DateTime<Utc>,
    /// `None` for the first recorded change on trackers that don't log the initial status.
    pub from_status: Option<String>,
    pub to_status: String,
    pub author: String,
}
