//! Application configuration and environment variable parsing.
//!
//! This module handles loading configuration settings from the environment (e.g., .env file).
//! It defines the `AppConfig` struct which governs which tracker and project are analysed,
//! what counts as a finished issue, and how hard the tracker API is hit.

use crate::status::TerminalStatuses;
use crate::types::ProjectKey;
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use std::time::Duration as StdDuration;

/// Application configuration loaded from environment variables.
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    /// Base URL of the Jira instance, without a trailing slash.
    #[serde(default = "default_jira_url", deserialize_with = "deserialize_base_url")]
    pub jira_url: String,

    /// Username for basic auth. Only used together with `jira_api_token`.
    #[serde(default)]
    pub jira_username: Option<String>,

    /// API token for basic auth. Public instances can be read anonymously.
    #[serde(default)]
    pub jira_api_token: Option<String>,

    /// Project analysed by the `report` command.
    #[serde(default = "default_project_key")]
    pub jira_project_key: ProjectKey,

    /// Status vocabulary that marks an issue as finished.
    /// Expected format: comma-separated terms, matched case-insensitively as substrings.
    /// Example: "closed,resolved,done"
    #[serde(default, deserialize_with = "deserialize_terminal_statuses")]
    pub terminal_statuses: TerminalStatuses,

    /// Number of issues requested per search page.
    #[serde(default = "default_search_page_size")]
    pub search_page_size: u32,

    /// Maximum number of changelog requests in flight at once.
    #[serde(default = "default_transition_fetch_concurrency")]
    pub transition_fetch_concurrency: usize,

    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// How many users the assignee/reporter rankings keep.
    #[serde(default = "default_report_top_n")]
    pub report_top_n: usize,

    /// Directory the `report` command writes its artifacts to.
    #[serde(default = "default_report_output_dir")]
    pub report_output_dir: PathBuf,

    /// Port the `serve` command listens on.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_jira_url() -> String {
    "https://issues.apache.org/jira".to_string()
}

fn default_project_key() -> ProjectKey {
    ProjectKey::new("KAFKA")
}

fn default_search_page_size() -> u32 {
    1000
}

fn default_transition_fetch_concurrency() -> usize {
    8
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_report_top_n() -> usize {
    30
}

fn default_report_output_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_port() -> u16 {
    3000
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    pub fn request_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.request_timeout_seconds)
    }

    /// Basic-auth pair, present only when an API token is configured.
    pub fn credentials(&self) -> Option<(String, String)> {
        let token = self.jira_api_token.as_deref().filter(|t| !t.is_empty())?;
        let username = self.jira_username.clone().unwrap_or_default();
        Some((username, token.to_string()))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            jira_url: default_jira_url(),
            jira_username: None,
            jira_api_token: None,
            jira_project_key: default_project_key(),
            terminal_statuses: TerminalStatuses::default(),
            search_page_size: default_search_page_size(),
            transition_fetch_concurrency: default_transition_fetch_concurrency(),
            request_timeout_seconds: default_request_timeout_seconds(),
            report_top_n: default_report_top_n(),
            report_output_dir: default_report_output_dir(),
            port: default_port(),
        }
    }
}

fn deserialize_base_url<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Ok(s.trim().trim_end_matches('/').to_string())
}

fn deserialize_terminal_statuses<'de, D>(deserializer: D) -> Result<TerminalStatuses, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    let statuses = TerminalStatuses::parse(&s);
    if statuses.terms().is_empty() {
        return Err(serde::de::Error::custom(
            "terminal_statuses must name at least one status",
        ));
    }
    Ok(statuses)
}
