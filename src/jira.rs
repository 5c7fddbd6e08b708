//! Jira REST (v2) implementation of [`IssueTracker`].

use crate::config::AppConfig;
use crate::error::FetchError;
use crate::tracker::{FetchedIssues, IssueTracker};
use crate::types::{Issue, ProjectKey, Transition};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

const SEARCH_PATH: &str = "/rest/api/2/search";
const SEARCH_FIELDS: &str =
    "key,summary,status,created,updated,assignee,reporter,priority,timetracking,issuetype";
const UNKNOWN_AUTHOR: &str = "Unknown";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    total: u64,
    /// Decoded one by one so a single malformed issue doesn't sink its page.
    #[serde(default)]
    issues: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct JiraIssue {
    key: String,
    fields: JiraIssueFields,
}

#[derive(Debug, Deserialize)]
struct JiraIssueFields {
    #[serde(deserialize_with = "deserialize_timestamp")]
    created: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    updated: DateTime<Utc>,
    status: Named,
    assignee: Option<JiraUser>,
    reporter: Option<JiraUser>,
    priority: Option<Named>,
    timetracking: Option<TimeTracking>,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JiraUser {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimeTracking {
    time_spent_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct IssueWithChangelog {
    #[serde(default)]
    changelog: Option<Changelog>,
}

#[derive(Debug, Deserialize)]
struct Changelog {
    #[serde(default)]
    histories: Vec<History>,
}

#[derive(Debug, Deserialize)]
struct History {
    #[serde(deserialize_with = "deserialize_timestamp")]
    created: DateTime<Utc>,
    author: Option<JiraUser>,
    #[serde(default)]
    items: Vec<HistoryItem>,
}

#[derive(Debug, Deserialize)]
struct HistoryItem {
    field: String,
    #[serde(rename = "fromString")]
    from_status: Option<String>,
    #[serde(rename = "toString")]
    to_status: Option<String>,
}

impl JiraIssue {
    fn into_issue(self) -> Issue {
        let fields = self.fields;
        Issue {
            key: self.key,
            created_at: fields.created,
            updated_at: fields.updated,
            status: fields.status.name,
            assignee: fields.assignee.and_then(|u| u.display_name),
            reporter: fields.reporter.and_then(|u| u.display_name),
            priority: fields.priority.map(|p| p.name),
            time_spent_seconds: fields.timetracking.and_then(|t| t.time_spent_seconds),
        }
    }
}

/// Decodes one search hit. On failure returns the issue key (if any) for logging.
fn decode_issue(raw: serde_json::Value) -> Result<Issue, (String, serde_json::Error)> {
    let key = raw
        .get("key")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("<no key>")
        .to_string();
    serde_json::from_value::<JiraIssue>(raw)
        .map(JiraIssue::into_issue)
        .map_err(|e| (key, e))
}

/// Parses Jira's `2024-01-10T12:00:00.000+0000` as well as RFC 3339.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    parse_timestamp(&s)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", s)))
}

/// Keeps only status changes from a changelog, in timestamp order.
fn status_transitions(issue_key: &str, changelog: Changelog) -> Vec<Transition> {
    let mut transitions: Vec<Transition> = changelog
        .histories
        .into_iter()
        .flat_map(|history| {
            let author = history
                .author
                .and_then(|a| a.display_name)
                .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());
            let timestamp = history.created;
            history
                .items
                .into_iter()
                .filter(|item| item.field == "status")
                .filter_map(move |item| {
                    Some(Transition {
                        issue_key: issue_key.to_string(),
                        timestamp,
                        from_status: item.from_status,
                        to_status: item.to_status?,
                        author: author.clone(),
                    })
                })
        })
        .collect();

    // Stable: same-second changes keep changelog order.
    transitions.sort_by_key(|t| t.timestamp);
    transitions
}

#[derive(Clone)]
pub struct JiraClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Option<(String, String)>,
    page_size: u32,
}

impl JiraClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            base_url: config.jira_url.clone(),
            credentials: config.credentials(),
            page_size: config.search_page_size.max(1),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.get(&url).query(query);
        if let Some((username, token)) = &self.credentials {
            request = request.basic_auth(username, Some(token));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { url, status });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|source| FetchError::Decode { url, source })
    }
}

#[async_trait]
impl IssueTracker for JiraClient {
    async fn fetch_issues(&self, project: &ProjectKey) -> Result<FetchedIssues, FetchError> {
        if !project.is_valid() {
            return Err(FetchError::InvalidProjectKey(project.to_string()));
        }
        let jql = format!("project = '{}' ORDER BY created DESC", project);

        let count: SearchResponse = self
            .get_json(
                SEARCH_PATH,
                &[("jql", jql.clone()), ("maxResults", "0".to_string())],
            )
            .await?;
        let total = count.total;
        tracing::info!(project = %project, total, "Fetching issues");

        let mut issues: Vec<Issue> = Vec::new();
        let mut incomplete = None;
        let mut start_at: u64 = 0;

        while start_at < total {
            let page = self
                .get_json::<SearchResponse>(
                    SEARCH_PATH,
                    &[
                        ("jql", jql.clone()),
                        ("startAt", start_at.to_string()),
                        ("maxResults", self.page_size.to_string()),
                        ("fields", SEARCH_FIELDS.to_string()),
                    ],
                )
                .await;

            match page {
                Ok(page) if page.issues.is_empty() => break,
                Ok(page) => {
                    // The server may cap maxResults below what we asked for.
                    start_at += page.issues.len() as u64;
                    for raw in page.issues {
                        match decode_issue(raw) {
                            Ok(issue) => issues.push(issue),
                            Err((key, e)) => {
                                tracing::warn!(
                                    project = %project,
                                    issue = %key,
                                    "Skipping malformed issue: {}",
                                    e
                                );
                            }
                        }
                    }
                    tracing::debug!(project = %project, fetched = issues.len(), total, "Fetched page");
                }
                Err(e) => {
                    tracing::warn!(
                        project = %project,
                        fetched = issues.len(),
                        total,
                        "Search page failed, keeping partial results: {}",
                        e
                    );
                    incomplete = Some(e);
                    break;
                }
            }
        }

        Ok(FetchedIssues {
            issues,
            total,
            incomplete,
        })
    }

    async fn fetch_transitions(&self, issue_key: &str) -> Result<Vec<Transition>, FetchError> {
        // Sanitize inputs to prevent path traversal or unintended endpoint access
        let issue_key = issue_key.trim().replace("..", "").replace('/', "");

        let issue: IssueWithChangelog = self
            .get_json(
                &format!("/rest/api/2/issue/{}", issue_key),
                &[("expand", "changelog".to_string())],
            )
            .await?;

        Ok(issue
            .changelog
            .map(|changelog| status_transitions(&issue_key, changelog))
            .unwrap_or_default())
    }
}
