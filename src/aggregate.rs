//! Project-wide aggregates built from per-issue results.
//!
//! Each function here is an independent fold over the issue set. None of them
//! depends on the order in which transition fetches completed.

use crate::metrics::{classify_open_duration, TimeInStatus};
use crate::status::TerminalPredicate;
use crate::types::{Issue, ProjectKey};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

pub const UNKNOWN_PRIORITY: &str = "Unknown";
const SECONDS_PER_HOUR: f64 = 3600.0;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub created: usize,
    pub closed: usize,
    pub cumulative_created: usize,
    pub cumulative_closed: usize,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct NamedCount {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct NamedHours {
    pub name: String,
    pub hours: f64,
}

/// Equal-width histogram. `edges` has one more entry than `counts`.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Histogram {
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
}

impl Histogram {
    /// Bins `values` into `bins` equal-width buckets spanning their min..=max.
    ///
    /// The maximum lands in the last bucket. When every value is equal the
    /// range is widened by half a unit on each side.
    pub fn from_values(values: &[f64], bins: usize) -> Self {
        if values.is_empty() || bins == 0 {
            return Self {
                edges: Vec::new(),
                counts: Vec::new(),
            };
        }

        let mut min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let mut max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if min == max {
            min -= 0.5;
            max += 0.5;
        }
        let width = (max - min) / bins as f64;

        let edges = (0..=bins).map(|i| min + width * i as f64).collect();
        let mut counts = vec![0; bins];
        for value in values {
            let idx = (((value - min) / width) as usize).min(bins - 1);
            counts[idx] += 1;
        }

        Self { edges, counts }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ReportSummary {
    pub project: ProjectKey,
    pub generated_at: DateTime<Utc>,
    pub total_issues: usize,
    pub closed_issues: usize,
    /// Issues whose status history could not be fetched.
    pub transition_fetch_failures: usize,
    pub data_quality_faults: usize,
    /// True when the issue search stopped before reaching the reported total.
    pub incomplete: bool,
}

/// Every aggregate computed for one project.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ProjectReport {
    pub summary: ReportSummary,
    pub open_durations: Vec<f64>,
    pub status_durations: BTreeMap<String, Vec<f64>>,
    pub daily_trend: Vec<DailyCount>,
    pub top_n: usize,
    pub top_assignees: Vec<NamedCount>,
    pub top_reporters: Vec<NamedCount>,
    pub logged_hours_by_assignee: Vec<NamedHours>,
    pub priority_counts: Vec<NamedCount>,
}

/// Inputs to [`ProjectReport::build`] besides the issues themselves.
pub struct ReportInput<'a, P: ?Sized> {
    pub project: &'a ProjectKey,
    /// Time-in-status results keyed by issue key. Missing keys are skipped.
    pub time_in_status: &'a HashMap<String, TimeInStatus>,
    pub transition_fetch_failures: usize,
    pub incomplete: bool,
    pub terminal: &'a P,
    pub top_n: usize,
    pub now: DateTime<Utc>,
}

impl ProjectReport {
    /// Folds per-issue results into the project aggregates.
    ///
    /// Open durations, status durations and logged time only look at finished
    /// issues; the daily trend, user rankings and priorities cover everything.
    pub fn build<P>(issues: &[Issue], input: ReportInput<'_, P>) -> Self
    where
        P: TerminalPredicate + ?Sized,
    {
        let closed: Vec<&Issue> = issues
            .iter()
            .filter(|i| input.terminal.is_terminal(&i.status))
            .collect();

        let data_quality_faults = input
            .time_in_status
            .values()
            .map(|t| t.faults.len())
            .sum();

        Self {
            summary: ReportSummary {
                project: input.project.clone(),
                generated_at: input.now,
                total_issues: issues.len(),
                closed_issues: closed.len(),
                transition_fetch_failures: input.transition_fetch_failures,
                data_quality_faults,
                incomplete: input.incomplete,
            },
            open_durations: open_durations(issues, input.terminal),
            status_durations: status_durations(&closed, input.time_in_status),
            daily_trend: daily_trend(issues, input.terminal),
            top_n: input.top_n,
            top_assignees: top_n_by_count(
                issues.iter().filter_map(|i| i.assignee.as_deref()),
                input.top_n,
            ),
            top_reporters: top_n_by_count(
                issues.iter().filter_map(|i| i.reporter.as_deref()),
                input.top_n,
            ),
            logged_hours_by_assignee: logged_hours_by_assignee(&closed),
            priority_counts: priority_counts(issues),
        }
    }
}

/// Open durations (days) of the finished issues, in input order.
pub fn open_durations<P>(issues: &[Issue], terminal: &P) -> Vec<f64>
where
    P: TerminalPredicate + ?Sized,
{
    issues
        .iter()
        .filter_map(|i| {
            classify_open_duration(i.created_at, i.updated_at, &i.status, terminal).days()
        })
        .collect()
}

/// Groups per-issue time-in-status values by status name.
pub fn status_durations(
    issues: &[&Issue],
    time_in_status: &HashMap<String, TimeInStatus>,
) -> BTreeMap<String, Vec<f64>> {
    let mut by_status: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for issue in issues {
        let Some(result) = time_in_status.get(&issue.key) else {
            continue;
        };
        for (status, days) in &result.durations {
            by_status.entry(status.clone()).or_default().push(*days);
        }
    }
    by_status
}

/// Daily created/closed counts over a gap-free date range.
///
/// The range runs from the earliest to the latest date on which any issue was
/// created or closed. A finished issue counts as closed on its `updated_at` date.
pub fn daily_trend<P>(issues: &[Issue], terminal: &P) -> Vec<DailyCount>
where
    P: TerminalPredicate + ?Sized,
{
    let mut created: HashMap<NaiveDate, usize> = HashMap::new();
    let mut closed: HashMap<NaiveDate, usize> = HashMap::new();

    for issue in issues {
        *created.entry(issue.created_at.date_naive()).or_insert(0) += 1;
        if terminal.is_terminal(&issue.status) {
            *closed.entry(issue.updated_at.date_naive()).or_insert(0) += 1;
        }
    }

    let dates = created.keys().chain(closed.keys());
    let (Some(first), Some(last)) = (dates.clone().min().copied(), dates.max().copied()) else {
        return Vec::new();
    };

    let mut cumulative_created = 0;
    let mut cumulative_closed = 0;
    first
        .iter_days()
        .take_while(|date| *date <= last)
        .map(|date| {
            let created_today = created.get(&date).copied().unwrap_or(0);
            let closed_today = closed.get(&date).copied().unwrap_or(0);
            cumulative_created += created_today;
            cumulative_closed += closed_today;
            DailyCount {
                date,
                created: created_today,
                closed: closed_today,
                cumulative_created,
                cumulative_closed,
            }
        })
        .collect()
}

/// Counts names, keeping the order in which each was first seen.
fn count_first_seen<'a>(names: impl Iterator<Item = &'a str>) -> Vec<NamedCount> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<NamedCount> = Vec::new();
    for name in names {
        match index.get(name) {
            Some(&i) => counts[i].count += 1,
            None => {
                index.insert(name, counts.len());
                counts.push(NamedCount {
                    name: name.to_string(),
                    count: 1,
                });
            }
        }
    }
    counts
}

/// The `n` most frequent names. Ties keep first-seen order.
pub fn top_n_by_count<'a>(names: impl Iterator<Item = &'a str>, n: usize) -> Vec<NamedCount> {
    let mut counts = count_first_seen(names);
    // sort_by is stable
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts.truncate(n);
    counts
}

/// Logged hours per assignee, for issues that have both.
pub fn logged_hours_by_assignee(issues: &[&Issue]) -> Vec<NamedHours> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut hours: Vec<NamedHours> = Vec::new();
    for issue in issues {
        let (Some(assignee), Some(seconds)) = (issue.assignee.as_deref(), issue.time_spent_seconds)
        else {
            continue;
        };
        let logged = seconds as f64 / SECONDS_PER_HOUR;
        match index.get(assignee) {
            Some(&i) => hours[i].hours += logged,
            None => {
                index.insert(assignee, hours.len());
                hours.push(NamedHours {
                    name: assignee.to_string(),
                    hours: logged,
                });
            }
        }
    }
    hours
}

/// Issue count per priority label, "Unknown" standing in for a missing one.
pub fn priority_counts(issues: &[Issue]) -> Vec<NamedCount> {
    count_first_seen(
        issues
            .iter()
            .map(|i| i.priority.as_deref().unwrap_or(UNKNOWN_PRIORITY)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::TerminalStatuses;
    use chrono::TimeZone;

    fn at(month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, month, day, 9, 30, 0).unwrap()
    }

    fn issue(key: &str, created: DateTime<Utc>, updated: DateTime<Utc>, status: &str) -> Issue {
        Issue {
            key: key.to_string(),
            created_at: created,
            updated_at: updated,
            status: status.to_string(),
            assignee: None,
            reporter: None,
            priority: None,
            time_spent_seconds: None,
        }
    }

    #[test]
    fn test_daily_trend_has_no_gaps() {
        let issues = vec![
            issue("A-1", at(1, 1), at(1, 3), "Done"),
            issue("A-2", at(1, 1), at(1, 2), "Open"),
            issue("A-3", at(1, 6), at(1, 9), "Closed"),
        ];
        let trend = daily_trend(&issues, &TerminalStatuses::default());

        assert_eq!(trend.len(), 9);
        assert_eq!(trend[0].date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(trend[8].date, NaiveDate::from_ymd_opt(2024, 1, 9).unwrap());
        for pair in trend.windows(2) {
            assert_eq!(pair[0].date.succ_opt(), Some(pair[1].date));
            assert!(pair[1].cumulative_created >= pair[0].cumulative_created);
            assert!(pair[1].cumulative_closed >= pair[0].cumulative_closed);
        }
        assert_eq!(trend[0].created, 2);
        assert_eq!(trend[3].created, 0);
        assert_eq!(trend[3].closed, 0);
        assert_eq!(trend[8].cumulative_created, 3);
        assert_eq!(trend[8].cumulative_closed, 2);
    }

    #[test]
    fn test_daily_trend_empty() {
        assert!(daily_trend(&[], &TerminalStatuses::default()).is_empty());
    }

    #[test]
    fn test_ranking_ties_keep_first_seen_order() {
        let names = ["carol", "alice", "bob", "alice", "bob", "dave"];
        let ranked = top_n_by_count(names.into_iter(), 3);

        let order: Vec<&str> = ranked.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(order, vec!["alice", "bob", "carol"]);
        assert_eq!(ranked[0].count, 2);
        assert_eq!(ranked[2].count, 1);
    }

    #[test]
    fn test_priority_counts_unknown() {
        let mut high = issue("A-1", at(1, 1), at(1, 2), "Open");
        high.priority = Some("High".to_string());
        let issues = vec![
            issue("A-2", at(1, 1), at(1, 2), "Open"),
            high.clone(),
            high,
        ];

        let counts = priority_counts(&issues);
        assert_eq!(
            counts,
            vec![
                NamedCount { name: "Unknown".to_string(), count: 1 },
                NamedCount { name: "High".to_string(), count: 2 },
            ]
        );
    }

    #[test]
    fn test_logged_hours_skip_missing() {
        let mut a = issue("A-1", at(1, 1), at(1, 2), "Done");
        a.assignee = Some("alice".to_string());
        a.time_spent_seconds = Some(5400);
        let mut b = a.clone();
        b.time_spent_seconds = Some(1800);
        let mut no_time = a.clone();
        no_time.time_spent_seconds = None;
        let mut no_assignee = a.clone();
        no_assignee.assignee = None;

        let hours = logged_hours_by_assignee(&[&a, &b, &no_time, &no_assignee]);
        assert_eq!(hours.len(), 1);
        assert!((hours[0].hours - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_histogram_bins() {
        let hist = Histogram::from_values(&[0.0, 1.0, 2.0, 3.0, 4.0], 4);
        assert_eq!(hist.edges, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(hist.counts, vec![1, 1, 1, 2]);

        let flat = Histogram::from_values(&[2.0, 2.0], 2);
        assert_eq!(flat.counts, vec![0, 2]);

        assert!(Histogram::from_values(&[], 10).counts.is_empty());
    }

    #[test]
    fn test_build_report() {
        let terminal = TerminalStatuses::default();
        let mut done = issue("A-1", at(1, 1), at(1, 5), "Done");
        done.assignee = Some("alice".to_string());
        done.reporter = Some("bob".to_string());
        let open = issue("A-2", at(1, 2), at(1, 3), "In Progress");

        let mut time_in_status = HashMap::new();
        time_in_status.insert(
            "A-1".to_string(),
            TimeInStatus {
                durations: BTreeMap::from([("Open".to_string(), 1.5), ("Done".to_string(), 2.5)]),
                faults: Vec::new(),
            },
        );
        time_in_status.insert(
            "A-2".to_string(),
            TimeInStatus {
                durations: BTreeMap::from([("Open".to_string(), 1.0)]),
                faults: Vec::new(),
            },
        );

        let project = ProjectKey::new("A");
        let report = ProjectReport::build(
            &[done, open],
            ReportInput {
                project: &project,
                time_in_status: &time_in_status,
                transition_fetch_failures: 0,
                incomplete: false,
                terminal: &terminal,
                top_n: 5,
                now: at(2, 1),
            },
        );

        assert_eq!(report.summary.total_issues, 2);
        assert_eq!(report.summary.closed_issues, 1);
        assert_eq!(report.open_durations, vec![4.0]);
        // Only finished issues feed the status distribution.
        assert_eq!(report.status_durations["Open"], vec![1.5]);
        assert_eq!(report.status_durations["Done"], vec![2.5]);
        assert_eq!(report.top_assignees[0].name, "alice");
        assert_eq!(report.top_reporters[0].name, "bob");
        assert_eq!(report.priority_counts[0].count, 2);
        assert_eq!(report.daily_trend.len(), 5);
    }
}
