//! Hands each aggregate of a [`ProjectReport`] to a rendering sink.
//!
//! The core only emits plain numbers and labels; what a sink does with them
//! (charts, files, dashboards) is its own business.

use crate::aggregate::{Histogram, NamedCount, NamedHours, ProjectReport};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

const OPEN_DURATION_BINS: usize = 30;
const STATUS_TIME_BINS: usize = 20;
const LOGGED_TIME_BINS: usize = 30;

/// Receives one named artifact per aggregate.
pub trait ReportSink {
    fn emit(&mut self, name: &str, artifact: &Value) -> Result<()>;
}

#[derive(Serialize)]
struct StatusDistribution<'a> {
    status: &'a str,
    values: &'a [f64],
    histogram: Histogram,
}

#[derive(Serialize)]
struct UserDistribution<'a> {
    top_n: usize,
    assignees: &'a [NamedCount],
    reporters: &'a [NamedCount],
}

#[derive(Serialize)]
struct LoggedTime<'a> {
    by_assignee: &'a [NamedHours],
    histogram: Histogram,
}

impl ProjectReport {
    /// The report split into the artifacts a sink persists, one per aggregate.
    pub fn artifacts(&self) -> Result<Vec<(&'static str, Value)>> {
        let statuses: Vec<StatusDistribution<'_>> = self
            .status_durations
            .iter()
            .map(|(status, values)| StatusDistribution {
                status,
                values,
                histogram: Histogram::from_values(values, STATUS_TIME_BINS),
            })
            .collect();

        let logged_hours: Vec<f64> = self
            .logged_hours_by_assignee
            .iter()
            .map(|h| h.hours)
            .collect();

        Ok(vec![
            ("summary", serde_json::to_value(&self.summary)?),
            (
                "open_duration_histogram",
                json!({
                    "values": self.open_durations,
                    "histogram": Histogram::from_values(&self.open_durations, OPEN_DURATION_BINS),
                }),
            ),
            ("status_time_distribution", serde_json::to_value(statuses)?),
            ("daily_task_trend", serde_json::to_value(&self.daily_trend)?),
            (
                "user_task_distribution",
                serde_json::to_value(UserDistribution {
                    top_n: self.top_n,
                    assignees: &self.top_assignees,
                    reporters: &self.top_reporters,
                })?,
            ),
            (
                "logged_time_histogram",
                serde_json::to_value(LoggedTime {
                    by_assignee: &self.logged_hours_by_assignee,
                    histogram: Histogram::from_values(&logged_hours, LOGGED_TIME_BINS),
                })?,
            ),
            ("priority_distribution", serde_json::to_value(&self.priority_counts)?),
        ])
    }
}

/// Sends every artifact of `report` to `sink`, stopping at the first failure.
pub fn publish(report: &ProjectReport, sink: &mut dyn ReportSink) -> Result<usize> {
    let artifacts = report.artifacts()?;
    for (name, artifact) in &artifacts {
        sink.emit(name, artifact)?;
        tracing::debug!(artifact = *name, "Emitted report artifact");
    }
    Ok(artifacts.len())
}

/// Writes each artifact as pretty-printed `<name>.json` under a directory.
pub struct JsonDirSink {
    dir: PathBuf,
}

impl JsonDirSink {
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating report directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ReportSink for JsonDirSink {
    fn emit(&mut self, name: &str, artifact: &Value) -> Result<()> {
        let path = self.dir.join(format!("{}.json", name));
        let body = serde_json::to_vec_pretty(artifact)?;
        std::fs::write(&path, body).with_context(|| format!("writing {}", path.display()))?;
        tracing::info!("Saved {}", path.display());
        Ok(())
    }
}
