// src/system/report.rs

use crate::core::suite::{TestSuite, WorkDirectory};
use crate::models::{ResultsFile, RunStatistics, TestOutcome, TestResult};
use colored::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to serialize the report: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to write report '{path}'")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The JSON document written by `-report <path>`.
#[derive(Serialize, Debug)]
struct JsonReport<'a> {
    suite_id: &'a str,
    suite_name: &'a str,
    suite_root: &'a Path,
    work_dir: &'a Path,
    summary: BTreeMap<&'static str, usize>,
    results: &'a [TestResult],
}

fn colored_label(outcome: TestOutcome) -> ColoredString {
    let label = format!("{:<7}", outcome.label());
    match outcome {
        TestOutcome::Passed => label.green(),
        TestOutcome::Failed => label.red(),
        TestOutcome::Error => label.red().bold(),
        TestOutcome::NotRun => label.dimmed(),
    }
}

pub fn print_result(result: &TestResult) {
    let detail = result
        .message
        .as_deref()
        .map(|m| format!(" ({})", m).dimmed().to_string())
        .unwrap_or_default();
    println!(
        "  {} {} {}{}",
        colored_label(result.outcome),
        result.name,
        format!("[{} ms]", result.duration_ms).dimmed(),
        detail
    );
}

pub fn print_results(results: &[TestResult]) {
    for result in results {
        print_result(result);
    }
}

pub fn print_summary(statistics: &RunStatistics) {
    let line = format!(t!("report.info.summary"), summary = statistics);
    let styled = match statistics.exit_code() {
        crate::constants::EXIT_OK => line.green().bold(),
        _ => line.red().bold(),
    };
    println!("\n{}", styled);
}

/// Statistics over a stored results file.
pub fn statistics_of(results: &ResultsFile) -> RunStatistics {
    let mut statistics = RunStatistics::default();
    statistics.record_all(&results.results);
    statistics
}

pub fn write_json_report(
    path: &Path,
    suite: &TestSuite,
    work_dir: &WorkDirectory,
    results: &ResultsFile,
) -> Result<(), ReportError> {
    let statistics = statistics_of(results);
    let summary = TestOutcome::ALL
        .iter()
        .map(|outcome| (outcome.label(), statistics.count(*outcome)))
        .collect();
    let report = JsonReport {
        suite_id: suite.id().as_str(),
        suite_name: suite.name(),
        suite_root: suite.root(),
        work_dir: work_dir.root(),
        summary,
        results: &results.results,
    };
    let json = serde_json::to_string_pretty(&report)?;
    fs::write(path, json).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })
}
