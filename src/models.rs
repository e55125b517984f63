// src/models.rs

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

// --- `testsuite.toml` MODELS (What is read from a suite root) ---

/// The deserialized structure of a `testsuite.toml` file.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct SuiteDescriptor {
    pub name: Option<String>,
    /// Stable identity token. Derived from the root path when absent.
    pub id: Option<String>,
    pub default_timeout_secs: Option<u64>,
    /// Values every new configuration of this suite starts from.
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
}

/// The deserialized structure of one test descriptor (`tests/**/*.toml`).
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TestDescriptor {
    pub command: String,
    pub description: Option<String>,
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub disabled: bool,
}

// --- WORK DIRECTORY MODELS (bincode, inside `.suiterun/`) ---

/// The identity record written when a work directory is created.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WorkDirRef {
    pub id: Uuid,
    pub suite_root: PathBuf,
    pub suite_id: String,
}

/// Final state of a single test after a run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TestOutcome {
    Passed,
    Failed,
    Error,
    NotRun,
}

impl TestOutcome {
    /// All outcomes, in reporting order.
    pub const ALL: [Self; 4] = [Self::Passed, Self::Failed, Self::Error, Self::NotRun];

    /// Upper-case label used in progress lines and reports.
    pub fn label(self) -> &'static str {
        match self {
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::Error => "ERROR",
            Self::NotRun => "NOT RUN",
        }
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    pub name: String,
    pub outcome: TestOutcome,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub message: Option<String>,
}

/// Everything `-run` leaves behind in `.suiterun/results.bin`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ResultsFile {
    pub suite_id: String,
    pub results: Vec<TestResult>,
}

// --- CONFIGURATION FILE MODEL (JSON) ---

/// On-disk form of a configuration. Paths are kept as written so that a file can be
/// moved together with the suite it points at.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ConfigFile {
    pub test_suite: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<PathBuf>,
    #[serde(default)]
    pub is_template: bool,
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

// --- LAUNCHER STATE MODELS ---

/// The last work directory used for each test suite, keyed by canonical suite root.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkDirHistory {
    #[serde(default)]
    pub entries: HashMap<String, PathBuf>,
}

// --- RUN STATISTICS ---

/// Cumulative outcome counts contributed by action commands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStatistics {
    counts: BTreeMap<TestOutcome, usize>,
}

impl RunStatistics {
    pub fn record(&mut self, outcome: TestOutcome) {
        *self.counts.entry(outcome).or_insert(0) += 1;
    }

    /// Adds every result of a finished run.
    pub fn record_all<'a>(&mut self, results: impl IntoIterator<Item = &'a TestResult>) {
        for result in results {
            self.record(result.outcome);
        }
    }

    pub fn count(&self, outcome: TestOutcome) -> usize {
        self.counts.get(&outcome).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Maps the counts to the launcher's exit status. Errors outrank failures.
    pub fn exit_code(&self) -> i32 {
        if self.count(TestOutcome::Error) > 0 {
            crate::constants::EXIT_ERROR
        } else if self.count(TestOutcome::Failed) > 0 {
            crate::constants::EXIT_FAILED
        } else {
            crate::constants::EXIT_OK
        }
    }
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = TestOutcome::ALL
            .iter()
            .filter(|outcome| self.count(**outcome) > 0)
            .map(|outcome| format!("{}={}", outcome.label().to_lowercase(), self.count(*outcome)))
            .collect();
        if parts.is_empty() {
            f.write_str("no tests")
        } else {
            f.write_str(&parts.join(" "))
        }
    }
}
