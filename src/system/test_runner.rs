// src/system/test_runner.rs

use crate::constants::{ENV_SUITE_ROOT, ENV_TEST_NAME, ENV_WORK_DIR};
use crate::core::suite::TestCase;
use crate::models::{TestOutcome, TestResult};
use crate::system::executor::{self, ExecutionError};
use rayon::prelude::*;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Failed to start the test worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Could not prepare log directory '{path}'")]
    LogDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Everything needed to run a selection of tests.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub suite_root: PathBuf,
    pub work_dir: PathBuf,
    pub tests: Vec<TestCase>,
    pub concurrency: usize,
    pub timeout_factor: f64,
    /// Applied to tests that declare no timeout of their own.
    pub default_timeout_secs: u64,
    /// One `<test>.log` per test is written here when set.
    pub log_dir: Option<PathBuf>,
}

/// Keeps the tests whose name matches at least one pattern. No patterns keeps everything.
pub fn select_tests(tests: Vec<TestCase>, patterns: &[Regex]) -> Vec<TestCase> {
    if patterns.is_empty() {
        return tests;
    }
    tests
        .into_iter()
        .filter(|case| patterns.iter().any(|p| p.is_match(&case.name)))
        .collect()
}

/// Runs every test of the plan on a pool of `concurrency` threads. Results keep the
/// order of `plan.tests`.
pub fn run_plan(plan: &RunPlan) -> Result<Vec<TestResult>, RunnerError> {
    if let Some(dir) = &plan.log_dir {
        fs::create_dir_all(dir).map_err(|source| RunnerError::LogDir {
            path: dir.clone(),
            source,
        })?;
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(plan.concurrency.max(1))
        .thread_name(|i| format!("suiterun-worker-{}", i))
        .build()?;

    log::info!(
        "Running {} test(s) with concurrency {}",
        plan.tests.len(),
        plan.concurrency
    );
    Ok(pool.install(|| {
        plan.tests
            .par_iter()
            .map(|case| run_one(plan, case))
            .collect()
    }))
}

fn run_one(plan: &RunPlan, case: &TestCase) -> TestResult {
    if case.descriptor.disabled {
        log::trace!("Skipping disabled test '{}'", case.name);
        return TestResult {
            name: case.name.clone(),
            outcome: TestOutcome::NotRun,
            exit_code: None,
            duration_ms: 0,
            message: Some("disabled".to_string()),
        };
    }

    let base_secs = case
        .descriptor
        .timeout_secs
        .unwrap_or(plan.default_timeout_secs);
    // Out-of-range products (overflow) run without a limit.
    let timeout = Duration::try_from_secs_f64(base_secs as f64 * plan.timeout_factor).ok();

    let mut env = HashMap::new();
    env.insert(ENV_TEST_NAME.to_string(), case.name.clone());
    env.insert(ENV_WORK_DIR.to_string(), plan.work_dir.display().to_string());
    env.insert(ENV_SUITE_ROOT.to_string(), plan.suite_root.display().to_string());

    let log_path = plan.log_dir.as_deref().map(|dir| log_file_for(dir, &case.name));

    log::trace!("Starting test '{}': {}", case.name, case.descriptor.command);
    let started = Instant::now();
    let result = executor::run_test_command(
        &case.descriptor.command,
        &plan.suite_root,
        &env,
        timeout,
        log_path.as_deref(),
    );
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let (outcome, exit_code, message) = classify(result);
    log::trace!("Test '{}' finished: {}", case.name, outcome);
    TestResult {
        name: case.name.clone(),
        outcome,
        exit_code,
        duration_ms,
        message,
    }
}

fn classify(
    result: Result<Option<i32>, ExecutionError>,
) -> (TestOutcome, Option<i32>, Option<String>) {
    match result {
        Ok(Some(0)) => (TestOutcome::Passed, Some(0), None),
        Ok(Some(code)) => (
            TestOutcome::Failed,
            Some(code),
            Some(format!("exit code {}", code)),
        ),
        Ok(None) => (
            TestOutcome::Failed,
            None,
            Some("terminated by signal".to_string()),
        ),
        Err(e) => (TestOutcome::Error, None, Some(e.to_string())),
    }
}

fn log_file_for(dir: &Path, test_name: &str) -> PathBuf {
    dir.join(format!("{}.log", test_name.replace('/', "__")))
}
