// src/core/commands.rs

//! Deferred units of work. Arguments are validated when a command is built; the
//! command runs later against a [`Session`].

use crate::constants::{KEY_CONCURRENCY, KEY_TESTS, KEY_TIMEOUT_FACTOR, LOGS_DIR};
use crate::core::backend::BackendError;
use crate::core::configuration::{self, ValueError};
use crate::core::fault::ConfigFault;
use crate::core::paths::{self, PathError};
use crate::core::session::Session;
use crate::dev_utils::BlockTimer;
use crate::models::{ResultsFile, RunStatistics};
use crate::system::report::{self, ReportError};
use crate::system::test_runner::{self, RunPlan, RunnerError};
use colored::*;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure of a single command.
#[derive(Error, Debug)]
pub enum CommandError {
    /// Resolution or input conflict.
    #[error(transparent)]
    Config(#[from] ConfigFault),

    /// Rejected configuration value.
    #[error(transparent)]
    InvalidValue(#[from] ValueError),

    /// A path argument could not be expanded.
    #[error("Invalid path for {command}")]
    Path {
        command: &'static str,
        #[source]
        source: PathError,
    },

    /// A required argument is missing.
    #[error("{command} expects {expected}.")]
    MissingArgument {
        command: &'static str,
        expected: &'static str,
    },

    /// The path is none of the things `-open` accepts.
    #[error("'{}' is not a test suite, work directory or configuration file.", path.display())]
    CannotOpen { path: PathBuf },

    /// The command needs a work directory and none is bound.
    #[error("No work directory: use -workdir or -create-workdir to choose one.")]
    NoWorkDirectory,

    /// `-report` found nothing to report.
    #[error("Work directory '{}' has no test results yet.", work_dir.display())]
    NoResults { work_dir: PathBuf },

    /// Storage failure.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The test run itself failed.
    #[error(transparent)]
    Runner(#[from] RunnerError),

    /// Writing the report failed.
    #[error(transparent)]
    Report(#[from] ReportError),
}

/// Payload of `-testsuite`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSuiteCommand {
    path: PathBuf,
}

/// Payload of `-workdir` and `-create-workdir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDirCommand {
    path: PathBuf,
    create: bool,
}

/// Payload of `-config`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigCommand {
    path: PathBuf,
}

/// Payload of `-open`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenCommand {
    path: PathBuf,
}

/// Payload of `-set`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCommand {
    key: String,
    value: String,
}

/// Payload of `-concurrency`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcurrencyCommand {
    value: usize,
}

/// Payload of `-timeout-factor`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeoutFactorCommand {
    value: f64,
}

/// Payload of `-tests`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestsCommand {
    patterns: Vec<String>,
}

/// Payload of `-run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTestsCommand;

/// Payload of `-write-config`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteConfigCommand {
    path: PathBuf,
}

/// Payload of `-report`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportCommand {
    path: Option<PathBuf>,
}

/// One queued command, carrying its validated payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `-testsuite <path>`
    TestSuite(TestSuiteCommand),
    /// `-workdir <path>` or `-create-workdir <path>`
    WorkDir(WorkDirCommand),
    /// `-config <path>`
    Config(ConfigCommand),
    /// `-open <path>`
    Open(OpenCommand),
    /// `-set <key> <value>`
    Set(SetCommand),
    /// `-concurrency <n>`
    Concurrency(ConcurrencyCommand),
    /// `-timeout-factor <x>`
    TimeoutFactor(TimeoutFactorCommand),
    /// `-tests <pattern>...`
    Tests(TestsCommand),
    /// `-run`
    RunTests(RunTestsCommand),
    /// `-write-config <path>`
    WriteConfig(WriteConfigCommand),
    /// `-report [path]`
    Report(ReportCommand),
}

fn expand(command: &'static str, raw: &str) -> Result<PathBuf, CommandError> {
    paths::expand_path(raw).map_err(|source| CommandError::Path { command, source })
}

impl Command {
    /// `-testsuite`, with `raw` expanded.
    pub fn test_suite(raw: &str) -> Result<Self, CommandError> {
        Ok(Self::TestSuite(TestSuiteCommand {
            path: expand("-testsuite", raw)?,
        }))
    }

    /// `create` allows a new work directory to be created at `raw`.
    pub fn work_dir(raw: &str, create: bool) -> Result<Self, CommandError> {
        let name = if create { "-create-workdir" } else { "-workdir" };
        Ok(Self::WorkDir(WorkDirCommand {
            path: expand(name, raw)?,
            create,
        }))
    }

    /// `-config`, with `raw` expanded.
    pub fn config(raw: &str) -> Result<Self, CommandError> {
        Ok(Self::Config(ConfigCommand {
            path: expand("-config", raw)?,
        }))
    }

    /// `-open`, with `raw` expanded.
    pub fn open(raw: &str) -> Result<Self, CommandError> {
        Ok(Self::Open(OpenCommand {
            path: expand("-open", raw)?,
        }))
    }

    /// `-set`; the value is checked against the key's rules.
    pub fn set(key: &str, value: &str) -> Result<Self, CommandError> {
        configuration::validate_value(key, value)?;
        Ok(Self::Set(SetCommand {
            key: key.to_string(),
            value: value.to_string(),
        }))
    }

    /// `-concurrency`, checked against the allowed range.
    pub fn concurrency(raw: &str) -> Result<Self, CommandError> {
        Ok(Self::Concurrency(ConcurrencyCommand {
            value: configuration::parse_concurrency(raw)?,
        }))
    }

    /// `-timeout-factor`, which must be a positive number.
    pub fn timeout_factor(raw: &str) -> Result<Self, CommandError> {
        Ok(Self::TimeoutFactor(TimeoutFactorCommand {
            value: configuration::parse_timeout_factor(raw)?,
        }))
    }

    /// `-tests`; every pattern must compile.
    pub fn tests(patterns: &[String]) -> Result<Self, CommandError> {
        if patterns.is_empty() {
            return Err(CommandError::MissingArgument {
                command: "-tests",
                expected: "at least one pattern",
            });
        }
        configuration::compile_patterns(&patterns.join(" "))?;
        Ok(Self::Tests(TestsCommand {
            patterns: patterns.to_vec(),
        }))
    }

    /// `-run`.
    pub fn run_tests() -> Self {
        Self::RunTests(RunTestsCommand)
    }

    /// `-write-config`, with `raw` expanded.
    pub fn write_config(raw: &str) -> Result<Self, CommandError> {
        Ok(Self::WriteConfig(WriteConfigCommand {
            path: expand("-write-config", raw)?,
        }))
    }

    /// `-report`; a path also gets a JSON copy of the report.
    pub fn report(raw: Option<&str>) -> Result<Self, CommandError> {
        let path = raw.map(|r| expand("-report", r)).transpose()?;
        Ok(Self::Report(ReportCommand { path }))
    }

    /// The command-line name of this command.
    pub fn name(&self) -> &'static str {
        match self {
            Self::TestSuite(_) => "-testsuite",
            Self::WorkDir(WorkDirCommand { create: true, .. }) => "-create-workdir",
            Self::WorkDir(_) => "-workdir",
            Self::Config(_) => "-config",
            Self::Open(_) => "-open",
            Self::Set(_) => "-set",
            Self::Concurrency(_) => "-concurrency",
            Self::TimeoutFactor(_) => "-timeout-factor",
            Self::Tests(_) => "-tests",
            Self::RunTests(_) => "-run",
            Self::WriteConfig(_) => "-write-config",
            Self::Report(_) => "-report",
        }
    }

    /// Action commands do substantive work; the others only adjust configuration state.
    pub fn is_action(&self) -> bool {
        match self {
            Self::RunTests(_) | Self::WriteConfig(_) | Self::Report(_) => true,
            Self::TestSuite(_)
            | Self::WorkDir(_)
            | Self::Config(_)
            | Self::Open(_)
            | Self::Set(_)
            | Self::Concurrency(_)
            | Self::TimeoutFactor(_)
            | Self::Tests(_) => false,
        }
    }

    /// Runs the command against `session`.
    pub fn execute(&self, session: &mut Session) -> Result<(), CommandError> {
        log::debug!("Executing {}", self);
        match self {
            Self::TestSuite(cmd) => set_test_suite(session, &cmd.path),
            Self::WorkDir(cmd) => Ok(session
                .resolver_mut()
                .set_work_dir_path(cmd.path.clone(), cmd.create)?),
            Self::Config(cmd) => Ok(session
                .resolver_mut()
                .set_config_file_path(cmd.path.clone())?),
            Self::Open(cmd) => open(session, &cmd.path),
            Self::Set(cmd) => set_value(session, &cmd.key, &cmd.value),
            Self::Concurrency(cmd) => set_value(session, KEY_CONCURRENCY, &cmd.value.to_string()),
            Self::TimeoutFactor(cmd) => {
                set_value(session, KEY_TIMEOUT_FACTOR, &cmd.value.to_string())
            }
            Self::Tests(cmd) => set_value(session, KEY_TESTS, &cmd.patterns.join(" ")),
            Self::RunTests(_) => run_tests(session),
            Self::WriteConfig(cmd) => write_config(session, &cmd.path),
            Self::Report(cmd) => show_report(session, cmd.path.as_deref()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())?;
        match self {
            Self::TestSuite(TestSuiteCommand { path })
            | Self::WorkDir(WorkDirCommand { path, .. })
            | Self::Config(ConfigCommand { path })
            | Self::Open(OpenCommand { path })
            | Self::WriteConfig(WriteConfigCommand { path })
            | Self::Report(ReportCommand { path: Some(path) }) => {
                write!(f, " {}", path.display())
            }
            Self::Set(cmd) => write!(f, " {} {}", cmd.key, cmd.value),
            Self::Concurrency(cmd) => write!(f, " {}", cmd.value),
            Self::TimeoutFactor(cmd) => write!(f, " {}", cmd.value),
            Self::Tests(cmd) => write!(f, " {}", cmd.patterns.join(" ")),
            Self::RunTests(_) | Self::Report(ReportCommand { path: None }) => Ok(()),
        }
    }
}

/// Records the suite and offers its last work directory as the default.
fn set_test_suite(session: &mut Session, path: &Path) -> Result<(), CommandError> {
    session.resolver_mut().set_test_suite_path(path.to_path_buf())?;
    if !session.settings().remember_work_dirs {
        return Ok(());
    }
    let hint = session
        .history()
        .and_then(|history| history.last_work_dir(path))
        .map(Path::to_path_buf);
    if let Some(hint) = hint {
        log::debug!("Last work directory for this suite: '{}'", hint.display());
        session.resolver_mut().set_default_work_dir_path(Some(hint));
    }
    Ok(())
}

/// Decides at execution time what kind of location `path` is.
fn open(session: &mut Session, path: &Path) -> Result<(), CommandError> {
    let backend = session.resolver().backend();
    let is_suite = backend.is_test_suite(path);
    let is_work_dir = backend.is_work_directory(path);

    if is_suite {
        set_test_suite(session, path)
    } else if is_work_dir {
        Ok(session
            .resolver_mut()
            .set_work_dir_path(path.to_path_buf(), false)?)
    } else if path.is_file() {
        Ok(session
            .resolver_mut()
            .set_config_file_path(path.to_path_buf())?)
    } else {
        Err(CommandError::CannotOpen {
            path: path.to_path_buf(),
        })
    }
}

fn set_value(session: &mut Session, key: &str, value: &str) -> Result<(), CommandError> {
    session
        .resolver_mut()
        .configuration_mut()?
        .set_value(key, value)?;
    Ok(())
}

fn run_tests(session: &mut Session) -> Result<(), CommandError> {
    let settings = session.settings().clone();
    let config = session.resolver_mut().configuration()?;
    let work_dir = config
        .work_directory()
        .cloned()
        .ok_or(CommandError::NoWorkDirectory)?;
    let suite = config.test_suite().clone();
    let patterns = config.test_patterns()?;
    let concurrency = config.concurrency().unwrap_or(settings.default_concurrency);
    let timeout_factor = config.timeout_factor().unwrap_or(1.0);

    let tests = test_runner::select_tests(suite.discover_tests()?, &patterns);
    println!(
        "{}",
        format!(
            t!("run.info.starting"),
            count = tests.len(),
            suite = suite.name(),
            work_dir = work_dir.root().display()
        )
        .bold()
    );

    let plan = RunPlan {
        suite_root: suite.root().to_path_buf(),
        work_dir: work_dir.root().to_path_buf(),
        tests,
        concurrency,
        timeout_factor,
        default_timeout_secs: suite
            .default_timeout_secs()
            .unwrap_or(settings.default_timeout_secs),
        log_dir: Some(work_dir.meta_dir().join(LOGS_DIR)),
    };
    let results = {
        let _timer = BlockTimer::new("test run");
        test_runner::run_plan(&plan)?
    };
    report::print_results(&results);

    let mut run_statistics = RunStatistics::default();
    run_statistics.record_all(&results);
    report::print_summary(&run_statistics);
    session.statistics_mut().record_all(&results);

    work_dir.write_results(&ResultsFile {
        suite_id: suite.id().as_str().to_string(),
        results,
    })?;
    session
        .resolver_mut()
        .configuration()?
        .write_to(&work_dir.config_path())?;

    if settings.remember_work_dirs {
        if let Some(history) = session.history_mut() {
            history.record(suite.root(), work_dir.root());
        }
    }
    Ok(())
}

fn write_config(session: &mut Session, path: &Path) -> Result<(), CommandError> {
    session.resolver_mut().configuration()?.write_to(path)?;
    println!(
        "{}",
        format!(t!("config.success.written"), path = path.display()).green()
    );
    Ok(())
}

fn show_report(session: &mut Session, path: Option<&Path>) -> Result<(), CommandError> {
    let config = session.resolver_mut().configuration()?;
    let work_dir = config
        .work_directory()
        .cloned()
        .ok_or(CommandError::NoWorkDirectory)?;
    let suite = config.test_suite().clone();
    let results = work_dir
        .read_results()?
        .ok_or_else(|| CommandError::NoResults {
            work_dir: work_dir.root().to_path_buf(),
        })?;

    println!(
        "{}",
        format!(t!("report.info.header"), suite = suite.name()).bold()
    );
    report::print_results(&results.results);
    report::print_summary(&report::statistics_of(&results));

    if let Some(path) = path {
        report::write_json_report(path, &suite, &work_dir, &results)?;
        println!(
            "{}",
            format!(t!("report.success.written"), path = path.display()).green()
        );
    }
    Ok(())
}
