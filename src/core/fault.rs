// src/core/fault.rs

use crate::core::backend::BackendError;
use crate::core::suite::SuiteId;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Which input a test suite path came from, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathOrigin {
    /// Given directly as the test suite path.
    TestSuitePath,
    /// Read from the `TESTSUITE` key (or `test_suite` field) of this file.
    ConfigFile(PathBuf),
}

impl fmt::Display for PathOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TestSuitePath => f.write_str("the test suite path"),
            Self::ConfigFile(path) => write!(f, "configuration file '{}'", path.display()),
        }
    }
}

/// Faults raised while collecting inputs and resolving them into a configuration.
#[derive(Error, Debug)]
pub enum ConfigFault {
    // --- Conflicting inputs ---
    /// A different test suite path was already given.
    #[error("Test suite already set to '{}', cannot change it to '{}'.", current.display(), requested.display())]
    TestSuiteAlreadySet { current: PathBuf, requested: PathBuf },

    /// A different work directory path was already given.
    #[error("Work directory already set to '{}', cannot change it to '{}'.", current.display(), requested.display())]
    WorkDirAlreadySet { current: PathBuf, requested: PathBuf },

    /// A configuration was already given or resolved.
    #[error("{}", config_already_set_message(.current.as_deref(), .requested))]
    ConfigAlreadySet {
        /// `None` when the configuration was supplied directly rather than by path.
        current: Option<PathBuf>,
        requested: PathBuf,
    },

    // --- Missing inputs ---
    /// Nothing names a test suite.
    #[error("No test suite given: set a test suite, a work directory or a configuration file.")]
    NoTestSuite,

    /// A bootstrap file lacks the `TESTSUITE` key.
    #[error("Configuration file '{}' does not name a test suite.", path.display())]
    NoTestSuiteInConfigFile { path: PathBuf },

    // --- Lookup / open ---
    /// The test suite path does not denote a suite.
    #[error("Cannot find test suite '{}' (from {origin}).", path.display())]
    CantFindTestSuite { path: PathBuf, origin: PathOrigin },

    /// The test suite exists but could not be opened.
    #[error("Cannot open test suite '{}' (from {origin}).", path.display())]
    CantOpenTestSuite {
        path: PathBuf,
        origin: PathOrigin,
        #[source]
        source: BackendError,
    },

    /// The configuration file does not exist.
    #[error("Cannot find configuration file '{}'.", path.display())]
    CantFindConfig { path: PathBuf },

    /// The configuration file could not be read or parsed.
    #[error("Cannot read configuration file '{}'.", path.display())]
    CantReadConfig {
        path: PathBuf,
        #[source]
        source: BackendError,
    },

    /// The configuration file was read but is not usable.
    #[error("Cannot open configuration file '{}'.", path.display())]
    CantOpenConfig {
        path: PathBuf,
        #[source]
        source: BackendError,
    },

    /// An empty configuration could not be created.
    #[error("Cannot create a configuration for test suite '{suite}'.")]
    CantCreateConfig {
        suite: SuiteId,
        #[source]
        source: BackendError,
    },

    /// The work directory does not exist.
    #[error("Cannot find work directory '{}'.", path.display())]
    CantFindWorkDir {
        path: PathBuf,
        #[source]
        source: Option<BackendError>,
    },

    /// The work directory could not be created.
    #[error("Cannot create work directory '{}'.", path.display())]
    CantCreateWorkDir {
        path: PathBuf,
        #[source]
        source: BackendError,
    },

    /// Any other failure while opening the given combination.
    #[error("Cannot initialize the configuration.")]
    CantInitConfig(#[source] BackendError),

    // --- Template enrichment (reported as warnings) ---
    /// A new work directory could not remember its template. Reported as a warning.
    #[error("Cannot record template '{}' in work directory '{}'.", template.display(), work_dir.display())]
    CantWriteTemplateRef {
        work_dir: PathBuf,
        template: PathBuf,
        #[source]
        source: BackendError,
    },

    /// The stored template could not be applied. Reported as a warning.
    #[error("Cannot load template '{}'.", path.display())]
    CantLoadTemplate {
        path: PathBuf,
        #[source]
        source: BackendError,
    },

    // --- Consistency ---
    /// The work directory belongs to another test suite.
    #[error("Work directory '{}' belongs to test suite '{found}', not '{expected}'.", work_dir.display())]
    WorkDirTestSuiteMismatch {
        work_dir: PathBuf,
        found: SuiteId,
        expected: SuiteId,
    },

    /// The configuration belongs to another test suite.
    #[error("Configuration belongs to test suite '{found}', not '{expected}'.")]
    ConfigTestSuiteMismatch { found: SuiteId, expected: SuiteId },

    /// The configuration is bound to another work directory.
    #[error("Configuration is bound to work directory '{}', not '{}'.", current.display(), requested.display())]
    ConfigWorkDirMismatch { current: PathBuf, requested: PathBuf },

    // --- Resolution state ---
    /// Resolution was requested while one is running.
    #[error("Configuration resolution is already in progress.")]
    ResolutionInProgress,

    /// An earlier attempt failed and no input has changed since.
    #[error("Configuration resolution failed earlier: {reason}")]
    ResolutionFailed { reason: String },
}

fn config_already_set_message(current: Option<&Path>, requested: &Path) -> String {
    match current {
        Some(current) => format!(
            "Configuration already set to '{}', cannot change it to '{}'.",
            current.display(),
            requested.display()
        ),
        None => format!(
            "A configuration is already in use, cannot open '{}'.",
            requested.display()
        ),
    }
}

impl ConfigFault {
    /// Maps a failure of the combined open routine. Consistency and lookup problems keep
    /// their own kind; everything else becomes `CantInitConfig`.
    pub fn from_open_failure(error: BackendError) -> Self {
        match error {
            BackendError::WorkDirSuiteMismatch {
                work_dir,
                found,
                expected,
            } => Self::WorkDirTestSuiteMismatch {
                work_dir,
                found,
                expected,
            },
            BackendError::ConfigSuiteMismatch {
                found, expected, ..
            } => Self::ConfigTestSuiteMismatch { found, expected },
            BackendError::NotAWorkDirectory { path } => {
                let source = Some(BackendError::NotAWorkDirectory { path: path.clone() });
                Self::CantFindWorkDir { path, source }
            }
            BackendError::NotATestSuite { path } => Self::CantFindTestSuite {
                path,
                origin: PathOrigin::TestSuitePath,
            },
            BackendError::ConfigNotFound { path } => Self::CantFindConfig { path },
            BackendError::NothingToOpen => Self::NoTestSuite,
            other => Self::CantInitConfig(other),
        }
    }

    /// True for the faults raised when a set-once input receives a second, different value.
    pub fn is_conflicting_input(&self) -> bool {
        matches!(
            self,
            Self::TestSuiteAlreadySet { .. }
                | Self::WorkDirAlreadySet { .. }
                | Self::ConfigAlreadySet { .. }
        )
    }

    /// True for the faults raised when two resolved entities disagree.
    pub fn is_consistency(&self) -> bool {
        matches!(
            self,
            Self::WorkDirTestSuiteMismatch { .. }
                | Self::ConfigTestSuiteMismatch { .. }
                | Self::ConfigWorkDirMismatch { .. }
        )
    }
}
