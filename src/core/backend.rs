// src/core/backend.rs

//! The storage collaborator the resolver talks to.
//!
//! [`SuiteBackend`] is the narrow contract the resolution engine needs from whatever
//! stores test suites, work directories and configurations. [`FsBackend`] is the
//! filesystem implementation shipped with the launcher.

use crate::constants::CONFIG_FILE_EXTENSION;
use crate::core::configuration::{Configuration, ValueError};
use crate::core::paths;
use crate::core::properties;
use crate::core::suite::{SuiteId, TestSuite, WorkDirectory};
use crate::models::ConfigFile;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("I/O error on '{path}'")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{path}' is not a test suite (no testsuite.toml found).")]
    NotATestSuite { path: PathBuf },

    #[error("'{path}' is not a work directory.")]
    NotAWorkDirectory { path: PathBuf },

    #[error("'{path}' exists and is not an empty directory.")]
    DirectoryNotEmpty { path: PathBuf },

    #[error("Failed to parse '{path}'")]
    TomlParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration file '{path}'")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to decode '{path}'")]
    BincodeDecode {
        path: PathBuf,
        #[source]
        source: bincode::error::DecodeError,
    },

    #[error("Failed to encode binary data: {0}")]
    BincodeEncode(#[from] bincode::error::EncodeError),

    #[error("Failed to write file atomically: {0}")]
    TempFile(#[from] tempfile::PersistError),

    #[error("Malformed properties file '{path}' at line {line}: {reason}")]
    MalformedProperties {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error(transparent)]
    InvalidValue(#[from] ValueError),

    #[error("Work directory '{work_dir}' belongs to test suite '{found}', expected '{expected}'.")]
    WorkDirSuiteMismatch {
        work_dir: PathBuf,
        found: SuiteId,
        expected: SuiteId,
    },

    #[error("Configuration '{config}' belongs to test suite '{found}', expected '{expected}'.")]
    ConfigSuiteMismatch {
        config: PathBuf,
        found: SuiteId,
        expected: SuiteId,
    },

    #[error("Configuration file '{path}' not found.")]
    ConfigNotFound { path: PathBuf },

    #[error("Nothing to open: no test suite, work directory or configuration was given.")]
    NothingToOpen,
}

/// What the resolution engine needs from the storage of suites, work directories and
/// configurations.
pub trait SuiteBackend: Send {
    fn is_test_suite(&self, path: &Path) -> bool;

    fn open_test_suite(&self, path: &Path) -> Result<Arc<TestSuite>, BackendError>;

    fn is_work_directory(&self, path: &Path) -> bool;

    /// True only for a directory that exists and has no entries.
    fn is_empty_directory(&self, path: &Path) -> bool;

    fn create_work_directory(
        &self,
        path: &Path,
        suite: Arc<TestSuite>,
    ) -> Result<Arc<WorkDirectory>, BackendError>;

    fn open_work_directory(&self, path: &Path) -> Result<Arc<WorkDirectory>, BackendError>;

    /// Opens whatever combination of suite, work directory and configuration file was
    /// given, checking that they agree with each other.
    fn open_combined(
        &self,
        test_suite: Option<&Path>,
        work_dir: Option<&Path>,
        config_file: Option<&Path>,
    ) -> Result<Configuration, BackendError>;

    fn create_empty_configuration(
        &self,
        suite: Arc<TestSuite>,
    ) -> Result<Configuration, BackendError>;

    /// True when `path` names a configuration file rather than bootstrap properties.
    fn is_configuration_file(&self, path: &Path) -> bool;

    /// Opens a configuration file that must belong to `suite`. The result is not bound
    /// to a work directory yet.
    fn open_configuration_file(
        &self,
        path: &Path,
        suite: &Arc<TestSuite>,
    ) -> Result<Configuration, BackendError>;

    /// The test suite a configuration file names, without opening it.
    fn configuration_suite_path(&self, path: &Path) -> Result<PathBuf, BackendError>;

    fn read_bootstrap_properties(
        &self,
        path: &Path,
    ) -> Result<BTreeMap<String, String>, BackendError>;

    fn stored_template_ref(&self, work_dir: &WorkDirectory)
    -> Result<Option<PathBuf>, BackendError>;

    fn set_stored_template_ref(
        &self,
        work_dir: &WorkDirectory,
        template: &Path,
    ) -> Result<(), BackendError>;

    /// Derives a configuration from the template at `path`, or `None` when there is no
    /// such template.
    fn load_from_template(
        &self,
        path: &Path,
        base: &Configuration,
    ) -> Result<Option<Configuration>, BackendError>;
}

/// The on-disk backend: `testsuite.toml` suites, `.suiterun/` work directories and JSON
/// configuration files.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsBackend;

impl FsBackend {
    pub fn new() -> Self {
        Self
    }

    fn read_config_file(&self, path: &Path) -> Result<ConfigFile, BackendError> {
        if !path.is_file() {
            return Err(BackendError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = fs::read_to_string(path).map_err(|source| BackendError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| BackendError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads a configuration file and the suite it names.
    fn load_config(&self, path: &Path) -> Result<(ConfigFile, Arc<TestSuite>), BackendError> {
        let file = self.read_config_file(path)?;
        let suite_path = paths::resolve_relative_to_file(path, &file.test_suite);
        let suite = self.open_test_suite(&suite_path)?;
        Ok((file, suite))
    }

    fn ensure_same_suite_for_work_dir(
        work_dir: &WorkDirectory,
        expected: &TestSuite,
    ) -> Result<(), BackendError> {
        if work_dir.test_suite().id() != expected.id() {
            return Err(BackendError::WorkDirSuiteMismatch {
                work_dir: work_dir.root().to_path_buf(),
                found: work_dir.test_suite().id().clone(),
                expected: expected.id().clone(),
            });
        }
        Ok(())
    }

    fn open_with_config_file(
        &self,
        config_path: &Path,
        test_suite: Option<&Path>,
        work_dir: Option<&Path>,
    ) -> Result<Configuration, BackendError> {
        let (file, suite) = self.load_config(config_path)?;

        if let Some(ts_path) = test_suite {
            let explicit = self.open_test_suite(ts_path)?;
            if explicit.id() != suite.id() {
                return Err(BackendError::ConfigSuiteMismatch {
                    config: config_path.to_path_buf(),
                    found: suite.id().clone(),
                    expected: explicit.id().clone(),
                });
            }
        }

        let work_dir = match (work_dir, file.work_dir.as_ref()) {
            (Some(explicit), _) => Some(self.open_work_directory(explicit)?),
            (None, Some(recorded)) => {
                let recorded = paths::resolve_relative_to_file(config_path, recorded);
                match self.open_work_directory(&recorded) {
                    Ok(wd) => Some(wd),
                    Err(e) => {
                        log::warn!(
                            "Ignoring work directory '{}' recorded in '{}': {}",
                            recorded.display(),
                            config_path.display(),
                            e
                        );
                        None
                    }
                }
            }
            (None, None) => None,
        };

        let mut config = Configuration::from_file(file, suite.clone(), config_path)?;
        if let Some(wd) = work_dir {
            Self::ensure_same_suite_for_work_dir(&wd, &suite)?;
            config.bind_work_directory(wd)?;
        }
        Ok(config)
    }

    fn open_with_work_dir(
        &self,
        work_dir_path: &Path,
        test_suite: Option<&Path>,
    ) -> Result<Configuration, BackendError> {
        let work_dir = self.open_work_directory(work_dir_path)?;
        if let Some(ts_path) = test_suite {
            let explicit = self.open_test_suite(ts_path)?;
            Self::ensure_same_suite_for_work_dir(&work_dir, &explicit)?;
        }

        let suite = work_dir.test_suite().clone();
        let stored = work_dir.config_path();
        let mut config = if stored.is_file() {
            log::debug!("Reusing stored configuration '{}'", stored.display());
            let file = self.read_config_file(&stored)?;
            Configuration::from_file(file, suite, &stored)?
        } else {
            Configuration::create_empty(suite)?
        };
        config.bind_work_directory(work_dir)?;
        Ok(config)
    }
}

impl SuiteBackend for FsBackend {
    fn is_test_suite(&self, path: &Path) -> bool {
        TestSuite::is_suite_root(path)
    }

    fn open_test_suite(&self, path: &Path) -> Result<Arc<TestSuite>, BackendError> {
        TestSuite::open(path).map(Arc::new)
    }

    fn is_work_directory(&self, path: &Path) -> bool {
        WorkDirectory::is_work_dir(path)
    }

    fn is_empty_directory(&self, path: &Path) -> bool {
        path.is_dir()
            && fs::read_dir(path)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false)
    }

    fn create_work_directory(
        &self,
        path: &Path,
        suite: Arc<TestSuite>,
    ) -> Result<Arc<WorkDirectory>, BackendError> {
        WorkDirectory::create(path, suite).map(Arc::new)
    }

    fn open_work_directory(&self, path: &Path) -> Result<Arc<WorkDirectory>, BackendError> {
        WorkDirectory::open(path).map(Arc::new)
    }

    fn open_combined(
        &self,
        test_suite: Option<&Path>,
        work_dir: Option<&Path>,
        config_file: Option<&Path>,
    ) -> Result<Configuration, BackendError> {
        match (config_file, work_dir, test_suite) {
            (Some(cfg), wd, ts) => self.open_with_config_file(cfg, ts, wd),
            (None, Some(wd), ts) => self.open_with_work_dir(wd, ts),
            (None, None, Some(ts)) => {
                let suite = self.open_test_suite(ts)?;
                self.create_empty_configuration(suite)
            }
            (None, None, None) => Err(BackendError::NothingToOpen),
        }
    }

    fn create_empty_configuration(
        &self,
        suite: Arc<TestSuite>,
    ) -> Result<Configuration, BackendError> {
        Ok(Configuration::create_empty(suite)?)
    }

    fn is_configuration_file(&self, path: &Path) -> bool {
        path.extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(CONFIG_FILE_EXTENSION))
    }

    fn open_configuration_file(
        &self,
        path: &Path,
        suite: &Arc<TestSuite>,
    ) -> Result<Configuration, BackendError> {
        let (file, named) = self.load_config(path)?;
        if named.id() != suite.id() {
            return Err(BackendError::ConfigSuiteMismatch {
                config: path.to_path_buf(),
                found: named.id().clone(),
                expected: suite.id().clone(),
            });
        }
        Ok(Configuration::from_file(file, suite.clone(), path)?)
    }

    fn configuration_suite_path(&self, path: &Path) -> Result<PathBuf, BackendError> {
        let file = self.read_config_file(path)?;
        Ok(paths::resolve_relative_to_file(path, &file.test_suite))
    }

    fn read_bootstrap_properties(
        &self,
        path: &Path,
    ) -> Result<BTreeMap<String, String>, BackendError> {
        properties::load_properties(path)
    }

    fn stored_template_ref(
        &self,
        work_dir: &WorkDirectory,
    ) -> Result<Option<PathBuf>, BackendError> {
        work_dir.read_template_ref()
    }

    fn set_stored_template_ref(
        &self,
        work_dir: &WorkDirectory,
        template: &Path,
    ) -> Result<(), BackendError> {
        work_dir.write_template_ref(template)
    }

    fn load_from_template(
        &self,
        path: &Path,
        base: &Configuration,
    ) -> Result<Option<Configuration>, BackendError> {
        if !path.is_file() {
            log::debug!("Template '{}' does not exist.", path.display());
            return Ok(None);
        }
        let (file, suite) = self.load_config(path)?;
        if suite.id() != base.test_suite().id() {
            return Err(BackendError::ConfigSuiteMismatch {
                config: path.to_path_buf(),
                found: suite.id().clone(),
                expected: base.test_suite().id().clone(),
            });
        }
        if !file.is_template {
            log::warn!("'{}' is used as a template but is not marked as one.", path.display());
        }
        Ok(Some(base.derive_from_template(path, &file.values)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::{write_config, write_suite, write_work_dir};
    use tempfile::TempDir;

    #[test]
    fn test_open_combined_with_nothing_fails() {
        assert!(matches!(
            FsBackend.open_combined(None, None, None),
            Err(BackendError::NothingToOpen)
        ));
    }

    #[test]
    fn test_open_combined_work_dir_derives_suite() {
        let tmp = TempDir::new().unwrap();
        let ts = write_suite(tmp.path(), "ts", None);
        let wd = write_work_dir(&ts, &tmp.path().join("wd"));

        let config = FsBackend.open_combined(None, Some(&wd), None).unwrap();
        assert_eq!(
            config.test_suite().root(),
            dunce::canonicalize(&ts).unwrap().as_path()
        );
        assert!(config.work_directory().is_some());
    }

    #[test]
    fn test_open_combined_rejects_work_dir_of_other_suite() {
        let tmp = TempDir::new().unwrap();
        let ts = write_suite(tmp.path(), "ts", None);
        let other = write_suite(tmp.path(), "other", None);
        let wd = write_work_dir(&other, &tmp.path().join("wd"));

        assert!(matches!(
            FsBackend.open_combined(Some(&ts), Some(&wd), None),
            Err(BackendError::WorkDirSuiteMismatch { .. })
        ));
    }

    #[test]
    fn test_open_combined_rejects_config_of_other_suite() {
        let tmp = TempDir::new().unwrap();
        let ts = write_suite(tmp.path(), "ts", None);
        let other = write_suite(tmp.path(), "other", None);
        let cfg = write_config(tmp.path(), "cfg.json", &other, &[], None);

        assert!(matches!(
            FsBackend.open_combined(Some(&ts), None, Some(&cfg)),
            Err(BackendError::ConfigSuiteMismatch { .. })
        ));
    }

    #[test]
    fn test_open_combined_reuses_stored_work_dir_configuration() {
        let tmp = TempDir::new().unwrap();
        let ts = write_suite(tmp.path(), "ts", None);
        let wd_path = write_work_dir(&ts, &tmp.path().join("wd"));

        let mut first = FsBackend.open_combined(None, Some(&wd_path), None).unwrap();
        first.set_value("concurrency", "5").unwrap();
        let stored = first.work_directory().unwrap().config_path();
        first.save(&stored).unwrap();

        let second = FsBackend.open_combined(None, Some(&wd_path), None).unwrap();
        assert_eq!(second.concurrency(), Some(5));
        assert_eq!(second.source_file(), Some(stored.as_path()));
    }

    #[test]
    fn test_is_empty_directory() {
        let tmp = TempDir::new().unwrap();
        assert!(FsBackend.is_empty_directory(tmp.path()));
        assert!(!FsBackend.is_empty_directory(&tmp.path().join("missing")));
        std::fs::write(tmp.path().join("f"), "x").unwrap();
        assert!(!FsBackend.is_empty_directory(tmp.path()));
    }

    #[test]
    fn test_load_from_template_missing_file_is_none() {
        let tmp = TempDir::new().unwrap();
        let ts = write_suite(tmp.path(), "ts", None);
        let base = FsBackend.open_combined(Some(&ts), None, None).unwrap();
        let loaded = FsBackend
            .load_from_template(&tmp.path().join("nope.json"), &base)
            .unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_is_configuration_file_by_extension() {
        assert!(FsBackend.is_configuration_file(Path::new("run.json")));
        assert!(FsBackend.is_configuration_file(Path::new("RUN.JSON")));
        assert!(!FsBackend.is_configuration_file(Path::new("cfg.properties")));
        assert!(!FsBackend.is_configuration_file(Path::new("cfg")));
    }
}
