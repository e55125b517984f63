// src/core/inputs.rs

use crate::core::configuration::Configuration;
use crate::core::fault::ConfigFault;
use std::path::{Path, PathBuf};

/// Not-yet-validated references collected from commands before resolution.
///
/// The three location fields are set-once: a second, different value is rejected and the
/// same value again is a no-op. Nothing here touches the filesystem; paths are compared
/// as given.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PendingInputs {
    test_suite_path: Option<PathBuf>,
    work_dir_path: Option<PathBuf>,
    config_file_path: Option<PathBuf>,
    default_work_dir_path: Option<PathBuf>,
    auto_create_work_dir: bool,
}

impl PendingInputs {
    /// Empty inputs.
    pub fn new() -> Self {
        Self::default()
    }

    /// The test suite path, if given.
    pub fn test_suite_path(&self) -> Option<&Path> {
        self.test_suite_path.as_deref()
    }

    /// The work directory path, if given.
    pub fn work_dir_path(&self) -> Option<&Path> {
        self.work_dir_path.as_deref()
    }

    /// The configuration file path, if given.
    pub fn config_file_path(&self) -> Option<&Path> {
        self.config_file_path.as_deref()
    }

    /// Work directory remembered from an earlier run.
    pub fn default_work_dir_path(&self) -> Option<&Path> {
        self.default_work_dir_path.as_deref()
    }

    /// Whether a missing work directory may be created.
    pub fn auto_create_work_dir(&self) -> bool {
        self.auto_create_work_dir
    }

    /// Records the test suite path. Returns whether anything changed.
    pub fn set_test_suite_path(&mut self, path: PathBuf) -> Result<bool, ConfigFault> {
        match &self.test_suite_path {
            Some(current) if *current != path => Err(ConfigFault::TestSuiteAlreadySet {
                current: current.clone(),
                requested: path,
            }),
            Some(_) => Ok(false),
            None => {
                log::debug!("Test suite path set to '{}'", path.display());
                self.test_suite_path = Some(path);
                Ok(true)
            }
        }
    }

    /// Records the work directory path. Setting the same path again may still turn
    /// auto-creation on, which counts as a change.
    pub fn set_work_dir_path(&mut self, path: PathBuf, auto_create: bool) -> Result<bool, ConfigFault> {
        match &self.work_dir_path {
            Some(current) if *current != path => Err(ConfigFault::WorkDirAlreadySet {
                current: current.clone(),
                requested: path,
            }),
            Some(_) => {
                let turned_on = auto_create && !self.auto_create_work_dir;
                self.auto_create_work_dir |= auto_create;
                Ok(turned_on)
            }
            None => {
                log::debug!(
                    "Work directory path set to '{}' (auto-create: {})",
                    path.display(),
                    auto_create
                );
                self.work_dir_path = Some(path);
                self.auto_create_work_dir = auto_create;
                Ok(true)
            }
        }
    }

    /// Set-once check only. Rejecting paths once a configuration exists is the resolver's
    /// job, since only it knows.
    pub fn set_config_file_path(&mut self, path: PathBuf) -> Result<bool, ConfigFault> {
        match &self.config_file_path {
            Some(current) if *current != path => Err(ConfigFault::ConfigAlreadySet {
                current: Some(current.clone()),
                requested: path,
            }),
            Some(_) => Ok(false),
            None => {
                log::debug!("Configuration file path set to '{}'", path.display());
                self.config_file_path = Some(path);
                Ok(true)
            }
        }
    }

    /// The hint is not set-once; the latest one wins.
    pub fn set_default_work_dir_path(&mut self, path: Option<PathBuf>) -> bool {
        if self.default_work_dir_path == path {
            return false;
        }
        self.default_work_dir_path = path;
        true
    }

    /// True when any of the three location inputs is set.
    pub fn has_any(&self) -> bool {
        self.test_suite_path.is_some()
            || self.work_dir_path.is_some()
            || self.config_file_path.is_some()
    }

    /// Fills the location fields that are still unset from a resolved configuration.
    pub fn backfill(&mut self, config: &Configuration) {
        if self.test_suite_path.is_none() {
            self.test_suite_path = Some(config.test_suite().root().to_path_buf());
        }
        if self.work_dir_path.is_none() {
            self.work_dir_path = config.work_directory().map(|wd| wd.root().to_path_buf());
        }
        if self.config_file_path.is_none() {
            self.config_file_path = config.source_file().map(Path::to_path_buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_once_rejects_different_values() {
        let mut inputs = PendingInputs::new();
        inputs.set_test_suite_path("/ts/a".into()).unwrap();
        inputs.set_work_dir_path("/wd/a".into(), false).unwrap();
        inputs.set_config_file_path("a.json".into()).unwrap();

        assert!(matches!(
            inputs.set_test_suite_path("/ts/b".into()),
            Err(ConfigFault::TestSuiteAlreadySet { .. })
        ));
        assert!(matches!(
            inputs.set_work_dir_path("/wd/b".into(), true),
            Err(ConfigFault::WorkDirAlreadySet { .. })
        ));
        assert!(matches!(
            inputs.set_config_file_path("b.json".into()),
            Err(ConfigFault::ConfigAlreadySet { .. })
        ));

        assert_eq!(inputs.test_suite_path(), Some(Path::new("/ts/a")));
        assert!(!inputs.auto_create_work_dir());
    }

    #[test]
    fn test_set_once_accepts_identical_values() {
        let mut inputs = PendingInputs::new();
        assert!(inputs.set_test_suite_path("/ts/a".into()).unwrap());
        assert!(inputs.set_config_file_path("a.json".into()).unwrap());
        assert!(!inputs.set_test_suite_path("/ts/a".into()).unwrap());
        assert!(!inputs.set_config_file_path("a.json".into()).unwrap());

        assert!(inputs.set_work_dir_path("/wd".into(), false).unwrap());
        assert!(inputs.set_work_dir_path("/wd".into(), true).unwrap());
        assert!(!inputs.set_work_dir_path("/wd".into(), true).unwrap());
        assert!(inputs.auto_create_work_dir());
    }

    #[test]
    fn test_conflict_reports_previous_value() {
        let mut inputs = PendingInputs::new();
        inputs.set_test_suite_path("/ts/a".into()).unwrap();
        match inputs.set_test_suite_path("/ts/b".into()) {
            Err(ConfigFault::TestSuiteAlreadySet { current, requested }) => {
                assert_eq!(current, PathBuf::from("/ts/a"));
                assert_eq!(requested, PathBuf::from("/ts/b"));
            }
            other => unreachable!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_default_hint_is_not_an_input() {
        let mut inputs = PendingInputs::new();
        assert!(inputs.set_default_work_dir_path(Some("/wd/old".into())));
        assert!(inputs.set_default_work_dir_path(Some("/wd/new".into())));
        assert!(!inputs.set_default_work_dir_path(Some("/wd/new".into())));
        assert!(!inputs.has_any());
        assert_eq!(inputs.default_work_dir_path(), Some(Path::new("/wd/new")));
    }
}
