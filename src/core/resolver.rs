// src/core/resolver.rs

//! Lazy resolution of pending inputs into one consistent configuration.
//!
//! The resolver owns the [`PendingInputs`] collected from commands and turns them into a
//! [`Configuration`] on first read. Either a new (or empty) work directory is bootstrapped
//! for a suite, or the existing suite / work directory / configuration combination is
//! opened through the backend. A failure leaves no configuration behind.

use crate::constants::BOOTSTRAP_TESTSUITE_KEY;
use crate::core::backend::{BackendError, SuiteBackend};
use crate::core::configuration::Configuration;
use crate::core::fault::{ConfigFault, PathOrigin};
use crate::core::inputs::PendingInputs;
use crate::core::paths;
use crate::core::suite::{TestSuite, WorkDirectory};
use crate::dev_utils::BlockTimer;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where the resolver stands.
#[derive(Debug)]
pub enum ResolutionState {
    /// Nothing resolved yet; the next read resolves.
    Unresolved,
    /// A resolution is running.
    Resolving,
    /// The resolved configuration.
    Resolved(Configuration),
    /// Holds the message of the fault that ended the last attempt.
    Failed(String),
}

/// A successful resolution, before it is committed.
struct Resolution {
    configuration: Configuration,
    warnings: Vec<ConfigFault>,
}

/// Owns the pending inputs and the configuration they resolve into.
pub struct Resolver {
    backend: Box<dyn SuiteBackend>,
    inputs: PendingInputs,
    state: ResolutionState,
    warnings: Vec<ConfigFault>,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("inputs", &self.inputs)
            .field("state", &self.state)
            .field("warnings", &self.warnings)
            .finish_non_exhaustive()
    }
}

impl Resolver {
    /// A resolver with no inputs, reading through `backend`.
    pub fn new(backend: Box<dyn SuiteBackend>) -> Self {
        Self {
            backend,
            inputs: PendingInputs::new(),
            state: ResolutionState::Unresolved,
            warnings: Vec::new(),
        }
    }

    /// The storage collaborator.
    pub fn backend(&self) -> &dyn SuiteBackend {
        self.backend.as_ref()
    }

    /// The inputs collected so far.
    pub fn inputs(&self) -> &PendingInputs {
        &self.inputs
    }

    /// Where resolution stands.
    pub fn state(&self) -> &ResolutionState {
        &self.state
    }

    /// True once a configuration exists.
    pub fn is_resolved(&self) -> bool {
        matches!(self.state, ResolutionState::Resolved(_))
    }

    /// The configuration, if one has been resolved already. Never triggers resolution.
    pub fn resolved(&self) -> Option<&Configuration> {
        match &self.state {
            ResolutionState::Resolved(config) => Some(config),
            _ => None,
        }
    }

    /// Non-fatal problems met while resolving (template handling).
    pub fn warnings(&self) -> &[ConfigFault] {
        &self.warnings
    }

    /// Returns the collected warnings and clears them.
    pub fn take_warnings(&mut self) -> Vec<ConfigFault> {
        std::mem::take(&mut self.warnings)
    }

    /// True when any location input was given or a configuration already exists.
    pub fn has_configuration_inputs(&self) -> bool {
        self.inputs.has_any() || self.is_resolved()
    }

    // --- Input setters ---

    /// A failed resolution becomes retryable once any input changes.
    fn input_changed(&mut self) {
        if let ResolutionState::Failed(_) = self.state {
            log::debug!("Inputs changed after a failed resolution; resolution will be retried.");
            self.state = ResolutionState::Unresolved;
        }
    }

    /// Records the test suite path.
    pub fn set_test_suite_path(&mut self, path: PathBuf) -> Result<(), ConfigFault> {
        if self.inputs.set_test_suite_path(path)? {
            self.input_changed();
        }
        Ok(())
    }

    /// Records the work directory path. When the configuration is already resolved
    /// without a work directory, the directory is opened (or created) and bound now; if
    /// that fails the path is not kept.
    pub fn set_work_dir_path(&mut self, path: PathBuf, auto_create: bool) -> Result<(), ConfigFault> {
        let previous = self.inputs.clone();
        if self.inputs.set_work_dir_path(path.clone(), auto_create)? {
            self.input_changed();
        }

        let unbound_suite = match &self.state {
            ResolutionState::Resolved(config) if config.work_directory().is_none() => {
                Some(config.test_suite().clone())
            }
            _ => None,
        };
        if let Some(suite) = unbound_suite {
            let bound = self
                .open_or_create_work_dir(&path, auto_create, &suite)
                .and_then(|work_dir| self.set_resolved_work_directory(work_dir));
            if let Err(fault) = bound {
                log::debug!("Late work directory binding failed; forgetting '{}'", path.display());
                self.inputs = previous;
                return Err(fault);
            }
        }
        Ok(())
    }

    /// Always rejected once a configuration exists, whatever the path.
    pub fn set_config_file_path(&mut self, path: PathBuf) -> Result<(), ConfigFault> {
        if self.is_resolved() {
            return Err(ConfigFault::ConfigAlreadySet {
                current: self.inputs.config_file_path().map(Path::to_path_buf),
                requested: path,
            });
        }
        if self.inputs.set_config_file_path(path)? {
            self.input_changed();
        }
        Ok(())
    }

    /// Replaces the work directory hint remembered from earlier runs.
    pub fn set_default_work_dir_path(&mut self, path: Option<PathBuf>) {
        if self.inputs.set_default_work_dir_path(path) {
            self.input_changed();
        }
    }

    /// Adopts a configuration built elsewhere.
    ///
    /// With no configuration yet, `config` is taken as is. Otherwise it must belong to the
    /// same test suite; the existing work directory carries over when `config` has none,
    /// and a different one is rejected. The replaced configuration is disposed before
    /// `config` takes its place.
    pub fn set_resolved_configuration(&mut self, mut config: Configuration) -> Result<(), ConfigFault> {
        match std::mem::replace(&mut self.state, ResolutionState::Unresolved) {
            ResolutionState::Resolved(existing) => {
                let carried = match Self::check_replacement(&existing, &config) {
                    Ok(carried) => carried,
                    Err(fault) => {
                        self.state = ResolutionState::Resolved(existing);
                        return Err(fault);
                    }
                };
                if let Some(work_dir) = carried {
                    if let Err(e) = config.bind_work_directory(work_dir) {
                        self.state = ResolutionState::Resolved(existing);
                        return Err(ConfigFault::from_open_failure(e));
                    }
                }
                log::debug!(
                    "Replacing configuration {} with {}",
                    existing.id(),
                    config.id()
                );
                existing.dispose();
            }
            ResolutionState::Resolving => {
                self.state = ResolutionState::Resolving;
                return Err(ConfigFault::ResolutionInProgress);
            }
            ResolutionState::Unresolved | ResolutionState::Failed(_) => {
                log::debug!("Adopting configuration {} directly", config.id());
            }
        }
        self.inputs.backfill(&config);
        self.state = ResolutionState::Resolved(config);
        Ok(())
    }

    /// The work directory to carry over into `replacement`, if any.
    fn check_replacement(
        existing: &Configuration,
        replacement: &Configuration,
    ) -> Result<Option<Arc<WorkDirectory>>, ConfigFault> {
        if existing.test_suite().id() != replacement.test_suite().id() {
            return Err(ConfigFault::ConfigTestSuiteMismatch {
                found: replacement.test_suite().id().clone(),
                expected: existing.test_suite().id().clone(),
            });
        }
        match (existing.work_directory(), replacement.work_directory()) {
            (Some(current), Some(requested)) if !current.same_as(requested) => {
                Err(ConfigFault::ConfigWorkDirMismatch {
                    current: current.root().to_path_buf(),
                    requested: requested.root().to_path_buf(),
                })
            }
            (Some(current), None) => Ok(Some(current.clone())),
            _ => Ok(None),
        }
    }

    /// Binds an opened work directory. Without a configuration, an empty one is created
    /// for the work directory's suite.
    pub fn set_resolved_work_directory(&mut self, work_dir: Arc<WorkDirectory>) -> Result<(), ConfigFault> {
        if let ResolutionState::Resolved(config) = &mut self.state {
            if config.test_suite().id() != work_dir.test_suite().id() {
                return Err(ConfigFault::WorkDirTestSuiteMismatch {
                    work_dir: work_dir.root().to_path_buf(),
                    found: work_dir.test_suite().id().clone(),
                    expected: config.test_suite().id().clone(),
                });
            }
            if let Some(current) = config.work_directory() {
                if current.same_as(&work_dir) {
                    return Ok(());
                }
                return Err(ConfigFault::WorkDirAlreadySet {
                    current: current.root().to_path_buf(),
                    requested: work_dir.root().to_path_buf(),
                });
            }
            config
                .bind_work_directory(work_dir)
                .map_err(ConfigFault::from_open_failure)?;
            self.inputs.backfill(config);
            return Ok(());
        }
        if let ResolutionState::Resolving = self.state {
            return Err(ConfigFault::ResolutionInProgress);
        }

        let suite = work_dir.test_suite().clone();
        let mut config = self
            .backend
            .create_empty_configuration(suite.clone())
            .map_err(|source| ConfigFault::CantCreateConfig {
                suite: suite.id().clone(),
                source,
            })?;
        config
            .bind_work_directory(work_dir)
            .map_err(ConfigFault::from_open_failure)?;
        self.inputs.backfill(&config);
        self.state = ResolutionState::Resolved(config);
        Ok(())
    }

    // --- Accessors that trigger resolution ---

    /// The configuration, resolving it first if needed.
    pub fn configuration(&mut self) -> Result<&Configuration, ConfigFault> {
        self.resolve()?;
        match &self.state {
            ResolutionState::Resolved(config) => Ok(config),
            _ => Err(ConfigFault::ResolutionInProgress),
        }
    }

    /// Mutable access to the configuration, resolving it first if needed.
    pub fn configuration_mut(&mut self) -> Result<&mut Configuration, ConfigFault> {
        self.resolve()?;
        match &mut self.state {
            ResolutionState::Resolved(config) => Ok(config),
            _ => Err(ConfigFault::ResolutionInProgress),
        }
    }

    /// The test suite of the resolved configuration.
    pub fn test_suite(&mut self) -> Result<Arc<TestSuite>, ConfigFault> {
        Ok(self.configuration()?.test_suite().clone())
    }

    /// The work directory of the resolved configuration, if it has one.
    pub fn work_directory(&mut self) -> Result<Option<Arc<WorkDirectory>>, ConfigFault> {
        Ok(self.configuration()?.work_directory().cloned())
    }

    /// Resolves the pending inputs unless that already happened. A failed attempt is not
    /// retried until an input changes.
    pub fn resolve(&mut self) -> Result<(), ConfigFault> {
        match &self.state {
            ResolutionState::Resolved(_) => return Ok(()),
            ResolutionState::Resolving => return Err(ConfigFault::ResolutionInProgress),
            ResolutionState::Failed(reason) => {
                return Err(ConfigFault::ResolutionFailed {
                    reason: reason.clone(),
                });
            }
            ResolutionState::Unresolved => {}
        }

        self.state = ResolutionState::Resolving;
        let result = {
            let _timer = BlockTimer::new("configuration resolution");
            self.compute()
        };

        match result {
            Ok(Resolution {
                configuration,
                warnings,
            }) => {
                self.inputs.backfill(&configuration);
                self.warnings.extend(warnings);
                log::debug!(
                    "Resolved configuration {} for test suite '{}'",
                    configuration.id(),
                    configuration.test_suite().name()
                );
                self.state = ResolutionState::Resolved(configuration);
                Ok(())
            }
            Err(fault) => {
                log::debug!("Resolution failed: {}", fault);
                self.state = ResolutionState::Failed(fault.to_string());
                Err(fault)
            }
        }
    }

    fn compute(&self) -> Result<Resolution, ConfigFault> {
        let test_suite = self.inputs.test_suite_path();
        let config_file = self.inputs.config_file_path();
        let work_dir = match self.inputs.work_dir_path() {
            Some(path) => Some(path.to_path_buf()),
            None => self.adopt_default_work_dir(),
        };

        match work_dir {
            Some(wd)
                if self.inputs.auto_create_work_dir() || self.backend.is_empty_directory(&wd) =>
            {
                log::debug!("Bootstrapping work directory '{}'", wd.display());
                self.bootstrap(&wd, test_suite, config_file)
            }
            wd => {
                log::debug!("Opening existing state");
                self.open_existing(test_suite, wd.as_deref(), config_file)
            }
        }
    }

    /// The default work directory, when a suite is known and the hint still denotes a
    /// work directory.
    fn adopt_default_work_dir(&self) -> Option<PathBuf> {
        self.inputs.test_suite_path()?;
        let hint = self.inputs.default_work_dir_path()?;
        if self.backend.is_work_directory(hint) {
            log::debug!("Reusing work directory '{}'", hint.display());
            Some(hint.to_path_buf())
        } else {
            log::debug!(
                "Ignoring default work directory '{}': not a work directory",
                hint.display()
            );
            None
        }
    }

    fn bootstrap(
        &self,
        work_dir_path: &Path,
        test_suite: Option<&Path>,
        config_file: Option<&Path>,
    ) -> Result<Resolution, ConfigFault> {
        let mut warnings = Vec::new();

        let properties = match config_file {
            Some(cfg) if !self.backend.is_configuration_file(cfg) => Some(
                self.backend
                    .read_bootstrap_properties(cfg)
                    .map_err(|source| ConfigFault::CantReadConfig {
                        path: cfg.to_path_buf(),
                        source,
                    })?,
            ),
            _ => None,
        };

        let (suite_path, origin) = match (test_suite, config_file) {
            (Some(ts), _) => (ts.to_path_buf(), PathOrigin::TestSuitePath),
            (None, None) => return Err(ConfigFault::NoTestSuite),
            (None, Some(cfg)) => (
                self.suite_path_from_config(cfg, properties.as_ref())?,
                PathOrigin::ConfigFile(cfg.to_path_buf()),
            ),
        };

        if !self.backend.is_test_suite(&suite_path) {
            return Err(ConfigFault::CantFindTestSuite {
                path: suite_path,
                origin,
            });
        }
        let suite = self.backend.open_test_suite(&suite_path).map_err(|source| {
            ConfigFault::CantOpenTestSuite {
                path: suite_path.clone(),
                origin: origin.clone(),
                source,
            }
        })?;

        // Everything that can be rejected is checked before the directory is touched.
        let mut config = match (config_file, &properties) {
            (Some(cfg), None) => self
                .backend
                .open_configuration_file(cfg, &suite)
                .map_err(|source| open_config_fault(cfg, source))?,
            _ => {
                let mut config = self
                    .backend
                    .create_empty_configuration(suite.clone())
                    .map_err(|source| ConfigFault::CantCreateConfig {
                        suite: suite.id().clone(),
                        source,
                    })?;
                if let (Some(cfg), Some(props)) = (config_file, &properties) {
                    config
                        .load_overrides(props, cfg)
                        .map_err(|e| ConfigFault::CantOpenConfig {
                            path: cfg.to_path_buf(),
                            source: e.into(),
                        })?;
                }
                config
            }
        };

        let work_dir = self
            .backend
            .create_work_directory(work_dir_path, suite.clone())
            .map_err(|source| ConfigFault::CantCreateWorkDir {
                path: work_dir_path.to_path_buf(),
                source,
            })?;
        config
            .bind_work_directory(work_dir.clone())
            .map_err(ConfigFault::from_open_failure)?;

        if let Some(template) = config.template().map(Path::to_path_buf) {
            if let Err(source) = self.backend.set_stored_template_ref(&work_dir, &template) {
                let fault = ConfigFault::CantWriteTemplateRef {
                    work_dir: work_dir.root().to_path_buf(),
                    template,
                    source,
                };
                log::warn!("{}", fault);
                warnings.push(fault);
            }
        }

        Ok(Resolution {
            configuration: config,
            warnings,
        })
    }

    /// The test suite named by a bootstrap properties file or a configuration file.
    fn suite_path_from_config(
        &self,
        config_file: &Path,
        properties: Option<&BTreeMap<String, String>>,
    ) -> Result<PathBuf, ConfigFault> {
        match properties {
            Some(props) => {
                let raw = props
                    .get(BOOTSTRAP_TESTSUITE_KEY)
                    .map(|value| value.trim())
                    .filter(|value| !value.is_empty())
                    .ok_or_else(|| ConfigFault::NoTestSuiteInConfigFile {
                        path: config_file.to_path_buf(),
                    })?;
                Ok(paths::resolve_relative_to_file(config_file, Path::new(raw)))
            }
            None => self
                .backend
                .configuration_suite_path(config_file)
                .map_err(|source| match source {
                    BackendError::ConfigNotFound { path } => ConfigFault::CantFindConfig { path },
                    source => ConfigFault::CantReadConfig {
                        path: config_file.to_path_buf(),
                        source,
                    },
                }),
        }
    }

    fn open_existing(
        &self,
        test_suite: Option<&Path>,
        work_dir: Option<&Path>,
        config_file: Option<&Path>,
    ) -> Result<Resolution, ConfigFault> {
        let mut config = self
            .backend
            .open_combined(test_suite, work_dir, config_file)
            .map_err(|error| match (error, test_suite, config_file) {
                (BackendError::NotATestSuite { path }, None, Some(cfg)) => {
                    ConfigFault::CantFindTestSuite {
                        path,
                        origin: PathOrigin::ConfigFile(cfg.to_path_buf()),
                    }
                }
                (error, _, _) => ConfigFault::from_open_failure(error),
            })?;

        let mut warnings = Vec::new();
        if config.template().is_none() {
            if let Some(enriched) = self.apply_stored_template(&config, &mut warnings) {
                config = enriched;
            }
        }

        Ok(Resolution {
            configuration: config,
            warnings,
        })
    }

    /// Applies the template remembered by the work directory. Problems become warnings.
    fn apply_stored_template(
        &self,
        config: &Configuration,
        warnings: &mut Vec<ConfigFault>,
    ) -> Option<Configuration> {
        let work_dir = config.work_directory()?;
        let template = match self.backend.stored_template_ref(work_dir) {
            Ok(Some(template)) => template,
            Ok(None) => return None,
            Err(source) => {
                let fault = ConfigFault::CantLoadTemplate {
                    path: work_dir.root().to_path_buf(),
                    source,
                };
                log::warn!("{}", fault);
                warnings.push(fault);
                return None;
            }
        };

        let source = match self.backend.load_from_template(&template, config) {
            Ok(Some(derived)) => {
                log::debug!("Applied stored template '{}'", template.display());
                return Some(derived);
            }
            Ok(None) => BackendError::ConfigNotFound {
                path: template.clone(),
            },
            Err(source) => source,
        };
        let fault = ConfigFault::CantLoadTemplate {
            path: template,
            source,
        };
        log::warn!("{}", fault);
        warnings.push(fault);
        None
    }

    fn open_or_create_work_dir(
        &self,
        path: &Path,
        auto_create: bool,
        suite: &Arc<TestSuite>,
    ) -> Result<Arc<WorkDirectory>, ConfigFault> {
        if self.backend.is_work_directory(path) {
            return self
                .backend
                .open_work_directory(path)
                .map_err(ConfigFault::from_open_failure);
        }
        if auto_create || self.backend.is_empty_directory(path) {
            return self
                .backend
                .create_work_directory(path, suite.clone())
                .map_err(|source| ConfigFault::CantCreateWorkDir {
                    path: path.to_path_buf(),
                    source,
                });
        }
        Err(ConfigFault::CantFindWorkDir {
            path: path.to_path_buf(),
            source: None,
        })
    }

    /// Disposes the resolved configuration, if any.
    pub fn dispose(&mut self) {
        match std::mem::replace(&mut self.state, ResolutionState::Unresolved) {
            ResolutionState::Resolved(config) => config.dispose(),
            other => self.state = other,
        }
    }
}

/// Failure to open a named configuration file against a new work directory.
fn open_config_fault(path: &Path, source: BackendError) -> ConfigFault {
    match source {
        BackendError::ConfigNotFound { .. } | BackendError::Io { .. } | BackendError::Json { .. } => {
            ConfigFault::CantReadConfig {
                path: path.to_path_buf(),
                source,
            }
        }
        BackendError::ConfigSuiteMismatch {
            found, expected, ..
        } => ConfigFault::ConfigTestSuiteMismatch { found, expected },
        source => ConfigFault::CantOpenConfig {
            path: path.to_path_buf(),
            source,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backend::FsBackend;
    use crate::core::test_support::{
        canonical, fs_resolver, write_config, write_properties, write_suite,
        write_suite_with_defaults, write_work_dir,
    };
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// A filesystem backend whose work directories refuse to remember templates.
    struct ReadOnlyTemplateRefs(FsBackend);

    impl SuiteBackend for ReadOnlyTemplateRefs {
        fn is_test_suite(&self, path: &Path) -> bool {
            self.0.is_test_suite(path)
        }

        fn open_test_suite(&self, path: &Path) -> Result<Arc<TestSuite>, BackendError> {
            self.0.open_test_suite(path)
        }

        fn is_work_directory(&self, path: &Path) -> bool {
            self.0.is_work_directory(path)
        }

        fn is_empty_directory(&self, path: &Path) -> bool {
            self.0.is_empty_directory(path)
        }

        fn create_work_directory(
            &self,
            path: &Path,
            suite: Arc<TestSuite>,
        ) -> Result<Arc<WorkDirectory>, BackendError> {
            self.0.create_work_directory(path, suite)
        }

        fn open_work_directory(&self, path: &Path) -> Result<Arc<WorkDirectory>, BackendError> {
            self.0.open_work_directory(path)
        }

        fn open_combined(
            &self,
            test_suite: Option<&Path>,
            work_dir: Option<&Path>,
            config_file: Option<&Path>,
        ) -> Result<Configuration, BackendError> {
            self.0.open_combined(test_suite, work_dir, config_file)
        }

        fn create_empty_configuration(
            &self,
            suite: Arc<TestSuite>,
        ) -> Result<Configuration, BackendError> {
            self.0.create_empty_configuration(suite)
        }

        fn is_configuration_file(&self, path: &Path) -> bool {
            self.0.is_configuration_file(path)
        }

        fn open_configuration_file(
            &self,
            path: &Path,
            suite: &Arc<TestSuite>,
        ) -> Result<Configuration, BackendError> {
            self.0.open_configuration_file(path, suite)
        }

        fn configuration_suite_path(&self, path: &Path) -> Result<PathBuf, BackendError> {
            self.0.configuration_suite_path(path)
        }

        fn read_bootstrap_properties(
            &self,
            path: &Path,
        ) -> Result<BTreeMap<String, String>, BackendError> {
            self.0.read_bootstrap_properties(path)
        }

        fn stored_template_ref(
            &self,
            work_dir: &WorkDirectory,
        ) -> Result<Option<PathBuf>, BackendError> {
            self.0.stored_template_ref(work_dir)
        }

        fn set_stored_template_ref(
            &self,
            work_dir: &WorkDirectory,
            _template: &Path,
        ) -> Result<(), BackendError> {
            Err(BackendError::Io {
                path: work_dir.meta_dir(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            })
        }

        fn load_from_template(
            &self,
            path: &Path,
            base: &Configuration,
        ) -> Result<Option<Configuration>, BackendError> {
            self.0.load_from_template(path, base)
        }
    }

    #[test]
    fn test_set_once_through_resolver() {
        let mut resolver = fs_resolver();
        resolver.set_test_suite_path("/ts/a".into()).unwrap();
        resolver.set_test_suite_path("/ts/a".into()).unwrap();
        assert!(matches!(
            resolver.set_test_suite_path("/ts/b".into()),
            Err(ConfigFault::TestSuiteAlreadySet { .. })
        ));
        assert!(!resolver.is_resolved());
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let ts = write_suite(tmp.path(), "ts", None);
        let mut resolver = fs_resolver();
        resolver.set_test_suite_path(ts).unwrap();
        resolver
            .set_work_dir_path(tmp.path().join("wd"), true)
            .unwrap();

        let first = resolver.configuration().unwrap().id();
        let first_wd = resolver.work_directory().unwrap().unwrap().id();
        let second = resolver.configuration().unwrap().id();
        let second_wd = resolver.work_directory().unwrap().unwrap().id();
        assert_eq!(first, second);
        assert_eq!(first_wd, second_wd);
    }

    #[test]
    fn test_scenario_a_bootstrap_from_properties() {
        let tmp = TempDir::new().unwrap();
        let ts = write_suite(tmp.path(), "ts", None);
        let props = write_properties(
            tmp.path(),
            "cfg.properties",
            &format!("TESTSUITE={}\n", ts.display()),
        );
        let wd = tmp.path().join("new_wd");
        fs::create_dir_all(&wd).unwrap();

        let mut resolver = fs_resolver();
        resolver.set_config_file_path(props).unwrap();
        resolver.set_work_dir_path(wd.clone(), false).unwrap();

        let config = resolver.configuration().unwrap();
        assert_eq!(config.test_suite().root(), canonical(&ts).as_path());
        assert!(config.values().is_empty());
        let bound = config.work_directory().unwrap();
        assert_eq!(bound.root(), canonical(&wd).as_path());
        assert!(FsBackend.is_work_directory(&wd));

        assert_eq!(
            resolver.inputs().test_suite_path(),
            Some(canonical(&ts).as_path())
        );
        assert!(resolver.warnings().is_empty());
    }

    #[test]
    fn test_bootstrap_relative_testsuite_and_overrides() {
        let tmp = TempDir::new().unwrap();
        write_suite(tmp.path(), "ts", None);
        let props = write_properties(
            tmp.path(),
            "cfg.properties",
            "TESTSUITE=ts\nconcurrency=6\n",
        );

        let mut resolver = fs_resolver();
        resolver.set_config_file_path(props).unwrap();
        resolver.set_work_dir_path(tmp.path().join("wd"), true).unwrap();

        let config = resolver.configuration().unwrap();
        assert_eq!(config.concurrency(), Some(6));
        assert_eq!(config.value("TESTSUITE"), None);
    }

    #[test]
    fn test_bootstrap_requires_a_test_suite() {
        let tmp = TempDir::new().unwrap();
        let mut resolver = fs_resolver();
        resolver.set_work_dir_path(tmp.path().join("wd"), true).unwrap();
        assert!(matches!(
            resolver.configuration(),
            Err(ConfigFault::NoTestSuite)
        ));

        let props = write_properties(tmp.path(), "cfg.properties", "concurrency=2\n");
        let mut resolver = fs_resolver();
        resolver.set_config_file_path(props).unwrap();
        resolver.set_work_dir_path(tmp.path().join("wd2"), true).unwrap();
        assert!(matches!(
            resolver.configuration(),
            Err(ConfigFault::NoTestSuiteInConfigFile { .. })
        ));
    }

    #[test]
    fn test_bootstrap_reports_config_file_as_origin() {
        let tmp = TempDir::new().unwrap();
        let props = write_properties(tmp.path(), "cfg.properties", "TESTSUITE=missing\n");
        let mut resolver = fs_resolver();
        resolver.set_config_file_path(props.clone()).unwrap();
        resolver.set_work_dir_path(tmp.path().join("wd"), true).unwrap();

        assert!(matches!(
            resolver.configuration(),
            Err(ConfigFault::CantFindTestSuite { origin: PathOrigin::ConfigFile(ref p), .. }) if *p == props
        ));
        assert!(!tmp.path().join("wd").exists());
    }

    #[test]
    fn test_failed_bootstrap_leaves_directory_reusable() {
        let tmp = TempDir::new().unwrap();
        let ts = write_suite(tmp.path(), "ts", None);
        let props = write_properties(
            tmp.path(),
            "cfg.properties",
            &format!("TESTSUITE={}\nconcurrency=999\n", ts.display()),
        );
        let wd = tmp.path().join("wd");

        let mut resolver = fs_resolver();
        resolver.set_config_file_path(props.clone()).unwrap();
        resolver.set_work_dir_path(wd.clone(), true).unwrap();
        assert!(matches!(
            resolver.configuration(),
            Err(ConfigFault::CantOpenConfig { .. })
        ));
        assert!(!FsBackend.is_work_directory(&wd));

        fs::write(&props, format!("TESTSUITE={}\nconcurrency=4\n", ts.display())).unwrap();
        let mut resolver = fs_resolver();
        resolver.set_config_file_path(props).unwrap();
        resolver.set_work_dir_path(wd.clone(), true).unwrap();
        assert_eq!(resolver.configuration().unwrap().concurrency(), Some(4));
        assert!(FsBackend.is_work_directory(&wd));
    }

    #[test]
    fn test_bootstrap_with_config_of_other_suite_creates_nothing() {
        let tmp = TempDir::new().unwrap();
        let ts = write_suite(tmp.path(), "ts", None);
        let other = write_suite(tmp.path(), "other", None);
        let cfg = write_config(tmp.path(), "run.json", &other, &[], None);
        let wd = tmp.path().join("wd");

        let mut resolver = fs_resolver();
        resolver.set_test_suite_path(ts).unwrap();
        resolver.set_config_file_path(cfg).unwrap();
        resolver.set_work_dir_path(wd.clone(), true).unwrap();
        assert!(matches!(
            resolver.configuration(),
            Err(ConfigFault::ConfigTestSuiteMismatch { .. })
        ));
        assert!(!wd.exists());
    }

    #[test]
    fn test_bootstrap_with_corrupt_properties() {
        let tmp = TempDir::new().unwrap();
        let props = write_properties(tmp.path(), "cfg.properties", "=value\n");
        let mut resolver = fs_resolver();
        resolver.set_config_file_path(props).unwrap();
        resolver.set_work_dir_path(tmp.path().join("wd"), true).unwrap();
        assert!(matches!(
            resolver.configuration(),
            Err(ConfigFault::CantReadConfig { .. })
        ));
    }

    #[test]
    fn test_scenario_b_work_dir_of_other_suite_leaves_no_state() {
        let tmp = TempDir::new().unwrap();
        let ts = write_suite(tmp.path(), "root", None);
        let other = write_suite(tmp.path(), "other", None);
        let wd = write_work_dir(&other, &tmp.path().join("existing_wd"));

        let mut resolver = fs_resolver();
        resolver.set_test_suite_path(ts).unwrap();
        resolver.set_work_dir_path(wd, false).unwrap();
        let before = resolver.inputs().clone();

        assert!(matches!(
            resolver.configuration(),
            Err(ConfigFault::WorkDirTestSuiteMismatch { .. })
        ));
        assert!(resolver.resolved().is_none());
        assert_eq!(resolver.inputs(), &before);
        assert!(matches!(
            resolver.configuration(),
            Err(ConfigFault::ResolutionFailed { .. })
        ));
    }

    #[test]
    fn test_scenario_c_work_dir_only() {
        let tmp = TempDir::new().unwrap();
        let ts = write_suite(tmp.path(), "ts", None);
        let wd = write_work_dir(&ts, &tmp.path().join("existing_wd"));
        fs::write(wd.join("leftover.log"), "populated").unwrap();

        let mut resolver = fs_resolver();
        resolver.set_work_dir_path(wd.clone(), false).unwrap();

        let suite = resolver.test_suite().unwrap();
        assert_eq!(suite.root(), canonical(&ts).as_path());
        assert_eq!(
            resolver.inputs().test_suite_path(),
            Some(canonical(&ts).as_path())
        );
        assert!(resolver.work_directory().unwrap().is_some());
    }

    #[test]
    fn test_missing_work_dir_needs_auto_create() {
        let tmp = TempDir::new().unwrap();
        let ts = write_suite(tmp.path(), "ts", None);
        let wd = tmp.path().join("fresh");

        let mut resolver = fs_resolver();
        resolver.set_test_suite_path(ts.clone()).unwrap();
        resolver.set_work_dir_path(wd.clone(), false).unwrap();
        assert!(matches!(
            resolver.configuration(),
            Err(ConfigFault::CantFindWorkDir { .. })
        ));
        assert!(!wd.exists());

        let mut resolver = fs_resolver();
        resolver.set_test_suite_path(ts).unwrap();
        resolver.set_work_dir_path(wd.clone(), true).unwrap();
        resolver.configuration().unwrap();
        assert!(FsBackend.is_work_directory(&wd));
        assert_eq!(fs::read_dir(&wd).unwrap().count(), 1);
    }

    #[test]
    fn test_failed_resolution_retries_after_input_change() {
        let tmp = TempDir::new().unwrap();
        let ts = write_suite(tmp.path(), "ts", None);
        let mut resolver = fs_resolver();

        assert!(matches!(resolver.configuration(), Err(ConfigFault::NoTestSuite)));
        assert!(matches!(
            resolver.configuration(),
            Err(ConfigFault::ResolutionFailed { .. })
        ));

        resolver.set_test_suite_path(ts).unwrap();
        assert!(resolver.configuration().is_ok());
        assert!(resolver.work_directory().unwrap().is_none());
    }

    #[test]
    fn test_same_input_again_keeps_failure() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("missing");
        let mut resolver = fs_resolver();
        resolver.set_test_suite_path(missing.clone()).unwrap();
        assert!(resolver.configuration().is_err());

        resolver.set_test_suite_path(missing).unwrap();
        assert!(matches!(resolver.state(), ResolutionState::Failed(_)));
        assert!(matches!(
            resolver.configuration(),
            Err(ConfigFault::ResolutionFailed { .. })
        ));
    }

    #[test]
    fn test_default_work_dir_hint() {
        let tmp = TempDir::new().unwrap();
        let ts = write_suite(tmp.path(), "ts", None);
        let wd = write_work_dir(&ts, &tmp.path().join("previous"));

        let mut resolver = fs_resolver();
        resolver.set_test_suite_path(ts.clone()).unwrap();
        resolver.set_default_work_dir_path(Some(wd.clone()));
        let bound = resolver.work_directory().unwrap().unwrap();
        assert_eq!(bound.root(), canonical(&wd).as_path());

        let mut resolver = fs_resolver();
        resolver.set_test_suite_path(ts).unwrap();
        resolver.set_default_work_dir_path(Some(tmp.path().join("gone")));
        assert!(resolver.work_directory().unwrap().is_none());
    }

    #[test]
    fn test_config_path_rejected_once_resolved() {
        let tmp = TempDir::new().unwrap();
        let ts = write_suite(tmp.path(), "ts", None);
        let mut resolver = fs_resolver();
        resolver.set_test_suite_path(ts).unwrap();
        resolver.configuration().unwrap();

        assert!(matches!(
            resolver.set_config_file_path("any.json".into()),
            Err(ConfigFault::ConfigAlreadySet { current: None, .. })
        ));
    }

    #[test]
    fn test_late_work_dir_binding() {
        let tmp = TempDir::new().unwrap();
        let ts = write_suite(tmp.path(), "ts", None);
        let mut resolver = fs_resolver();
        resolver.set_test_suite_path(ts).unwrap();
        let id = resolver.configuration().unwrap().id();

        let wd = tmp.path().join("late");
        resolver.set_work_dir_path(wd.clone(), true).unwrap();
        let config = resolver.configuration().unwrap();
        assert_eq!(config.id(), id);
        assert_eq!(
            config.work_directory().unwrap().root(),
            canonical(&wd).as_path()
        );
    }

    #[test]
    fn test_failed_late_binding_forgets_work_dir() {
        let tmp = TempDir::new().unwrap();
        let ts = write_suite(tmp.path(), "ts", None);
        let mut resolver = fs_resolver();
        resolver.set_test_suite_path(ts).unwrap();
        resolver.configuration().unwrap();

        assert!(matches!(
            resolver.set_work_dir_path(tmp.path().join("absent"), false),
            Err(ConfigFault::CantFindWorkDir { .. })
        ));
        assert!(resolver.inputs().work_dir_path().is_none());
        assert!(resolver.work_directory().unwrap().is_none());

        let wd = tmp.path().join("late");
        resolver.set_work_dir_path(wd.clone(), true).unwrap();
        assert_eq!(
            resolver.work_directory().unwrap().unwrap().root(),
            canonical(&wd).as_path()
        );
    }

    #[test]
    fn test_template_recorded_in_new_work_dir() {
        let tmp = TempDir::new().unwrap();
        let ts = write_suite(tmp.path(), "ts", None);
        let template = write_config(tmp.path(), "base.json", &ts, &[("concurrency", "4")], None);
        let cfg = write_config(tmp.path(), "run.json", &ts, &[], Some(&template));

        let mut resolver = fs_resolver();
        resolver.set_config_file_path(cfg).unwrap();
        resolver.set_work_dir_path(tmp.path().join("wd"), true).unwrap();
        let wd = resolver.work_directory().unwrap().unwrap();

        assert_eq!(wd.read_template_ref().unwrap(), Some(template));
        assert!(resolver.warnings().is_empty());
    }

    #[test]
    fn test_unwritable_template_ref_is_a_warning() {
        let tmp = TempDir::new().unwrap();
        let ts = write_suite(tmp.path(), "ts", None);
        let template = write_config(tmp.path(), "base.json", &ts, &[("concurrency", "4")], None);
        let cfg = write_config(tmp.path(), "run.json", &ts, &[], Some(&template));

        let mut resolver = Resolver::new(Box::new(ReadOnlyTemplateRefs(FsBackend)));
        resolver.set_config_file_path(cfg).unwrap();
        resolver.set_work_dir_path(tmp.path().join("wd"), true).unwrap();

        let wd = resolver.work_directory().unwrap().unwrap();
        assert_eq!(wd.read_template_ref().unwrap(), None);
        match resolver.warnings() {
            [ConfigFault::CantWriteTemplateRef { template: recorded, .. }] => {
                assert_eq!(recorded, &template);
            }
            other => unreachable!("unexpected warnings: {other:?}"),
        }
    }

    #[test]
    fn test_stored_template_applied_on_open() {
        let tmp = TempDir::new().unwrap();
        let ts = write_suite(tmp.path(), "ts", None);
        let template = write_config(tmp.path(), "base.json", &ts, &[("concurrency", "4")], None);
        let wd_path = write_work_dir(&ts, &tmp.path().join("wd"));
        FsBackend
            .open_work_directory(&wd_path)
            .unwrap()
            .write_template_ref(&template)
            .unwrap();

        let mut resolver = fs_resolver();
        resolver.set_work_dir_path(wd_path, false).unwrap();
        let config = resolver.configuration().unwrap();
        assert_eq!(config.concurrency(), Some(4));
        assert_eq!(config.template(), Some(template.as_path()));
    }

    #[test]
    fn test_stored_template_overrides_suite_defaults() {
        let tmp = TempDir::new().unwrap();
        let ts = write_suite_with_defaults(tmp.path(), "ts", &[("concurrency", "2")]);
        let template = write_config(tmp.path(), "base.json", &ts, &[("concurrency", "8")], None);
        let wd_path = write_work_dir(&ts, &tmp.path().join("wd"));
        FsBackend
            .open_work_directory(&wd_path)
            .unwrap()
            .write_template_ref(&template)
            .unwrap();

        let mut resolver = fs_resolver();
        resolver.set_work_dir_path(wd_path, false).unwrap();
        assert_eq!(resolver.configuration().unwrap().concurrency(), Some(8));
    }

    #[test]
    fn test_missing_stored_template_is_a_warning() {
        let tmp = TempDir::new().unwrap();
        let ts = write_suite(tmp.path(), "ts", None);
        let wd_path = write_work_dir(&ts, &tmp.path().join("wd"));
        FsBackend
            .open_work_directory(&wd_path)
            .unwrap()
            .write_template_ref(&tmp.path().join("deleted.json"))
            .unwrap();

        let mut resolver = fs_resolver();
        resolver.set_work_dir_path(wd_path, false).unwrap();
        assert!(resolver.configuration().is_ok());
        assert_eq!(resolver.warnings().len(), 1);
        assert!(matches!(
            resolver.take_warnings().first(),
            Some(ConfigFault::CantLoadTemplate { .. })
        ));
        assert!(resolver.warnings().is_empty());
    }

    #[test]
    fn test_replacing_configuration_disposes_previous() {
        let tmp = TempDir::new().unwrap();
        let ts = write_suite_with_defaults(tmp.path(), "ts", &[]);
        let disposed = Arc::new(AtomicUsize::new(0));

        let mut resolver = fs_resolver();
        let mut first = FsBackend.open_combined(Some(&ts), None, None).unwrap();
        let seen = disposed.clone();
        first.on_dispose(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        resolver.set_resolved_configuration(first).unwrap();
        assert_eq!(disposed.load(Ordering::SeqCst), 0);

        let second = FsBackend.open_combined(Some(&ts), None, None).unwrap();
        let second_id = second.id();
        resolver.set_resolved_configuration(second).unwrap();
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.configuration().unwrap().id(), second_id);
    }

    #[test]
    fn test_replacement_from_other_suite_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let ts = write_suite(tmp.path(), "ts", None);
        let other = write_suite(tmp.path(), "other", None);

        let mut resolver = fs_resolver();
        let first = FsBackend.open_combined(Some(&ts), None, None).unwrap();
        let first_id = first.id();
        resolver.set_resolved_configuration(first).unwrap();

        let foreign = FsBackend.open_combined(Some(&other), None, None).unwrap();
        assert!(matches!(
            resolver.set_resolved_configuration(foreign),
            Err(ConfigFault::ConfigTestSuiteMismatch { .. })
        ));
        assert_eq!(resolver.configuration().unwrap().id(), first_id);
    }

    #[test]
    fn test_replacement_keeps_bound_work_dir() {
        let tmp = TempDir::new().unwrap();
        let ts = write_suite(tmp.path(), "ts", None);
        let wd = write_work_dir(&ts, &tmp.path().join("wd"));

        let mut resolver = fs_resolver();
        resolver.set_work_dir_path(wd, false).unwrap();
        let wd_id = resolver.work_directory().unwrap().unwrap().id();

        let replacement = FsBackend.open_combined(Some(&ts), None, None).unwrap();
        resolver.set_resolved_configuration(replacement).unwrap();
        assert_eq!(resolver.work_directory().unwrap().unwrap().id(), wd_id);
    }

    #[test]
    fn test_replacement_bound_elsewhere_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let ts = write_suite(tmp.path(), "ts", None);
        let wd_a = write_work_dir(&ts, &tmp.path().join("a"));
        let wd_b = write_work_dir(&ts, &tmp.path().join("b"));

        let mut resolver = fs_resolver();
        let first = FsBackend.open_combined(None, Some(&wd_a), None).unwrap();
        let first_id = first.id();
        resolver.set_resolved_configuration(first).unwrap();

        let elsewhere = FsBackend.open_combined(None, Some(&wd_b), None).unwrap();
        assert!(matches!(
            resolver.set_resolved_configuration(elsewhere),
            Err(ConfigFault::ConfigWorkDirMismatch { .. })
        ));
        assert_eq!(resolver.configuration().unwrap().id(), first_id);
    }

    #[test]
    fn test_set_resolved_work_directory() {
        let tmp = TempDir::new().unwrap();
        let ts = write_suite(tmp.path(), "ts", None);
        let other = write_suite(tmp.path(), "other", None);
        let wd_a = FsBackend
            .open_work_directory(&write_work_dir(&ts, &tmp.path().join("a")))
            .unwrap();
        let wd_b = FsBackend
            .open_work_directory(&write_work_dir(&ts, &tmp.path().join("b")))
            .unwrap();
        let foreign = FsBackend
            .open_work_directory(&write_work_dir(&other, &tmp.path().join("c")))
            .unwrap();

        let mut resolver = fs_resolver();
        resolver.set_resolved_work_directory(wd_a.clone()).unwrap();
        assert!(resolver.is_resolved());
        resolver.set_resolved_work_directory(wd_a).unwrap();

        assert!(matches!(
            resolver.set_resolved_work_directory(wd_b),
            Err(ConfigFault::WorkDirAlreadySet { .. })
        ));
        assert!(matches!(
            resolver.set_resolved_work_directory(foreign),
            Err(ConfigFault::WorkDirTestSuiteMismatch { .. })
        ));
    }

    #[test]
    fn test_dispose_releases_configuration() {
        let tmp = TempDir::new().unwrap();
        let ts = write_suite(tmp.path(), "ts", None);
        let mut resolver = fs_resolver();
        resolver.set_test_suite_path(ts).unwrap();
        resolver.configuration().unwrap();
        resolver.dispose();
        assert!(resolver.resolved().is_none());
    }
}
