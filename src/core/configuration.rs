// src/core/configuration.rs

use crate::constants::{
    BOOTSTRAP_TESTSUITE_KEY, KEY_CONCURRENCY, KEY_TESTS, KEY_TIMEOUT_FACTOR, MAX_CONCURRENCY,
};
use crate::core::backend::BackendError;
use crate::core::paths;
use crate::core::suite::{TestSuite, WorkDirectory};
use crate::models::ConfigFile;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use thiserror::Error;
use uuid::Uuid;

/// A rejected configuration value.
#[derive(Error, Debug)]
pub enum ValueError {
    #[error("Configuration keys cannot be empty.")]
    EmptyKey,

    #[error("Value '{value}' for '{key}' is not a number.")]
    NotANumber { key: String, value: String },

    #[error("Value '{value}' for '{key}' is out of range: {reason}.")]
    OutOfRange {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Invalid test pattern '{pattern}'")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Checks a value against the rules of the well-known keys. Other keys accept anything.
pub fn validate_value(key: &str, value: &str) -> Result<(), ValueError> {
    match key {
        "" => Err(ValueError::EmptyKey),
        KEY_CONCURRENCY => parse_concurrency(value).map(|_| ()),
        KEY_TIMEOUT_FACTOR => parse_timeout_factor(value).map(|_| ()),
        KEY_TESTS => compile_patterns(value).map(|_| ()),
        _ => Ok(()),
    }
}

pub fn parse_concurrency(value: &str) -> Result<usize, ValueError> {
    let parsed: usize = value.trim().parse().map_err(|_| ValueError::NotANumber {
        key: KEY_CONCURRENCY.to_string(),
        value: value.to_string(),
    })?;
    if !(1..=MAX_CONCURRENCY).contains(&parsed) {
        return Err(ValueError::OutOfRange {
            key: KEY_CONCURRENCY.to_string(),
            value: value.to_string(),
            reason: format!("expected 1..={}", MAX_CONCURRENCY),
        });
    }
    Ok(parsed)
}

pub fn parse_timeout_factor(value: &str) -> Result<f64, ValueError> {
    let parsed: f64 = value.trim().parse().map_err(|_| ValueError::NotANumber {
        key: KEY_TIMEOUT_FACTOR.to_string(),
        value: value.to_string(),
    })?;
    if !parsed.is_finite() || parsed <= 0.0 {
        return Err(ValueError::OutOfRange {
            key: KEY_TIMEOUT_FACTOR.to_string(),
            value: value.to_string(),
            reason: "expected a finite number greater than 0".to_string(),
        });
    }
    Ok(parsed)
}

/// Compiles whitespace-separated test selection patterns.
pub fn compile_patterns(value: &str) -> Result<Vec<Regex>, ValueError> {
    value
        .split_whitespace()
        .map(|pattern| {
            Regex::new(pattern).map_err(|source| ValueError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
        })
        .collect()
}

type DisposeHook = Box<dyn FnOnce(&Configuration) + Send>;

/// The resolved parameter set controlling a test run.
///
/// Bound to exactly one test suite and, once established, one work directory. Dispose
/// hooks run exactly once, either from [`Configuration::dispose`] or when the value is
/// dropped.
///
/// Values seeded from the suite's `[defaults]` are tracked apart from explicit ones, so a
/// template can still override them.
pub struct Configuration {
    id: Uuid,
    suite: Arc<TestSuite>,
    work_dir: Option<Arc<WorkDirectory>>,
    values: BTreeMap<String, String>,
    explicit: BTreeSet<String>,
    source_file: Option<PathBuf>,
    template: Option<PathBuf>,
    is_template: bool,
    dispose_hooks: Vec<DisposeHook>,
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("id", &self.id)
            .field("suite", &self.suite.id())
            .field("work_dir", &self.work_dir.as_ref().map(|wd| wd.root()))
            .field("values", &self.values)
            .field("explicit", &self.explicit)
            .field("source_file", &self.source_file)
            .field("template", &self.template)
            .field("is_template", &self.is_template)
            .finish_non_exhaustive()
    }
}

impl Configuration {
    /// A configuration seeded from the suite's `[defaults]`.
    pub fn create_empty(suite: Arc<TestSuite>) -> Result<Self, ValueError> {
        let mut config = Self::bare(suite);
        let defaults = config.suite.defaults().clone();
        for (key, value) in defaults {
            config.seed_default(key, value)?;
        }
        Ok(config)
    }

    /// Builds a configuration from its on-disk form. Relative paths inside the file are
    /// taken relative to `source`.
    pub fn from_file(
        file: ConfigFile,
        suite: Arc<TestSuite>,
        source: &Path,
    ) -> Result<Self, ValueError> {
        let mut config = Self::bare(suite);
        for (key, value) in file.values {
            config.set_value(key, value)?;
        }
        config.template = file
            .template
            .map(|template| paths::resolve_relative_to_file(source, &template));
        config.is_template = file.is_template;
        config.source_file = Some(source.to_path_buf());
        Ok(config)
    }

    fn bare(suite: Arc<TestSuite>) -> Self {
        Self {
            id: Uuid::new_v4(),
            suite,
            work_dir: None,
            values: BTreeMap::new(),
            explicit: BTreeSet::new(),
            source_file: None,
            template: None,
            is_template: false,
            dispose_hooks: Vec::new(),
        }
    }

    /// A new configuration seeded from `template_values` and overlaid with this one's
    /// explicit values. Suite defaults only fill keys the template leaves out. Work
    /// directory and source file carry over.
    pub fn derive_from_template(
        &self,
        template: &Path,
        template_values: &BTreeMap<String, String>,
    ) -> Result<Self, ValueError> {
        let mut derived = Self::bare(self.suite.clone());
        for (key, value) in self.values.iter().filter(|(k, _)| !self.is_explicit(k)) {
            derived.seed_default(key.clone(), value.clone())?;
        }
        let explicit = self.values.iter().filter(|(k, _)| self.is_explicit(k));
        for (key, value) in template_values.iter().chain(explicit) {
            derived.set_value(key.clone(), value.clone())?;
        }
        derived.work_dir = self.work_dir.clone();
        derived.source_file = self.source_file.clone();
        derived.template = Some(template.to_path_buf());
        Ok(derived)
    }

    /// Identity of this configuration object. Changes with every construction.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn test_suite(&self) -> &Arc<TestSuite> {
        &self.suite
    }

    pub fn work_directory(&self) -> Option<&Arc<WorkDirectory>> {
        self.work_dir.as_ref()
    }

    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }

    pub fn template(&self) -> Option<&Path> {
        self.template.as_deref()
    }

    pub fn is_template(&self) -> bool {
        self.is_template
    }

    pub fn set_is_template(&mut self, is_template: bool) {
        self.is_template = is_template;
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// False for values that only come from the suite's defaults.
    pub fn is_explicit(&self, key: &str) -> bool {
        self.explicit.contains(key)
    }

    fn seed_default(&mut self, key: String, value: String) -> Result<(), ValueError> {
        validate_value(&key, &value)?;
        log::trace!("Configuration default '{}' = '{}'", key, value);
        self.values.insert(key, value);
        Ok(())
    }

    pub fn set_value(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), ValueError> {
        let key = key.into();
        let value = value.into();
        validate_value(&key, &value)?;
        log::trace!("Configuration value '{}' = '{}'", key, value);
        self.explicit.insert(key.clone());
        self.values.insert(key, value);
        Ok(())
    }

    /// Applies bootstrap properties. The `TESTSUITE` key only locates the suite and is
    /// not copied.
    pub fn load_overrides(
        &mut self,
        properties: &BTreeMap<String, String>,
        source: &Path,
    ) -> Result<(), ValueError> {
        log::debug!("Applying overrides from '{}'", source.display());
        for (key, value) in properties {
            if key == BOOTSTRAP_TESTSUITE_KEY {
                continue;
            }
            self.set_value(key.clone(), value.clone())?;
        }
        Ok(())
    }

    /// Binds a work directory of the same test suite. Rebinding the same one is a no-op.
    pub fn bind_work_directory(&mut self, work_dir: Arc<WorkDirectory>) -> Result<(), BackendError> {
        if work_dir.test_suite().id() != self.suite.id() {
            return Err(BackendError::WorkDirSuiteMismatch {
                work_dir: work_dir.root().to_path_buf(),
                found: work_dir.test_suite().id().clone(),
                expected: self.suite.id().clone(),
            });
        }
        log::debug!("Configuration bound to work directory '{}'", work_dir.root().display());
        self.work_dir = Some(work_dir);
        Ok(())
    }

    pub fn concurrency(&self) -> Option<usize> {
        self.value(KEY_CONCURRENCY)
            .and_then(|v| parse_concurrency(v).ok())
    }

    pub fn timeout_factor(&self) -> Option<f64> {
        self.value(KEY_TIMEOUT_FACTOR)
            .and_then(|v| parse_timeout_factor(v).ok())
    }

    pub fn test_patterns(&self) -> Result<Vec<Regex>, ValueError> {
        self.value(KEY_TESTS)
            .map(compile_patterns)
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    /// The on-disk form of this configuration.
    pub fn to_file(&self) -> ConfigFile {
        ConfigFile {
            test_suite: self.suite.root().to_path_buf(),
            work_dir: self.work_dir.as_ref().map(|wd| wd.root().to_path_buf()),
            template: self.template.clone(),
            is_template: self.is_template,
            values: self.values.clone(),
        }
    }

    /// Writes the configuration to `path` atomically without changing its source file.
    pub fn write_to(&self, path: &Path) -> Result<(), BackendError> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(|source| BackendError::Io {
            path: parent.to_path_buf(),
            source,
        })?;

        let json = serde_json::to_string_pretty(&self.to_file()).map_err(|source| {
            BackendError::Json {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let mut temp = NamedTempFile::new_in(parent).map_err(|source| BackendError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
        temp.write_all(json.as_bytes())
            .map_err(|source| BackendError::Io {
                path: temp.path().to_path_buf(),
                source,
            })?;
        temp.persist(path)?;
        Ok(())
    }

    /// Writes the configuration to `path` and makes it the source file.
    pub fn save(&mut self, path: &Path) -> Result<(), BackendError> {
        self.write_to(path)?;
        self.source_file = Some(path.to_path_buf());
        log::debug!("Configuration saved to '{}'", path.display());
        Ok(())
    }

    /// Registers a listener that runs once when this configuration is disposed.
    pub fn on_dispose(&mut self, hook: impl FnOnce(&Configuration) + Send + 'static) {
        self.dispose_hooks.push(Box::new(hook));
    }

    /// Releases the configuration, running its dispose listeners.
    pub fn dispose(self) {
        log::debug!("Disposing configuration {}", self.id);
        drop(self);
    }
}

impl Drop for Configuration {
    fn drop(&mut self) {
        let hooks = std::mem::take(&mut self.dispose_hooks);
        for hook in hooks {
            hook(&*self);
        }
    }
}
