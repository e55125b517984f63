// src/core/suite.rs

use crate::constants::{
    RESULTS_FILENAME, SUITE_DESCRIPTOR_FILENAME, SUITE_TESTS_DIR, TEMPLATE_REF_FILENAME,
    WORKDIR_CONFIG_FILENAME, WORKDIR_META_DIR, WORKDIR_REF_FILENAME,
};
use crate::core::backend::BackendError;
use crate::core::paths;
use crate::models::{ResultsFile, SuiteDescriptor, TestDescriptor, WorkDirRef};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;
use walkdir::WalkDir;

const SUITE_ID_HASH_LENGTH: usize = 16; // 16 bytes = 32 hex characters

/// The stable identity token of a test suite.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SuiteId(String);

impl SuiteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives an identity from the canonical root path when the descriptor declares none.
    pub fn derive_from_root(root: &Path) -> Self {
        let hash = blake3::hash(root.to_string_lossy().as_bytes());
        let bytes = hash.as_bytes();
        Self(hex::encode(bytes.get(..SUITE_ID_HASH_LENGTH).unwrap_or(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SuiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An opened test suite: a root directory holding `testsuite.toml` and `tests/`.
#[derive(Debug)]
pub struct TestSuite {
    root: PathBuf,
    id: SuiteId,
    name: String,
    descriptor: SuiteDescriptor,
}

/// One runnable test found under the suite's `tests/` directory.
#[derive(Debug, Clone)]
pub struct TestCase {
    /// Relative path without extension, `/`-separated (e.g. `api/login`).
    pub name: String,
    pub path: PathBuf,
    pub descriptor: TestDescriptor,
}

impl TestSuite {
    pub fn is_suite_root(path: &Path) -> bool {
        path.join(SUITE_DESCRIPTOR_FILENAME).is_file()
    }

    pub fn open(path: &Path) -> Result<Self, BackendError> {
        if !Self::is_suite_root(path) {
            return Err(BackendError::NotATestSuite {
                path: path.to_path_buf(),
            });
        }
        let root = paths::canonical_or_original(path);
        let descriptor_path = root.join(SUITE_DESCRIPTOR_FILENAME);
        let content = fs::read_to_string(&descriptor_path).map_err(|source| BackendError::Io {
            path: descriptor_path.clone(),
            source,
        })?;
        let descriptor: SuiteDescriptor =
            toml::from_str(&content).map_err(|source| BackendError::TomlParse {
                path: descriptor_path,
                source,
            })?;

        let id = match descriptor.id.as_deref().map(str::trim) {
            Some(declared) if !declared.is_empty() => SuiteId::new(declared),
            _ => SuiteId::derive_from_root(&root),
        };
        let name = descriptor.name.clone().unwrap_or_else(|| {
            root.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| root.display().to_string())
        });

        log::debug!("Opened test suite '{}' ({}) at '{}'", name, id, root.display());
        Ok(Self {
            root,
            id,
            name,
            descriptor,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn id(&self) -> &SuiteId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_timeout_secs(&self) -> Option<u64> {
        self.descriptor.default_timeout_secs
    }

    pub fn defaults(&self) -> &std::collections::BTreeMap<String, String> {
        &self.descriptor.defaults
    }

    /// Walks `tests/` for `*.toml` descriptors. The result is sorted by test name.
    pub fn discover_tests(&self) -> Result<Vec<TestCase>, BackendError> {
        let tests_dir = self.root.join(SUITE_TESTS_DIR);
        if !tests_dir.is_dir() {
            log::debug!("Suite '{}' has no '{}' directory.", self.name, SUITE_TESTS_DIR);
            return Ok(Vec::new());
        }

        let mut cases = Vec::new();
        for entry in WalkDir::new(&tests_dir).follow_links(true) {
            let entry = entry.map_err(|e| BackendError::Io {
                path: tests_dir.clone(),
                source: e.into(),
            })?;
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != "toml") {
                continue;
            }

            let content = fs::read_to_string(path).map_err(|source| BackendError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let descriptor: TestDescriptor =
                toml::from_str(&content).map_err(|source| BackendError::TomlParse {
                    path: path.to_path_buf(),
                    source,
                })?;

            let relative = path.strip_prefix(&tests_dir).unwrap_or(path).with_extension("");
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            log::trace!("Discovered test '{}'", name);
            cases.push(TestCase {
                name,
                path: path.to_path_buf(),
                descriptor,
            });
        }
        cases.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(cases)
    }
}

/// A directory bound to exactly one test suite, holding run state and results.
#[derive(Debug)]
pub struct WorkDirectory {
    id: Uuid,
    root: PathBuf,
    suite: Arc<TestSuite>,
}

impl WorkDirectory {
    pub fn is_work_dir(path: &Path) -> bool {
        path.join(WORKDIR_META_DIR).join(WORKDIR_REF_FILENAME).is_file()
    }

    /// Creates a work directory at `path` for `suite`. The path must not exist yet or be
    /// an empty directory.
    pub fn create(path: &Path, suite: Arc<TestSuite>) -> Result<Self, BackendError> {
        if path.exists() {
            let is_empty_dir = fs::read_dir(path)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if !is_empty_dir {
                return Err(BackendError::DirectoryNotEmpty {
                    path: path.to_path_buf(),
                });
            }
        }

        let meta_dir = path.join(WORKDIR_META_DIR);
        fs::create_dir_all(&meta_dir).map_err(|source| BackendError::Io {
            path: meta_dir.clone(),
            source,
        })?;
        let root = paths::canonical_or_original(path);

        let work_dir_ref = WorkDirRef {
            id: Uuid::new_v4(),
            suite_root: suite.root().to_path_buf(),
            suite_id: suite.id().as_str().to_string(),
        };
        write_bincode(&meta_dir.join(WORKDIR_REF_FILENAME), &work_dir_ref)?;

        log::info!(
            "Created work directory '{}' for test suite '{}'.",
            root.display(),
            suite.name()
        );
        Ok(Self {
            id: work_dir_ref.id,
            root,
            suite,
        })
    }

    /// Opens an existing work directory and the suite it was created for.
    pub fn open(path: &Path) -> Result<Self, BackendError> {
        if !Self::is_work_dir(path) {
            return Err(BackendError::NotAWorkDirectory {
                path: path.to_path_buf(),
            });
        }
        let root = paths::canonical_or_original(path);
        let work_dir_ref: WorkDirRef =
            read_bincode(&root.join(WORKDIR_META_DIR).join(WORKDIR_REF_FILENAME))?;

        let suite = TestSuite::open(&work_dir_ref.suite_root)?;
        if suite.id().as_str() != work_dir_ref.suite_id {
            return Err(BackendError::WorkDirSuiteMismatch {
                work_dir: root,
                found: SuiteId::new(work_dir_ref.suite_id),
                expected: suite.id().clone(),
            });
        }

        Ok(Self {
            id: work_dir_ref.id,
            root,
            suite: Arc::new(suite),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn test_suite(&self) -> &Arc<TestSuite> {
        &self.suite
    }

    /// Identity comparison: two handles denote the same work directory.
    pub fn same_as(&self, other: &Self) -> bool {
        self.id == other.id
    }

    pub fn meta_dir(&self) -> PathBuf {
        self.root.join(WORKDIR_META_DIR)
    }

    /// Where the configuration last used in this work directory is kept.
    pub fn config_path(&self) -> PathBuf {
        self.meta_dir().join(WORKDIR_CONFIG_FILENAME)
    }

    pub fn read_template_ref(&self) -> Result<Option<PathBuf>, BackendError> {
        let ref_path = self.meta_dir().join(TEMPLATE_REF_FILENAME);
        if !ref_path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&ref_path).map_err(|source| BackendError::Io {
            path: ref_path,
            source,
        })?;
        let trimmed = content.trim();
        Ok((!trimmed.is_empty()).then(|| PathBuf::from(trimmed)))
    }

    pub fn write_template_ref(&self, template: &Path) -> Result<(), BackendError> {
        let ref_path = self.meta_dir().join(TEMPLATE_REF_FILENAME);
        fs::write(&ref_path, template.to_string_lossy().as_bytes()).map_err(|source| {
            BackendError::Io {
                path: ref_path,
                source,
            }
        })
    }

    pub fn read_results(&self) -> Result<Option<ResultsFile>, BackendError> {
        let results_path = self.meta_dir().join(RESULTS_FILENAME);
        if !results_path.is_file() {
            return Ok(None);
        }
        read_bincode(&results_path).map(Some)
    }

    pub fn write_results(&self, results: &ResultsFile) -> Result<(), BackendError> {
        write_bincode(&self.meta_dir().join(RESULTS_FILENAME), results)
    }
}

fn read_bincode<T: DeserializeOwned>(path: &Path) -> Result<T, BackendError> {
    let bytes = fs::read(path).map_err(|source| BackendError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let (value, _): (T, usize) =
        bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).map_err(
            |source| BackendError::BincodeDecode {
                path: path.to_path_buf(),
                source,
            },
        )?;
    Ok(value)
}

fn write_bincode<T: Serialize>(path: &Path, value: &T) -> Result<(), BackendError> {
    let bytes = bincode::serde::encode_to_vec(value, bincode::config::standard())?;
    fs::write(path, bytes).map_err(|source| BackendError::Io {
        path: path.to_path_buf(),
        source,
    })
}
