// src/core/test_support.rs

//! Fixtures shared by the in-crate tests.

use crate::core::backend::FsBackend;
use crate::core::resolver::Resolver;
use crate::core::suite::{TestSuite, WorkDirectory};
use crate::models::ConfigFile;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Creates `<parent>/<name>/testsuite.toml` (and an empty `tests/`) and returns the root.
pub(crate) fn write_suite(parent: &Path, name: &str, id: Option<&str>) -> PathBuf {
    let root = parent.join(name);
    fs::create_dir_all(root.join("tests")).unwrap();
    let mut descriptor = format!("name = \"{}\"\n", name);
    if let Some(id) = id {
        descriptor.push_str(&format!("id = \"{}\"\n", id));
    }
    fs::write(root.join("testsuite.toml"), descriptor).unwrap();
    root
}

pub(crate) fn write_suite_with_defaults(
    parent: &Path,
    name: &str,
    defaults: &[(&str, &str)],
) -> PathBuf {
    let root = write_suite(parent, name, None);
    let mut descriptor = format!("name = \"{}\"\n\n[defaults]\n", name);
    for (key, value) in defaults {
        descriptor.push_str(&format!("{} = \"{}\"\n", key, value));
    }
    fs::write(root.join("testsuite.toml"), descriptor).unwrap();
    root
}

/// Writes `tests/<name>.toml` with the given command line.
pub(crate) fn write_test(suite_root: &Path, name: &str, command: &str) -> PathBuf {
    let path = suite_root.join("tests").join(format!("{}.toml", name));
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, format!("command = '''{}'''\n", command)).unwrap();
    path
}

pub(crate) fn open_suite(root: &Path) -> Arc<TestSuite> {
    Arc::new(TestSuite::open(root).unwrap())
}

/// Creates a work directory for the suite at `suite_root` and returns its path.
pub(crate) fn write_work_dir(suite_root: &Path, path: &Path) -> PathBuf {
    WorkDirectory::create(path, open_suite(suite_root)).unwrap();
    path.to_path_buf()
}

/// Writes a JSON configuration file naming `suite_root`.
pub(crate) fn write_config(
    dir: &Path,
    file_name: &str,
    suite_root: &Path,
    values: &[(&str, &str)],
    template: Option<&Path>,
) -> PathBuf {
    let file = ConfigFile {
        test_suite: suite_root.to_path_buf(),
        work_dir: None,
        template: template.map(Path::to_path_buf),
        is_template: false,
        values: values
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>(),
    };
    let path = dir.join(file_name);
    fs::write(&path, serde_json::to_string_pretty(&file).unwrap()).unwrap();
    path
}

pub(crate) fn write_properties(dir: &Path, file_name: &str, content: &str) -> PathBuf {
    let path = dir.join(file_name);
    fs::write(&path, content).unwrap();
    path
}

pub(crate) fn fs_resolver() -> Resolver {
    Resolver::new(Box::new(FsBackend::new()))
}

pub(crate) fn canonical(path: &Path) -> PathBuf {
    dunce::canonicalize(path).unwrap()
}
