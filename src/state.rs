// src/state.rs

use crate::core::paths::{self, PathError};
use crate::models::WorkDirHistory;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("I/O error on history file '{path}'")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to decode history file '{path}'")]
    Decode {
        path: PathBuf,
        #[source]
        source: bincode::error::DecodeError,
    },
    #[error("Failed to encode history: {0}")]
    Encode(#[from] bincode::error::EncodeError),
}

/// Represents the state of the work directory history.
/// It holds the current state and, once a mutation was requested, a snapshot of the
/// state as loaded.
#[derive(Debug)]
enum HistoryState {
    /// The state is clean, no mutations have been requested yet.
    Pristine(WorkDirHistory),
    /// A mutation has been requested. We now hold both the original snapshot
    /// and the current, mutable state.
    Dirty {
        original: WorkDirHistory,
        current: WorkDirHistory,
    },
}

/// The last work directory used for each test suite, persisted in `last_used.bin`.
#[derive(Debug)]
pub struct History {
    path: PathBuf,
    state: HistoryState,
}

impl History {
    /// Loads the history from the launcher config directory.
    pub fn load() -> Result<Self, HistoryError> {
        Self::load_from(paths::get_last_used_path()?)
    }

    /// Loads the history from `path`. A missing file yields an empty history.
    pub fn load_from(path: PathBuf) -> Result<Self, HistoryError> {
        let history = if path.is_file() {
            let bytes = fs::read(&path).map_err(|source| HistoryError::Io {
                path: path.clone(),
                source,
            })?;
            let (history, _): (WorkDirHistory, usize) =
                bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).map_err(
                    |source| HistoryError::Decode {
                        path: path.clone(),
                        source,
                    },
                )?;
            history
        } else {
            WorkDirHistory::default()
        };
        Ok(Self {
            path,
            state: HistoryState::Pristine(history),
        })
    }

    /// Checks if the history needs to be saved by comparing the current state
    /// against the original snapshot, if one exists.
    pub fn needs_saving(&self) -> bool {
        match &self.state {
            HistoryState::Pristine(_) => false,
            HistoryState::Dirty { original, current } => original != current,
        }
    }

    pub fn entries(&self) -> &WorkDirHistory {
        match &self.state {
            HistoryState::Pristine(history) => history,
            HistoryState::Dirty { current, .. } => current,
        }
    }

    /// Mutable access. The first call snapshots the loaded state.
    fn entries_mut(&mut self) -> &mut WorkDirHistory {
        if let HistoryState::Pristine(_) = self.state {
            self.state = match std::mem::replace(
                &mut self.state,
                HistoryState::Pristine(WorkDirHistory::default()),
            ) {
                HistoryState::Pristine(history) => HistoryState::Dirty {
                    original: history.clone(),
                    current: history,
                },
                dirty => dirty,
            };
        }

        match &mut self.state {
            HistoryState::Dirty { current, .. } => current,
            HistoryState::Pristine(history) => history,
        }
    }

    pub fn last_work_dir(&self, suite_root: &Path) -> Option<&Path> {
        self.entries()
            .entries
            .get(&Self::key(suite_root))
            .map(PathBuf::as_path)
    }

    pub fn record(&mut self, suite_root: &Path, work_dir: &Path) {
        let key = Self::key(suite_root);
        log::debug!("Remembering work directory '{}' for '{}'", work_dir.display(), key);
        self.entries_mut()
            .entries
            .insert(key, work_dir.to_path_buf());
    }

    fn key(suite_root: &Path) -> String {
        paths::canonical_or_original(suite_root)
            .to_string_lossy()
            .into_owned()
    }

    /// Writes the history when it changed since it was loaded.
    pub fn save(&self) -> Result<(), HistoryError> {
        if !self.needs_saving() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| HistoryError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let bytes = bincode::serde::encode_to_vec(self.entries(), bincode::config::standard())?;
        fs::write(&self.path, bytes).map_err(|source| HistoryError::Io {
            path: self.path.clone(),
            source,
        })
    }
}
