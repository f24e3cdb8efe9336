//! On-disk tuner state: the resumable snapshot, the per-iteration history log
//! and the best-parameters artifact. All files are pretty-printed JSON.

use crate::engine::CandidateSet;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const STATE_FILE: &str = "spsa_state.json";
pub const HISTORY_FILE: &str = "spsa_history.json";
pub const BEST_PARAMS_FILE: &str = "best_params.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TunerState {
    /// Internal floating-point value of every parameter.
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
    #[serde(default)]
    pub best_params: CandidateSet,
    /// Number of fully completed iterations.
    #[serde(default)]
    pub iteration: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub iteration: u32,
    pub score: f64,
    /// θ+ vs θ- rating difference rounded to 0.1; 0 when the score was 0 or 1.
    pub elo_diff: f64,
    pub params: CandidateSet,
}

#[derive(Debug)]
pub enum StateError {
    Io { path: PathBuf, error: io::Error },
    Corrupt { path: PathBuf, error: serde_json::Error },
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::Io { path, error } => write!(f, "{}: {}", path.display(), error),
            StateError::Corrupt { path, error } => {
                write!(f, "{} is not a valid state file: {}", path.display(), error)
            }
        }
    }
}

impl std::error::Error for StateError {}

/// The directory holding the state files of one tuning run.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `None` when no run has been saved here yet.
    pub fn load_state(&self) -> Result<Option<TunerState>, StateError> {
        self.read_json(STATE_FILE)
    }

    pub fn load_history(&self) -> Result<Vec<HistoryEntry>, StateError> {
        Ok(self.read_json(HISTORY_FILE)?.unwrap_or_default())
    }

    pub fn save(&self, state: &TunerState, history: &[HistoryEntry]) -> Result<(), StateError> {
        self.write_json(STATE_FILE, state)?;
        self.write_json(HISTORY_FILE, &history)
    }

    pub fn save_best(&self, best: &CandidateSet) -> Result<PathBuf, StateError> {
        self.write_json(BEST_PARAMS_FILE, best)?;
        Ok(self.dir.join(BEST_PARAMS_FILE))
    }

    fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, StateError> {
        let path = self.dir.join(name);

        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(StateError::Io { path, error }),
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|error| StateError::Corrupt { path, error })
    }

    /// Writes next to the target and renames, so a crash never leaves a torn file.
    fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<(), StateError> {
        let path = self.dir.join(name);
        let tmp_path = self.dir.join(format!("{}.tmp", name));
        let io_error = |error| StateError::Io {
            path: path.clone(),
            error,
        };

        fs::create_dir_all(&self.dir).map_err(io_error)?;

        let json = serde_json::to_string_pretty(value).map_err(|error| StateError::Corrupt {
            path: path.clone(),
            error,
        })?;
        fs::write(&tmp_path, json + "\n").map_err(io_error)?;
        fs::rename(&tmp_path, &path).map_err(io_error)?;

        log::trace!("Wrote {}", path.display());
        Ok(())
    }
}
