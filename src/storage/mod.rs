//! Local-only state that never reaches the backend: presets, recent selections, UI toggles.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bridge::SelectionKey;
use crate::config::APP_DIR;
use crate::editor::overrides::{diff, OverrideLeaf, PatchOp};

const LOCAL_STATE_FILE: &str = "local_state.json";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("missing HOME environment variable")]
    MissingHomeDirectory,
    #[error("preset name is empty")]
    EmptyPresetName,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("local state is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Named set of override ops captured from a session, re-applied as one undoable edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub id: String,
    pub name: String,
    /// Seconds since the Unix epoch.
    pub created_at: u64,
    pub ops: Vec<PatchOp>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalState {
    pub presets: Vec<Preset>,
    /// Most recent first.
    pub recent_selections: Vec<SelectionKey>,
    pub ui_toggles: BTreeMap<String, bool>,
}

impl LocalState {
    /// Captures every path of `current` as a set op.
    pub fn save_preset(
        &mut self,
        name: &str,
        current: &OverrideLeaf,
        created_at: u64,
    ) -> StorageResult<&Preset> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StorageError::EmptyPresetName);
        }
        let mut suffix = 0usize;
        let id = loop {
            let candidate = format!("preset-{created_at}-{suffix}");
            if self.preset(&candidate).is_none() {
                break candidate;
            }
            suffix += 1;
        };
        self.presets.push(Preset {
            id,
            name: name.to_string(),
            created_at,
            ops: diff(&OverrideLeaf::new(), current),
        });
        let index = self.presets.len() - 1;
        Ok(&self.presets[index])
    }

    /// [`Self::save_preset`] stamped with the current wall-clock time.
    pub fn capture_preset(&mut self, name: &str, current: &OverrideLeaf) -> StorageResult<&Preset> {
        self.save_preset(name, current, now_epoch_secs())
    }

    pub fn preset(&self, id: &str) -> Option<&Preset> {
        self.presets.iter().find(|preset| preset.id == id)
    }

    pub fn delete_preset(&mut self, id: &str) -> bool {
        let before = self.presets.len();
        self.presets.retain(|preset| preset.id != id);
        self.presets.len() != before
    }

    pub fn rename_preset(&mut self, id: &str, name: &str) -> StorageResult<bool> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StorageError::EmptyPresetName);
        }
        Ok(match self.presets.iter_mut().find(|preset| preset.id == id) {
            Some(preset) => {
                preset.name = name.to_string();
                true
            }
            None => false,
        })
    }

    /// Moves `selection` to the front, dropping duplicates and anything past `limit`.
    pub fn push_recent_selection(&mut self, selection: SelectionKey, limit: usize) {
        self.recent_selections.retain(|existing| *existing != selection);
        self.recent_selections.insert(0, selection);
        self.recent_selections.truncate(limit);
    }

    pub fn toggle(&self, name: &str) -> bool {
        self.ui_toggles.get(name).copied().unwrap_or(false)
    }

    pub fn set_toggle(&mut self, name: impl Into<String>, value: bool) {
        self.ui_toggles.insert(name.into(), value);
    }
}

#[derive(Debug, Clone)]
pub struct LocalStateStore {
    path: PathBuf,
}

impl LocalStateStore {
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn with_default_path() -> StorageResult<Self> {
        let data_home = std::env::var_os("XDG_DATA_HOME").map(PathBuf::from);
        let home = std::env::var_os("HOME").map(PathBuf::from);
        Ok(Self::with_path(local_state_path(
            data_home.as_deref(),
            home.as_deref(),
        )?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file reads as empty state.
    pub fn load(&self) -> StorageResult<LocalState> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(LocalState::default()),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    pub fn load_or_default(&self) -> LocalState {
        self.load().unwrap_or_else(|err| {
            tracing::warn!(
                path = %self.path.display(),
                %err,
                "failed to load local state; starting empty"
            );
            LocalState::default()
        })
    }

    /// Writes through a sibling temp file so a crash never leaves a truncated file behind.
    pub fn save(&self, state: &LocalState) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp = self.path.with_extension("json.tmp");
        fs::write(&temp, serde_json::to_vec_pretty(state)?)?;
        fs::rename(&temp, &self.path)?;
        tracing::debug!(
            path = %self.path.display(),
            presets = state.presets.len(),
            "local state saved"
        );
        Ok(())
    }
}

fn local_state_path(data_home: Option<&Path>, home: Option<&Path>) -> StorageResult<PathBuf> {
    let mut path = match data_home.filter(|path| !path.as_os_str().is_empty()) {
        Some(data_home) => data_home.to_path_buf(),
        None => home
            .ok_or(StorageError::MissingHomeDirectory)?
            .join(".local")
            .join("share"),
    };
    path.push(APP_DIR);
    path.push(LOCAL_STATE_FILE);
    Ok(path)
}

pub fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
