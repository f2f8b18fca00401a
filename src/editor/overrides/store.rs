use serde_json::Value;

use super::{apply_ops, diff, is_unset_value, number_value, OverrideLeaf, OverrideResult, PatchOp};
use crate::editor::history::{HistoryAction, SnapshotHistory, DEFAULT_HISTORY_LIMIT};

/// Well-known override paths written by direct manipulation.
pub struct OverridePaths;

impl OverridePaths {
    pub const BG_ZOOM: &'static str = "overrides.bg_pan_zoom.zoom";
    pub const BG_PAN_X: &'static str = "overrides.bg_pan_zoom.pan_x";
    pub const BG_PAN_Y: &'static str = "overrides.bg_pan_zoom.pan_y";
    pub const PORTRAIT_OFFSET_X: &'static str = "overrides.portrait.offset_x";
    pub const PORTRAIT_OFFSET_Y: &'static str = "overrides.portrait.offset_y";
    pub const PORTRAIT_ZOOM: &'static str = "overrides.portrait.zoom";
    pub const LEGACY_TEXT_OFFSET_X: &'static str = "overrides.text_offset_x";
    pub const LEGACY_TEXT_OFFSET_Y: &'static str = "overrides.text_offset_y";
    pub const LEGACY_TEXT_SCALE: &'static str = "overrides.text_scale";
}

/// `current` forked from `base`, plus the computed defaults used when a path is absent.
#[derive(Debug, Clone)]
pub struct LayerOverrideStore {
    base: OverrideLeaf,
    current: OverrideLeaf,
    defaults: OverrideLeaf,
    history: SnapshotHistory<OverrideLeaf>,
}

impl Default for LayerOverrideStore {
    fn default() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl LayerOverrideStore {
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            base: OverrideLeaf::new(),
            current: OverrideLeaf::new(),
            defaults: OverrideLeaf::new(),
            history: SnapshotHistory::with_limit(limit),
        }
    }

    /// Replaces base, current and defaults and drops all history.
    pub fn load_base(&mut self, base: OverrideLeaf, defaults: OverrideLeaf) {
        self.current = base.clone();
        self.base = base;
        self.defaults = defaults;
        self.history.clear();
    }

    pub fn base(&self) -> &OverrideLeaf {
        &self.base
    }

    pub fn current(&self) -> &OverrideLeaf {
        &self.current
    }

    pub fn snapshot(&self) -> OverrideLeaf {
        self.current.clone()
    }

    pub fn history(&self) -> &SnapshotHistory<OverrideLeaf> {
        &self.history
    }

    /// Override value if present, then computed default, then `fallback`.
    pub fn effective_f64(&self, path: &str, fallback: f64) -> f64 {
        self.current
            .get_f64(path)
            .or_else(|| self.defaults.get_f64(path))
            .filter(|value| value.is_finite())
            .unwrap_or(fallback)
    }

    /// Applies ops and records one undo entry when the leaf actually changed.
    pub fn apply_ops(&mut self, ops: &[PatchOp]) -> OverrideResult<bool> {
        let next = match apply_ops(&self.current, ops)? {
            std::borrow::Cow::Borrowed(_) => return Ok(false),
            std::borrow::Cow::Owned(next) => next,
        };
        let previous = std::mem::replace(&mut self.current, next);
        self.history.record(previous);
        Ok(true)
    }

    /// Merges a flat patch; null and empty-string values unset the path.
    ///
    /// With `record_history == false` nothing is pushed, and the caller owns pushing
    /// one consolidated snapshot through [`Self::commit_snapshot`] at interaction end.
    /// Redo is cleared either way.
    pub fn merge_patch<I, K>(&mut self, patch: I, record_history: bool) -> bool
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut next = self.current.clone();
        for (path, value) in patch {
            let path = path.into();
            if is_unset_value(&value) {
                next.unset(&path);
            } else {
                next.set(path, value);
            }
        }
        if next == self.current {
            return false;
        }
        let previous = std::mem::replace(&mut self.current, next);
        if record_history {
            self.history.record(previous);
        } else {
            self.history.clear_redo();
        }
        true
    }

    pub fn set_f64(&mut self, path: &str, value: f64, record_history: bool) -> bool {
        self.merge_patch([(path, number_value(value))], record_history)
    }

    /// Writes `(path, value, fallback)` numbers, skipping paths whose effective value
    /// already equals `value` so a click without movement leaves the leaf untouched.
    pub fn merge_numbers(&mut self, values: &[(&str, f64, f64)], record_history: bool) -> bool {
        let patch: Vec<(&str, Value)> = values
            .iter()
            .filter(|(path, value, fallback)| {
                (self.effective_f64(path, *fallback) - value).abs() > f64::EPSILON
            })
            .map(|(path, value, _)| (*path, number_value(*value)))
            .collect();
        !patch.is_empty() && self.merge_patch(patch, record_history)
    }

    /// Pushes the pre-interaction snapshot if the interaction changed anything.
    pub fn commit_snapshot(&mut self, pre: OverrideLeaf) -> bool {
        self.history.record_if_changed(pre, &self.current)
    }

    pub fn undo(&mut self) -> bool {
        self.transfer(HistoryAction::Undo)
    }

    pub fn redo(&mut self) -> bool {
        self.transfer(HistoryAction::Redo)
    }

    fn transfer(&mut self, action: HistoryAction) -> bool {
        let current = self.current.clone();
        match self.history.transfer(action, current) {
            Some(snapshot) => {
                self.current = snapshot;
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear_redo(&mut self) {
        self.history.clear_redo();
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn reset_to_base(&mut self) -> bool {
        if self.current == self.base {
            return false;
        }
        let previous = std::mem::replace(&mut self.current, self.base.clone());
        self.history.record(previous);
        true
    }

    pub fn diff(&self) -> Vec<PatchOp> {
        diff(&self.base, &self.current)
    }

    pub fn unsaved_change_count(&self) -> usize {
        self.diff().len()
    }

    pub fn is_dirty(&self) -> bool {
        self.current != self.base
    }

    /// After a successful save the submitted leaf becomes the new base.
    pub fn mark_saved(&mut self, submitted: OverrideLeaf) {
        self.base = submitted;
    }
}
