use super::{TextLineMap, TextLineSpec};
use crate::editor::history::{HistoryAction, SnapshotHistory, DEFAULT_HISTORY_LIMIT};

/// Slot-key to spec map with the same base/current/history contract as the override store.
///
/// Identity specs are never stored: an absent slot reads as [`TextLineSpec::default`], so
/// value equality of two maps is equality of every slot's effective spec.
#[derive(Debug, Clone)]
pub struct TextLineSpecStore {
    base: TextLineMap,
    current: TextLineMap,
    history: SnapshotHistory<TextLineMap>,
}

impl Default for TextLineSpecStore {
    fn default() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl TextLineSpecStore {
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            base: TextLineMap::new(),
            current: TextLineMap::new(),
            history: SnapshotHistory::with_limit(limit),
        }
    }

    pub fn load_base(&mut self, base: TextLineMap) {
        let base = normalized(base);
        self.current = base.clone();
        self.base = base;
        self.history.clear();
    }

    pub fn base(&self) -> &TextLineMap {
        &self.base
    }

    pub fn current(&self) -> &TextLineMap {
        &self.current
    }

    pub fn snapshot(&self) -> TextLineMap {
        self.current.clone()
    }

    pub fn history(&self) -> &SnapshotHistory<TextLineMap> {
        &self.history
    }

    /// Stored spec, or the identity spec for slots never touched.
    pub fn spec(&self, slot: &str) -> TextLineSpec {
        self.current.get(slot).copied().unwrap_or_default()
    }

    pub fn set_spec(&mut self, slot: &str, spec: TextLineSpec, record_history: bool) -> bool {
        let spec = spec.clamped();
        if self.spec(slot) == spec {
            return false;
        }
        let previous = self.current.clone();
        store_spec(&mut self.current, slot, spec);
        if record_history {
            self.history.record(previous);
        } else {
            self.history.clear_redo();
        }
        true
    }

    /// Applies `update` to every listed slot as one change. Returns whether anything changed.
    pub fn update_all<'a, I, F>(&mut self, slots: I, record_history: bool, mut update: F) -> bool
    where
        I: IntoIterator<Item = &'a str>,
        F: FnMut(TextLineSpec) -> TextLineSpec,
    {
        let mut next = self.current.clone();
        for slot in slots {
            let spec = next.get(slot).copied().unwrap_or_default();
            let updated = update(spec).clamped();
            if updated != spec {
                store_spec(&mut next, slot, updated);
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

    pub fn commit_snapshot(&mut self, pre: TextLineMap) -> bool {
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

    pub fn is_dirty(&self) -> bool {
        self.current != self.base
    }

    /// Submitted maps may list identity specs for every slot; they compare as absent.
    pub fn mark_saved(&mut self, submitted: TextLineMap) {
        self.base = normalized(submitted);
    }
}

fn normalized(map: TextLineMap) -> TextLineMap {
    map.into_iter()
        .map(|(key, spec)| (key, spec.clamped()))
        .filter(|(_, spec)| !spec.is_default())
        .collect()
}

fn store_spec(map: &mut TextLineMap, slot: &str, spec: TextLineSpec) {
    if spec.is_default() {
        map.remove(slot);
    } else {
        map.insert(slot.to_string(), spec);
    }
}
