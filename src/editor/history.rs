use std::collections::VecDeque;

pub const DEFAULT_HISTORY_LIMIT: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryAction {
    Undo,
    Redo,
}

impl HistoryAction {
    pub const fn applied_message(self) -> &'static str {
        match self {
            Self::Undo => "undo applied",
            Self::Redo => "redo applied",
        }
    }

    pub const fn empty_message(self) -> &'static str {
        match self {
            Self::Undo => "undo stack empty",
            Self::Redo => "redo stack empty",
        }
    }
}

/// Store an undo entry was committed to, so undo can run across stores in commit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistoryDomain {
    Overrides,
    TextLines,
}

impl HistoryDomain {
    pub const fn other(self) -> Self {
        match self {
            Self::Overrides => Self::TextLines,
            Self::TextLines => Self::Overrides,
        }
    }
}

/// Bounded undo/redo stacks of full snapshots.
///
/// Callers record the state from *before* an interaction; intermediate frames of a
/// continuous gesture are never recorded.
#[derive(Debug, Clone)]
pub struct SnapshotHistory<T> {
    undo_stack: VecDeque<T>,
    redo_stack: Vec<T>,
    limit: usize,
}

impl<T: Clone + PartialEq> Default for SnapshotHistory<T> {
    fn default() -> Self {
        Self::with_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl<T: Clone + PartialEq> SnapshotHistory<T> {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            limit: limit.max(1),
        }
    }

    pub fn record(&mut self, snapshot: T) {
        self.undo_stack.push_back(snapshot);
        while self.undo_stack.len() > self.limit {
            self.undo_stack.pop_front();
        }
        self.redo_stack.clear();
    }

    /// Records `pre` only if it differs from `current`. Returns whether an entry was pushed.
    pub fn record_if_changed(&mut self, pre: T, current: &T) -> bool {
        if &pre == current {
            return false;
        }
        self.record(pre);
        true
    }

    pub fn undo(&mut self, current: T) -> Option<T> {
        let snapshot = self.undo_stack.pop_back()?;
        self.redo_stack.push(current);
        Some(snapshot)
    }

    pub fn redo(&mut self, current: T) -> Option<T> {
        let snapshot = self.redo_stack.pop()?;
        self.undo_stack.push_back(current);
        while self.undo_stack.len() > self.limit {
            self.undo_stack.pop_front();
        }
        Some(snapshot)
    }

    pub fn transfer(&mut self, action: HistoryAction, current: T) -> Option<T> {
        match action {
            HistoryAction::Undo => self.undo(current),
            HistoryAction::Redo => self.redo(current),
        }
    }

    pub fn clear_redo(&mut self) {
        self.redo_stack.clear();
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }
}
