/// Lifecycle phase of the editor session for the current selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Unloaded,
    Loading,
    Ready,
    Saving,
    LoadFailed,
}

impl SessionPhase {
    /// Gestures and patch ops are accepted only once base state is loaded.
    pub const fn editing_enabled(self) -> bool {
        matches!(self, Self::Ready | Self::Saving)
    }

    pub const fn can_save(self) -> bool {
        matches!(self, Self::Ready)
    }
}
