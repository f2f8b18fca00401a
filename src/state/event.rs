use super::SessionPhase;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    SelectionRequested,
    Loaded,
    LoadFailed,
    SaveStarted,
    SaveFinished,
    SaveFailed,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: Option<SessionPhase>,
    pub event: SessionEvent,
    pub to: SessionPhase,
}

impl StateTransition {
    pub const fn new(from: Option<SessionPhase>, event: SessionEvent, to: SessionPhase) -> Self {
        Self { from, event, to }
    }
}
