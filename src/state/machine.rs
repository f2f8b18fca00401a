use super::error::{StateError, StateResult};
use super::{event::StateTransition, SessionEvent, SessionPhase};

const TRANSITION_HISTORY_LIMIT: usize = 64;

#[derive(Debug)]
pub struct StateMachine {
    state: SessionPhase,
    transition_history: Vec<StateTransition>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: SessionPhase::default(),
            transition_history: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionPhase {
        self.state
    }

    pub fn can_transition(&self, event: SessionEvent) -> bool {
        self.next_state(event).is_some()
    }

    pub fn next_state(&self, event: SessionEvent) -> Option<SessionPhase> {
        use SessionEvent::*;
        match (self.state, event) {
            (_, SelectionRequested) => Some(SessionPhase::Loading),
            (_, Closed) => Some(SessionPhase::Unloaded),
            (SessionPhase::Loading, Loaded) => Some(SessionPhase::Ready),
            (SessionPhase::Loading, LoadFailed) => Some(SessionPhase::LoadFailed),
            (SessionPhase::Ready, SaveStarted) => Some(SessionPhase::Saving),
            (SessionPhase::Saving, SaveFinished) => Some(SessionPhase::Ready),
            (SessionPhase::Saving, SaveFailed) => Some(SessionPhase::Ready),
            _ => None,
        }
    }

    pub fn transition(&mut self, event: SessionEvent) -> StateResult<SessionPhase> {
        tracing::debug!(from = ?self.state, event = ?event, "request session transition");
        let next = self.next_state(event).ok_or_else(|| {
            let from = self.state;
            tracing::warn!(from = ?from, event = ?event, "invalid session transition requested");
            StateError::InvalidStateTransition { from, event }
        })?;

        let record = StateTransition::new(Some(self.state), event, next);
        self.state = next;
        self.transition_history.push(record);
        if self.transition_history.len() > TRANSITION_HISTORY_LIMIT {
            self.transition_history.remove(0);
        }

        Ok(self.state)
    }

    pub fn history(&self) -> &[StateTransition] {
        &self.transition_history
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionPhase::{:?}", self.state)
    }
}
