//! Editing session for one selection: stores, gestures, history ordering and save flow.

pub mod gesture;
pub mod history;
pub mod layout;
pub mod overrides;
mod session;
pub mod text_lines;
pub mod viewport;

use thiserror::Error;

use crate::bridge::SelectionKey;
use crate::state::{SessionPhase, StateError};
use overrides::OverrideError;

pub use history::{HistoryAction, HistoryDomain, SnapshotHistory};
pub use layout::StageLayout;
pub use session::{EditorSession, LoadFailure};
pub use viewport::{ViewState, ViewportController};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no selection is open")]
    NoSelection,
    #[error("editing is unavailable while the session is {phase:?}")]
    EditingDisabled { phase: SessionPhase },
    #[error("response for {received} arrived after the selection changed")]
    StaleResponse { received: SelectionKey },
    #[error("no save is in flight")]
    NoSaveInFlight,
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Override(#[from] OverrideError),
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;
