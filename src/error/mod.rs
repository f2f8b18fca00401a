use crate::bridge::BridgeError;
use crate::editor::overrides::OverrideError;
use crate::editor::SessionError;
use crate::state::StateError;
use crate::storage::StorageError;
use thiserror::Error;

pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Override(#[from] OverrideError),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Session(#[from] SessionError),
}
