pub mod bridge;
pub mod config;
pub mod editor;
pub mod error;
pub mod geometry;
pub mod input;
pub mod logging;
pub mod preview;
pub mod state;
pub mod storage;
pub use error::{AppError, AppResult};

use bridge::{ContextSource, SelectionKey};
use editor::EditorSession;
use state::SessionPhase;
use storage::LocalState;

/// Entrypoint used by host integrations: installs logging, reads `config.json`, loads
/// `selection` and remembers it among the recent selections.
pub fn open_session<S: ContextSource + ?Sized>(
    source: &S,
    selection: SelectionKey,
    viewport: (f64, f64),
    local: &mut LocalState,
) -> AppResult<EditorSession> {
    logging::init();
    let config = config::load_editor_config();
    let recent_limit = config.recent_selection_limit;
    let mut session = EditorSession::new(config, viewport.0, viewport.1);

    let phase = session.load_with(source, selection.clone())?;
    if phase == SessionPhase::Ready {
        local.push_recent_selection(selection, recent_limit);
    }
    tracing::info!(phase = ?phase, "session opened");
    Ok(session)
}
