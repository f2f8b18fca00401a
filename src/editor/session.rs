use std::collections::BTreeSet;
use std::time::Instant;

use serde_json::Value;

use super::gesture::{
    ActiveTool, DragKind, GestureContext, GestureRouter, LayerId, PointerEvent, SnapGuides,
    WheelEvent,
};
use super::history::{HistoryAction, HistoryDomain};
use super::layout::StageLayout;
use super::overrides::{LayerOverrideStore, OverrideLeaf, PatchOp};
use super::text_lines::{LegacyTextMigration, TextLineMap, TextLineSpec, TextLineSpecStore};
use super::viewport::ViewportController;
use super::{SessionError, SessionResult};
use crate::bridge::{
    submit_save, BridgeResult, ContextSource, EditorContext, PersistenceBridge, PreviewImage,
    PreviewRequest, SaveRequest, SelectionKey,
};
use crate::config::EditorConfig;
use crate::input::{resolve_shortcut, InputContext, ShortcutAction, ShortcutKey, ShortcutModifiers};
use crate::preview::PreviewScheduler;
use crate::state::{SessionEvent, SessionPhase, StateError, StateMachine};
use crate::storage::Preset;

/// Field-level reasons a selection failed to load.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoadFailure {
    pub context_error: Option<String>,
    pub text_lines_error: Option<String>,
}

/// Pre-interaction snapshots for slider-style edits that coalesce into one undo entry.
#[derive(Debug, Default)]
struct PendingInteraction {
    overrides: Option<OverrideLeaf>,
    text_lines: Option<TextLineMap>,
}

#[derive(Debug)]
pub struct EditorSession {
    config: EditorConfig,
    phase: StateMachine,
    selection: Option<SelectionKey>,
    context: EditorContext,
    viewport: ViewportController,
    overrides: LayerOverrideStore,
    text_lines: TextLineSpecStore,
    router: GestureRouter,
    selected: Option<LayerId>,
    text_field_focused: bool,
    migration: LegacyTextMigration,
    preview: PreviewScheduler,
    undo_order: Vec<HistoryDomain>,
    redo_order: Vec<HistoryDomain>,
    interaction: PendingInteraction,
    pending_save: Option<SaveRequest>,
    load_failure: Option<LoadFailure>,
    last_error: Option<String>,
}

impl EditorSession {
    pub fn new(config: EditorConfig, viewport_width: f64, viewport_height: f64) -> Self {
        Self {
            overrides: LayerOverrideStore::with_history_limit(config.history_limit),
            text_lines: TextLineSpecStore::with_history_limit(config.history_limit),
            preview: PreviewScheduler::new(config.preview_debounce()),
            viewport: ViewportController::new(viewport_width, viewport_height),
            phase: StateMachine::new(),
            selection: None,
            context: EditorContext::default(),
            router: GestureRouter::default(),
            selected: None,
            text_field_focused: false,
            migration: LegacyTextMigration::default(),
            undo_order: Vec::new(),
            redo_order: Vec::new(),
            interaction: PendingInteraction::default(),
            pending_save: None,
            load_failure: None,
            last_error: None,
            config,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase.state()
    }

    pub fn state_machine(&self) -> &StateMachine {
        &self.phase
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn selection(&self) -> Option<&SelectionKey> {
        self.selection.as_ref()
    }

    pub fn context(&self) -> &EditorContext {
        &self.context
    }

    pub fn viewport(&self) -> &ViewportController {
        &self.viewport
    }

    pub fn overrides(&self) -> &LayerOverrideStore {
        &self.overrides
    }

    pub fn text_lines(&self) -> &TextLineSpecStore {
        &self.text_lines
    }

    pub fn preview(&self) -> &PreviewScheduler {
        &self.preview
    }

    pub fn selected_layer(&self) -> Option<&LayerId> {
        self.selected.as_ref()
    }

    pub fn select_layer(&mut self, layer: Option<LayerId>) {
        self.selected = layer;
    }

    pub fn active_tool(&self) -> ActiveTool {
        self.router.tool()
    }

    pub fn active_drag(&self) -> Option<DragKind> {
        self.router.active_session().map(|session| session.kind())
    }

    pub fn snap_guides(&self) -> SnapGuides {
        self.router.snap_guides()
    }

    pub fn load_failure(&self) -> Option<&LoadFailure> {
        self.load_failure.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.last_error = None;
    }

    pub fn set_text_field_focused(&mut self, focused: bool) {
        self.text_field_focused = focused;
    }

    pub fn resize_viewport(&mut self, width: f64, height: f64) {
        self.viewport.resize(width, height);
    }

    fn editing_enabled(&self) -> bool {
        self.selection.is_some() && self.phase().editing_enabled()
    }

    fn ensure_editing(&self) -> SessionResult<()> {
        if self.editing_enabled() {
            Ok(())
        } else {
            Err(SessionError::EditingDisabled {
                phase: self.phase(),
            })
        }
    }

    fn split(&mut self) -> (&mut GestureRouter, GestureContext<'_>) {
        (
            &mut self.router,
            GestureContext {
                viewport: &mut self.viewport,
                overrides: &mut self.overrides,
                text_lines: &mut self.text_lines,
                context: &self.context,
                config: &self.config,
            },
        )
    }

    /// Drops everything tied to the previous selection. The migration guard survives so a
    /// reloaded selection is never folded twice.
    fn teardown(&mut self) {
        self.context = EditorContext::default();
        self.overrides = LayerOverrideStore::with_history_limit(self.config.history_limit);
        self.text_lines = TextLineSpecStore::with_history_limit(self.config.history_limit);
        self.router = GestureRouter::default();
        self.viewport.reset();
        self.preview.reset();
        self.selected = None;
        self.undo_order.clear();
        self.redo_order.clear();
        self.interaction = PendingInteraction::default();
        self.pending_save = None;
        self.load_failure = None;
        self.last_error = None;
    }

    pub fn begin_selection(&mut self, selection: SelectionKey) -> SessionResult<()> {
        self.teardown();
        self.phase.transition(SessionEvent::SelectionRequested)?;
        tracing::info!(selection = %selection, "loading selection");
        self.selection = Some(selection);
        Ok(())
    }

    /// Installs the loaded inputs for `selection`. Both loads must succeed; otherwise the
    /// session lands in `LoadFailed` with the failing fields recorded.
    pub fn finish_loading(
        &mut self,
        selection: &SelectionKey,
        context: BridgeResult<EditorContext>,
        text_lines: BridgeResult<TextLineMap>,
    ) -> SessionResult<SessionPhase> {
        if self.selection.as_ref() != Some(selection) || self.phase() != SessionPhase::Loading {
            tracing::debug!(selection = %selection, "dropping stale load response");
            return Err(SessionError::StaleResponse {
                received: selection.clone(),
            });
        }

        let (context, text_lines) = match (context, text_lines) {
            (Ok(context), Ok(text_lines)) => (context, text_lines),
            (context, text_lines) => {
                let failure = LoadFailure {
                    context_error: context.err().map(|err| err.to_string()),
                    text_lines_error: text_lines.err().map(|err| err.to_string()),
                };
                tracing::warn!(
                    selection = %selection,
                    context_error = ?failure.context_error,
                    text_lines_error = ?failure.text_lines_error,
                    "selection failed to load"
                );
                self.load_failure = Some(failure);
                return Ok(self.phase.transition(SessionEvent::LoadFailed)?);
            }
        };

        self.overrides
            .load_base(context.overrides.clone(), context.defaults.clone());
        self.text_lines.load_base(text_lines);
        let outcome = self.migration.migrate(
            selection,
            context.slot_keys(),
            &mut self.overrides,
            &mut self.text_lines,
        );
        tracing::debug!(selection = %selection, ?outcome, "legacy text migration");
        self.context = context;
        let phase = self.phase.transition(SessionEvent::Loaded)?;
        tracing::info!(
            selection = %selection,
            slots = self.context.slots.len(),
            "selection ready"
        );
        Ok(phase)
    }

    pub fn load_with<S: ContextSource + ?Sized>(
        &mut self,
        source: &S,
        selection: SelectionKey,
    ) -> SessionResult<SessionPhase> {
        self.begin_selection(selection.clone())?;
        let context = source.load_context(&selection);
        let text_lines = source.load_text_lines(&selection);
        self.finish_loading(&selection, context, text_lines)
    }

    pub fn close(&mut self) -> SessionResult<()> {
        self.teardown();
        self.selection = None;
        self.phase.transition(SessionEvent::Closed)?;
        Ok(())
    }

    fn record_commit(&mut self, domain: HistoryDomain, now: Instant) {
        self.undo_order.push(domain);
        let limit = self.config.history_limit.saturating_mul(2).max(1);
        if self.undo_order.len() > limit {
            let excess = self.undo_order.len() - limit;
            self.undo_order.drain(..excess);
        }
        self.drop_redo();
        self.preview.request(now);
    }

    fn drop_redo(&mut self) {
        self.redo_order.clear();
        self.overrides.clear_redo();
        self.text_lines.clear_redo();
    }

    /// Bookkeeping for a store change that is not committed yet (drag frame, slider step).
    fn note_uncommitted_change(&mut self, now: Instant) {
        self.drop_redo();
        self.preview.request(now);
    }

    pub fn pointer_down(&mut self, event: PointerEvent) -> Option<DragKind> {
        if !self.editing_enabled() {
            return None;
        }
        let selected = self.selected.clone();
        let (router, mut cx) = self.split();
        let kind = router.pointer_down(&mut cx, event, selected.as_ref())?;
        let layer = router.active_session().and_then(|session| session.layer());
        if layer.is_some() {
            self.selected = layer;
        }
        Some(kind)
    }

    pub fn pointer_move(&mut self, event: PointerEvent, now: Instant) -> bool {
        let edits_stores = self
            .router
            .active_session()
            .is_some_and(|session| session.kind() != DragKind::ViewportPan);
        let (router, mut cx) = self.split();
        let changed = router.pointer_move(&mut cx, event);
        if changed && edits_stores {
            self.note_uncommitted_change(now);
        }
        changed
    }

    pub fn pointer_up(&mut self, event: PointerEvent, now: Instant) -> Option<HistoryDomain> {
        let (router, mut cx) = self.split();
        let domain = router.pointer_up(&mut cx, event)?;
        self.record_commit(domain, now);
        Some(domain)
    }

    pub fn pointer_cancel(&mut self, pointer_id: u32, now: Instant) -> Option<HistoryDomain> {
        let (router, mut cx) = self.split();
        let domain = router.pointer_cancel(&mut cx, pointer_id)?;
        self.record_commit(domain, now);
        Some(domain)
    }

    fn end_drag(&mut self, now: Instant) -> Option<HistoryDomain> {
        let (router, mut cx) = self.split();
        let domain = router.end_drag(&mut cx)?;
        self.record_commit(domain, now);
        Some(domain)
    }

    pub fn wheel(&mut self, event: WheelEvent, now: Instant) -> Option<HistoryDomain> {
        let layer_zoom = event.modifiers.alt && !event.modifiers.command();
        if layer_zoom && !self.editing_enabled() {
            return None;
        }
        let (router, mut cx) = self.split();
        let domain = router.wheel(&mut cx, event)?;
        self.record_commit(domain, now);
        Some(domain)
    }

    /// Resolves and runs a key press. Returns the action that was resolved, if any.
    pub fn handle_key(
        &mut self,
        key: ShortcutKey,
        modifiers: ShortcutModifiers,
        now: Instant,
    ) -> Option<ShortcutAction> {
        let context = InputContext {
            text_field_focused: self.text_field_focused,
            editing_enabled: self.editing_enabled(),
            drag_active: self.router.is_dragging(),
        };
        let action = resolve_shortcut(key, modifiers, context)?;
        match action {
            ShortcutAction::Nudge { dx, dy, step } => {
                let distance = self.config.nudge_distance(step);
                self.nudge_selected(f64::from(dx) * distance, f64::from(dy) * distance, now);
            }
            ShortcutAction::CycleSlotForward => self.cycle_slot(true),
            ShortcutAction::CycleSlotBackward => self.cycle_slot(false),
            ShortcutAction::ViewZoomIn => self.viewport.zoom_at_center(self.config.view_zoom_step),
            ShortcutAction::ViewZoomOut => {
                self.viewport.zoom_at_center(1.0 / self.config.view_zoom_step)
            }
            ShortcutAction::ViewReset => self.viewport.reset(),
            ShortcutAction::Undo => {
                self.undo(now);
            }
            ShortcutAction::Redo => {
                self.redo(now);
            }
            ShortcutAction::EnterSelectTool => self.router.set_tool(ActiveTool::Select),
            ShortcutAction::EnterHandTool => self.router.set_tool(ActiveTool::Hand),
            ShortcutAction::EndDrag => {
                self.end_drag(now);
            }
        }
        Some(action)
    }

    fn nudge_selected(&mut self, dx_px: f64, dy_px: f64, now: Instant) -> Option<HistoryDomain> {
        let layer = self.selected.clone()?;
        let (router, mut cx) = self.split();
        let domain = router.nudge(&mut cx, &layer, dx_px, dy_px)?;
        self.record_commit(domain, now);
        Some(domain)
    }

    fn cycle_slot(&mut self, forward: bool) {
        let keys: Vec<&str> = self.context.slot_keys().collect();
        if keys.is_empty() {
            return;
        }
        let current = match &self.selected {
            Some(LayerId::TextSlot(key)) => keys
                .iter()
                .position(|candidate| *candidate == key.as_str()),
            _ => None,
        };
        let next = match (current, forward) {
            (Some(index), true) => (index + 1) % keys.len(),
            (Some(index), false) => (index + keys.len() - 1) % keys.len(),
            (None, true) => 0,
            (None, false) => keys.len() - 1,
        };
        self.selected = Some(LayerId::TextSlot(keys[next].to_string()));
    }

    pub fn can_undo(&self) -> bool {
        self.overrides.can_undo() || self.text_lines.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.overrides.can_redo() || self.text_lines.can_redo()
    }

    /// Undoes the most recent commit across both stores.
    pub fn undo(&mut self, now: Instant) -> bool {
        self.step_history(HistoryAction::Undo, now)
    }

    pub fn redo(&mut self, now: Instant) -> bool {
        self.step_history(HistoryAction::Redo, now)
    }

    fn step_history(&mut self, action: HistoryAction, now: Instant) -> bool {
        if self.router.is_dragging() || !self.editing_enabled() {
            return false;
        }
        self.commit_interaction(now);
        let preferred = match action {
            HistoryAction::Undo => self.undo_order.pop(),
            HistoryAction::Redo => self.redo_order.pop(),
        };
        let first = preferred.unwrap_or(HistoryDomain::Overrides);
        let Some(domain) = [first, first.other()]
            .into_iter()
            .find(|domain| self.transfer(*domain, action))
        else {
            tracing::debug!("{}", action.empty_message());
            return false;
        };
        match action {
            HistoryAction::Undo => self.redo_order.push(domain),
            HistoryAction::Redo => self.undo_order.push(domain),
        }
        self.preview.request(now);
        tracing::debug!(?domain, "{}", action.applied_message());
        true
    }

    fn transfer(&mut self, domain: HistoryDomain, action: HistoryAction) -> bool {
        match (domain, action) {
            (HistoryDomain::Overrides, HistoryAction::Undo) => self.overrides.undo(),
            (HistoryDomain::Overrides, HistoryAction::Redo) => self.overrides.redo(),
            (HistoryDomain::TextLines, HistoryAction::Undo) => self.text_lines.undo(),
            (HistoryDomain::TextLines, HistoryAction::Redo) => self.text_lines.redo(),
        }
    }

    /// Returns both stores to their loaded base, one undoable entry per changed store.
    pub fn reset_to_base(&mut self, now: Instant) -> SessionResult<bool> {
        self.ensure_editing()?;
        let mut changed = false;
        if self.overrides.reset_to_base() {
            self.record_commit(HistoryDomain::Overrides, now);
            changed = true;
        }
        if self.text_lines.reset_to_base() {
            self.record_commit(HistoryDomain::TextLines, now);
            changed = true;
        }
        Ok(changed)
    }

    /// Applies externally suggested ops (suggestions, presets) as one undo entry.
    pub fn apply_ops(&mut self, ops: &[PatchOp], now: Instant) -> SessionResult<bool> {
        self.ensure_editing()?;
        let changed = self.overrides.apply_ops(ops)?;
        if changed {
            tracing::debug!(ops = ops.len(), "applied override ops");
            self.record_commit(HistoryDomain::Overrides, now);
        }
        Ok(changed)
    }

    pub fn apply_preset(&mut self, preset: &Preset, now: Instant) -> SessionResult<bool> {
        tracing::info!(preset = %preset.id, name = %preset.name, "applying preset");
        self.apply_ops(&preset.ops, now)
    }

    /// Continuous override edit (slider drag). Recorded once by [`Self::commit_interaction`].
    pub fn merge_patch<I, K>(&mut self, patch: I, now: Instant) -> SessionResult<bool>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.ensure_editing()?;
        if self.interaction.overrides.is_none() {
            self.interaction.overrides = Some(self.overrides.snapshot());
        }
        let changed = self.overrides.merge_patch(patch, false);
        if changed {
            self.note_uncommitted_change(now);
        }
        Ok(changed)
    }

    /// Continuous text spec edit from a form control, coalesced like [`Self::merge_patch`].
    pub fn update_text_spec(
        &mut self,
        slot: &str,
        spec: TextLineSpec,
        now: Instant,
    ) -> SessionResult<bool> {
        self.ensure_editing()?;
        if self.interaction.text_lines.is_none() {
            self.interaction.text_lines = Some(self.text_lines.snapshot());
        }
        let changed = self.text_lines.set_spec(slot, spec, false);
        if changed {
            self.note_uncommitted_change(now);
        }
        Ok(changed)
    }

    /// Ends a continuous edit, pushing at most one undo entry per touched store.
    pub fn commit_interaction(&mut self, now: Instant) -> bool {
        let pending = std::mem::take(&mut self.interaction);
        let mut committed = false;
        if let Some(pre) = pending.overrides {
            if self.overrides.commit_snapshot(pre) {
                self.record_commit(HistoryDomain::Overrides, now);
                committed = true;
            }
        }
        if let Some(pre) = pending.text_lines {
            if self.text_lines.commit_snapshot(pre) {
                self.record_commit(HistoryDomain::TextLines, now);
                committed = true;
            }
        }
        committed
    }

    pub fn stage_layout(&self) -> StageLayout {
        StageLayout::compute(&self.context, &self.overrides, &self.text_lines)
    }

    pub fn pending_ops(&self) -> Vec<PatchOp> {
        self.overrides.diff()
    }

    /// Changed override paths plus changed text slots.
    pub fn unsaved_change_count(&self) -> usize {
        let base = self.text_lines.base();
        let current = self.text_lines.current();
        let changed_slots = base
            .keys()
            .chain(current.keys())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter(|key| base.get(*key) != current.get(*key))
            .count();
        self.overrides.unsaved_change_count() + changed_slots
    }

    pub fn is_dirty(&self) -> bool {
        self.overrides.is_dirty() || self.text_lines.is_dirty()
    }

    /// Spec for every template slot, identity specs included.
    fn full_text_line_map(&self) -> TextLineMap {
        let mut map = self.text_lines.snapshot();
        for key in self.context.slot_keys() {
            map.entry(key.to_string()).or_default();
        }
        map
    }

    /// Snapshots the session for saving and enters `Saving`. A save already in flight
    /// makes this fail. Any active drag or pending interaction is committed first.
    pub fn begin_save(&mut self, now: Instant) -> SessionResult<SaveRequest> {
        let selection = self.selection.clone().ok_or(SessionError::NoSelection)?;
        if !self.phase().can_save() {
            return Err(StateError::InvalidStateTransition {
                from: self.phase(),
                event: SessionEvent::SaveStarted,
            }
            .into());
        }
        self.end_drag(now);
        self.commit_interaction(now);

        let request = SaveRequest {
            selection,
            overrides: self.overrides.snapshot(),
            text_lines: self
                .text_lines
                .is_dirty()
                .then(|| self.full_text_line_map()),
        };
        self.phase.transition(SessionEvent::SaveStarted)?;
        tracing::info!(
            selection = %request.selection,
            override_ops = self.overrides.unsaved_change_count(),
            text_lines = request.text_lines.is_some(),
            "save started"
        );
        self.pending_save = Some(request.clone());
        Ok(request)
    }

    /// Applies the save result. On success the submitted state becomes the new base; on
    /// failure every local edit is kept and a dismissible error is recorded.
    pub fn complete_save(&mut self, result: BridgeResult<PreviewImage>) -> SessionResult<bool> {
        let request = self.pending_save.take().ok_or(SessionError::NoSaveInFlight)?;
        match result {
            Ok(image) => {
                self.overrides.mark_saved(request.overrides);
                if let Some(text_lines) = request.text_lines {
                    self.text_lines.mark_saved(text_lines);
                }
                self.preview.set_image(image);
                self.last_error = None;
                self.phase.transition(SessionEvent::SaveFinished)?;
                tracing::info!(selection = %request.selection, "save finished");
                Ok(true)
            }
            Err(err) => {
                tracing::warn!(selection = %request.selection, %err, "save failed");
                self.last_error = Some(err.to_string());
                self.phase.transition(SessionEvent::SaveFailed)?;
                Ok(false)
            }
        }
    }

    pub fn save_with<B: PersistenceBridge + ?Sized>(
        &mut self,
        bridge: &B,
        now: Instant,
    ) -> SessionResult<bool> {
        let request = self.begin_save(now)?;
        let result = submit_save(bridge, &request);
        self.complete_save(result)
    }

    /// Issues a preview request once the debounce window has passed.
    pub fn poll_preview(&mut self, now: Instant) -> Option<PreviewRequest> {
        if !self.editing_enabled() {
            return None;
        }
        let selection = self.selection.clone()?;
        let ticket = self.preview.poll(now)?;
        Some(PreviewRequest {
            token: ticket.token,
            selection,
            overrides: self.overrides.current().expand_nested(),
            text_lines: self.full_text_line_map(),
        })
    }

    pub fn finish_preview(&mut self, token: u64, result: BridgeResult<PreviewImage>) -> bool {
        self.preview.finish(token, result)
    }

    /// Polls and, when due, renders a preview synchronously through `bridge`.
    pub fn drive_preview<B: PersistenceBridge + ?Sized>(
        &mut self,
        bridge: &B,
        now: Instant,
    ) -> bool {
        let Some(request) = self.poll_preview(now) else {
            return false;
        };
        let result = bridge.render_preview(&request);
        self.finish_preview(request.token, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{BridgeError, TemplateSlot};
    use crate::editor::overrides::OverridePaths;
    use crate::geometry::NormRect;
    use crate::preview::PreviewStatus;
    use serde_json::json;
    use std::cell::RefCell;
    use std::time::Duration;

    struct FakeSource {
        context: EditorContext,
        text_lines: TextLineMap,
        fail_text_lines: bool,
    }

    impl FakeSource {
        fn new() -> Self {
            Self {
                context: EditorContext {
                    slots: vec![
                        TemplateSlot {
                            key: "title".to_string(),
                            rect: NormRect::new(0.1, 0.1, 0.4, 0.2),
                        },
                        TemplateSlot {
                            key: "subtitle".to_string(),
                            rect: NormRect::new(0.1, 0.4, 0.4, 0.1),
                        },
                    ],
                    ..EditorContext::default()
                },
                text_lines: TextLineMap::new(),
                fail_text_lines: false,
            }
        }
    }

    impl ContextSource for FakeSource {
        fn load_context(&self, _selection: &SelectionKey) -> BridgeResult<EditorContext> {
            Ok(self.context.clone())
        }

        fn load_text_lines(&self, selection: &SelectionKey) -> BridgeResult<TextLineMap> {
            if self.fail_text_lines {
                return Err(BridgeError::TextLinesUnavailable {
                    selection: selection.clone(),
                    message: "timeout".to_string(),
                });
            }
            Ok(self.text_lines.clone())
        }
    }

    #[derive(Default)]
    struct FakeBridge {
        fail_save: bool,
        saved_text_lines: RefCell<Vec<TextLineMap>>,
    }

    impl PersistenceBridge for FakeBridge {
        fn save_overrides(
            &self,
            _selection: &SelectionKey,
            _overrides: &Value,
        ) -> BridgeResult<()> {
            if self.fail_save {
                return Err(BridgeError::Rejected {
                    operation: "save_overrides",
                    message: "backend offline".to_string(),
                });
            }
            Ok(())
        }

        fn save_text_lines(
            &self,
            _selection: &SelectionKey,
            specs: &TextLineMap,
        ) -> BridgeResult<()> {
            self.saved_text_lines.borrow_mut().push(specs.clone());
            Ok(())
        }

        fn rebuild(&self, selection: &SelectionKey) -> BridgeResult<PreviewImage> {
            Ok(PreviewImage {
                url: format!("/thumbs/{selection}.png"),
            })
        }

        fn render_preview(&self, request: &PreviewRequest) -> BridgeResult<PreviewImage> {
            Ok(PreviewImage {
                url: format!("/preview/{}.png", request.token),
            })
        }
    }

    fn selection() -> SelectionKey {
        SelectionKey::new("main", "ep01", "a")
    }

    fn loaded(source: &FakeSource) -> EditorSession {
        let mut session = EditorSession::new(EditorConfig::default(), 1000.0, 500.0);
        let phase = session.load_with(source, selection()).expect("load runs");
        assert_eq!(phase, SessionPhase::Ready);
        session
    }

    fn title() -> LayerId {
        LayerId::TextSlot("title".to_string())
    }

    #[test]
    fn editing_is_rejected_before_a_selection_loads() {
        let mut session = EditorSession::new(EditorConfig::default(), 1000.0, 500.0);
        let error = session
            .apply_ops(
                &[PatchOp::set(OverridePaths::BG_ZOOM, json!(2.0))],
                Instant::now(),
            )
            .unwrap_err();
        assert!(matches!(
            error,
            SessionError::EditingDisabled {
                phase: SessionPhase::Unloaded
            }
        ));
        assert_eq!(session.pointer_down(PointerEvent::primary(1, 10.0, 10.0)), None);
    }

    #[test]
    fn load_failure_reports_the_failing_field() {
        let mut source = FakeSource::new();
        source.fail_text_lines = true;
        let mut session = EditorSession::new(EditorConfig::default(), 1000.0, 500.0);
        let phase = session.load_with(&source, selection()).expect("load runs");

        assert_eq!(phase, SessionPhase::LoadFailed);
        let failure = session.load_failure().expect("failure recorded");
        assert_eq!(failure.context_error, None);
        assert!(failure
            .text_lines_error
            .as_deref()
            .is_some_and(|message| message.contains("timeout")));
    }

    #[test]
    fn load_response_for_a_previous_selection_is_dropped() {
        let source = FakeSource::new();
        let mut session = EditorSession::new(EditorConfig::default(), 1000.0, 500.0);
        let first = selection();
        session.begin_selection(first.clone()).expect("loading");
        session
            .begin_selection(SelectionKey::new("main", "ep02", "a"))
            .expect("loading");

        let result = session.finish_loading(
            &first,
            Ok(source.context.clone()),
            Ok(TextLineMap::new()),
        );
        assert!(matches!(result, Err(SessionError::StaleResponse { .. })));
        assert_eq!(session.phase(), SessionPhase::Loading);
    }

    #[test]
    fn load_folds_legacy_text_overrides_once_without_history() {
        let mut source = FakeSource::new();
        source.context.overrides = [
            (OverridePaths::LEGACY_TEXT_OFFSET_X.to_string(), json!(0.1)),
            (OverridePaths::LEGACY_TEXT_SCALE.to_string(), json!(2.0)),
        ]
        .into_iter()
        .collect();
        let mut session = loaded(&source);

        let title = session.text_lines().spec("title");
        assert!((title.offset_x - 0.1).abs() < 1e-12);
        assert_eq!(title.scale, 2.0);
        assert!(!session
            .overrides()
            .current()
            .contains(OverridePaths::LEGACY_TEXT_SCALE));
        assert!(session.is_dirty());
        assert!(!session.can_undo());

        // Reloading the same selection must not fold again.
        session.load_with(&source, selection()).expect("reload");
        assert_eq!(session.text_lines().spec("title").scale, 1.0);
    }

    #[test]
    fn undo_and_redo_follow_commit_order_across_stores() {
        let source = FakeSource::new();
        let mut session = loaded(&source);
        let now = Instant::now();

        session.select_layer(Some(title()));
        session.handle_key(ShortcutKey::ArrowRight, ShortcutModifiers::default(), now);
        session
            .apply_ops(&[PatchOp::set(OverridePaths::BG_ZOOM, json!(2.0))], now)
            .expect("valid op");
        session.handle_key(ShortcutKey::ArrowDown, ShortcutModifiers::default(), now);

        assert!(session.undo(now));
        assert_eq!(session.text_lines().spec("title").offset_y, 0.0);
        assert!(session.overrides().current().contains(OverridePaths::BG_ZOOM));

        assert!(session.undo(now));
        assert!(!session.overrides().current().contains(OverridePaths::BG_ZOOM));
        assert!(session.text_lines().spec("title").offset_x > 0.0);

        assert!(session.redo(now));
        assert!(session.overrides().current().contains(OverridePaths::BG_ZOOM));
        assert_eq!(session.text_lines().spec("title").offset_y, 0.0);
    }

    #[test]
    fn new_commit_clears_redo_in_both_stores() {
        let source = FakeSource::new();
        let mut session = loaded(&source);
        let now = Instant::now();

        session.select_layer(Some(title()));
        session.handle_key(ShortcutKey::ArrowRight, ShortcutModifiers::default(), now);
        assert!(session.undo(now));
        assert!(session.can_redo());

        session
            .apply_ops(&[PatchOp::set(OverridePaths::BG_ZOOM, json!(2.0))], now)
            .expect("valid op");
        assert!(!session.can_redo());
        assert!(!session.redo(now));
    }

    #[test]
    fn slider_edits_coalesce_into_one_entry() {
        let source = FakeSource::new();
        let mut session = loaded(&source);
        let now = Instant::now();

        for zoom in [1.5, 2.0, 2.5] {
            session
                .merge_patch([(OverridePaths::BG_ZOOM, json!(zoom))], now)
                .expect("editing");
        }
        assert!(session.commit_interaction(now));
        assert_eq!(session.overrides().history().undo_len(), 1);
        assert_eq!(session.unsaved_change_count(), 1);

        assert!(session.undo(now));
        assert!(!session.is_dirty());
    }

    #[test]
    fn slider_edit_after_undo_is_not_lost_to_redo() {
        let source = FakeSource::new();
        let mut session = loaded(&source);
        let now = Instant::now();

        session
            .apply_ops(&[PatchOp::set(OverridePaths::BG_ZOOM, json!(2.0))], now)
            .expect("valid op");
        assert!(session.undo(now));
        assert!(session.can_redo());

        session
            .merge_patch([(OverridePaths::PORTRAIT_ZOOM, json!(1.5))], now)
            .expect("editing");
        assert!(!session.can_redo());
        assert!(!session.redo(now));
        assert_eq!(
            session.overrides().current().get(OverridePaths::PORTRAIT_ZOOM),
            Some(&json!(1.5))
        );
        assert!(!session.overrides().current().contains(OverridePaths::BG_ZOOM));
    }

    #[test]
    fn undo_mid_slider_commits_then_reverts_the_slider_edit() {
        let source = FakeSource::new();
        let mut session = loaded(&source);
        let now = Instant::now();

        session
            .merge_patch([(OverridePaths::PORTRAIT_ZOOM, json!(1.5))], now)
            .expect("editing");
        assert!(session.undo(now));
        assert!(!session.is_dirty());
        assert!(!session.commit_interaction(now));

        assert!(session.redo(now));
        assert_eq!(
            session.overrides().current().get(OverridePaths::PORTRAIT_ZOOM),
            Some(&json!(1.5))
        );
    }

    #[test]
    fn override_changes_schedule_a_debounced_preview() {
        let source = FakeSource::new();
        let mut session = loaded(&source);
        let now = Instant::now();
        let later = now + Duration::from_millis(200);

        session
            .apply_ops(&[PatchOp::set(OverridePaths::BG_ZOOM, json!(2.0))], now)
            .expect("valid op");
        assert!(session.poll_preview(now).is_none());
        assert!(session.poll_preview(later).is_some());

        session
            .merge_patch([(OverridePaths::PORTRAIT_ZOOM, json!(1.2))], later)
            .expect("editing");
        let much_later = later + Duration::from_millis(200);
        assert!(session.poll_preview(much_later).is_some());

        assert!(session.undo(much_later));
        assert!(session
            .poll_preview(much_later + Duration::from_millis(200))
            .is_some());
    }

    #[test]
    fn failed_save_keeps_every_local_edit() {
        let source = FakeSource::new();
        let mut session = loaded(&source);
        let now = Instant::now();
        session
            .apply_ops(&[PatchOp::set(OverridePaths::PORTRAIT_OFFSET_X, json!(0.1))], now)
            .expect("valid op");

        let bridge = FakeBridge {
            fail_save: true,
            ..FakeBridge::default()
        };
        assert!(!session.save_with(&bridge, now).expect("save runs"));

        assert_eq!(session.phase(), SessionPhase::Ready);
        assert!(session.last_error().is_some_and(|error| error.contains("backend offline")));
        assert_eq!(session.pending_ops().len(), 1);
        assert!(session.can_undo());

        session.dismiss_error();
        assert_eq!(session.last_error(), None);
    }

    #[test]
    fn successful_save_rebases_and_sends_text_lines_only_when_dirty() {
        let source = FakeSource::new();
        let mut session = loaded(&source);
        let now = Instant::now();
        let bridge = FakeBridge::default();

        session
            .apply_ops(&[PatchOp::set(OverridePaths::BG_ZOOM, json!(2.0))], now)
            .expect("valid op");
        assert!(session.save_with(&bridge, now).expect("save runs"));
        assert!(bridge.saved_text_lines.borrow().is_empty());
        assert!(!session.is_dirty());
        assert_eq!(session.unsaved_change_count(), 0);

        session.select_layer(Some(title()));
        session.handle_key(ShortcutKey::ArrowLeft, ShortcutModifiers::default(), now);
        assert!(session.save_with(&bridge, now).expect("save runs"));

        let saved = bridge.saved_text_lines.borrow();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].len(), 2);
        assert_eq!(saved[0]["subtitle"], TextLineSpec::default());
        assert!(!session.is_dirty());
        assert!(matches!(session.preview().status(), PreviewStatus::Ready(_)));
    }

    #[test]
    fn concurrent_save_is_rejected() {
        let source = FakeSource::new();
        let mut session = loaded(&source);
        let now = Instant::now();

        session.begin_save(now).expect("first save starts");
        assert!(matches!(session.begin_save(now), Err(SessionError::State(_))));
        assert_eq!(session.phase(), SessionPhase::Saving);

        assert!(session
            .complete_save(Ok(PreviewImage {
                url: "/thumbs/a.png".to_string()
            }))
            .expect("save completes"));
        assert!(matches!(
            session.complete_save(Ok(PreviewImage {
                url: "/thumbs/a.png".to_string()
            })),
            Err(SessionError::NoSaveInFlight)
        ));
    }

    #[test]
    fn text_drag_schedules_a_debounced_preview() {
        let source = FakeSource::new();
        let mut session = loaded(&source);
        let now = Instant::now();
        let bridge = FakeBridge::default();

        assert_eq!(
            session.pointer_down(PointerEvent::primary(1, 200.0, 100.0)),
            Some(DragKind::TextMove)
        );
        assert_eq!(session.selected_layer(), Some(&title()));
        assert!(session.pointer_move(PointerEvent::primary(1, 230.0, 100.0), now));
        assert_eq!(
            session.pointer_up(PointerEvent::primary(1, 230.0, 100.0), now),
            Some(HistoryDomain::TextLines)
        );

        assert!(!session.drive_preview(&bridge, now));
        let later = now + Duration::from_millis(200);
        let request = session.poll_preview(later).expect("preview due");
        assert_eq!(request.text_lines.len(), 2);
        assert!(session.finish_preview(
            request.token,
            Ok(PreviewImage {
                url: "/preview/1.png".to_string()
            })
        ));
    }

    #[test]
    fn tab_cycles_text_slots_and_escape_ends_drag() {
        let source = FakeSource::new();
        let mut session = loaded(&source);
        let now = Instant::now();

        session.handle_key(ShortcutKey::Tab, ShortcutModifiers::default(), now);
        assert_eq!(session.selected_layer(), Some(&title()));
        session.handle_key(ShortcutKey::Tab, ShortcutModifiers::default(), now);
        assert_eq!(
            session.selected_layer(),
            Some(&LayerId::TextSlot("subtitle".to_string()))
        );
        session.handle_key(
            ShortcutKey::Tab,
            ShortcutModifiers::new(false, true, false),
            now,
        );
        assert_eq!(session.selected_layer(), Some(&title()));

        session.pointer_down(PointerEvent::primary(7, 200.0, 100.0));
        session.pointer_move(PointerEvent::primary(7, 260.0, 100.0), now);
        assert_eq!(
            session.handle_key(ShortcutKey::Escape, ShortcutModifiers::default(), now),
            Some(ShortcutAction::EndDrag)
        );
        assert_eq!(session.active_drag(), None);
        assert!(session.text_lines().spec("title").offset_x > 0.0);
        assert_eq!(session.text_lines().history().undo_len(), 1);
    }

    #[test]
    fn preset_applies_as_one_undoable_edit() {
        let source = FakeSource::new();
        let mut session = loaded(&source);
        let now = Instant::now();
        session
            .merge_patch(
                [
                    (OverridePaths::BG_ZOOM, json!(2.0)),
                    (OverridePaths::PORTRAIT_ZOOM, json!(1.5)),
                ],
                now,
            )
            .expect("editing");
        session.commit_interaction(now);

        let mut local = crate::storage::LocalState::default();
        let preset = local
            .save_preset("close", session.overrides().current(), 1)
            .expect("saved")
            .clone();
        session.reset_to_base(now).expect("editing");
        assert!(!session.is_dirty());

        assert!(session.apply_preset(&preset, now).expect("valid ops"));
        assert_eq!(session.pending_ops().len(), 2);
        assert!(session.undo(now));
        assert!(!session.is_dirty());
    }

    #[test]
    fn reset_to_base_is_undoable() {
        let source = FakeSource::new();
        let mut session = loaded(&source);
        let now = Instant::now();
        session
            .apply_ops(&[PatchOp::set(OverridePaths::BG_ZOOM, json!(3.0))], now)
            .expect("valid op");

        assert!(session.reset_to_base(now).expect("editing"));
        assert!(!session.is_dirty());
        assert!(session.undo(now));
        assert!(session.is_dirty());
    }
}
