//! Pointer, wheel and nudge routing with at most one active drag.

mod session;
mod snap;

pub use hit_test::{
    hit_test, HitTarget, LayerId, SlotScreenGeometry, HANDLE_HIT_RADIUS_PX,
    ROTATE_HANDLE_OFFSET_PX,
};
pub use session::{DragKind, DragSession, StageMetrics};
pub use snap::SnapGuides;

use session::ActiveDrag;
use snap::snap_box;

use crate::bridge::EditorContext;
use crate::config::EditorConfig;
use crate::editor::history::HistoryDomain;
use crate::editor::layout::{
    BackgroundPlacement, StageLayout, BG_PAN_LIMIT, BG_ZOOM_MAX, BG_ZOOM_MIN,
    PORTRAIT_OFFSET_LIMIT, PORTRAIT_ZOOM_MAX, PORTRAIT_ZOOM_MIN,
};
use crate::editor::overrides::{LayerOverrideStore, OverridePaths};
use crate::editor::text_lines::{clamp_scale, TextLineSpec, TextLineSpecStore};
use crate::editor::viewport::ViewportController;
use crate::geometry::{angle_deg, distance, normalize_rotation, snap_to_step, Point};
use crate::input::ShortcutModifiers;

pub const ROTATION_SNAP_STEP_DEG: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Middle,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub pointer_id: u32,
    /// Screen pixels relative to the viewport origin.
    pub position: Point,
    pub button: PointerButton,
    pub modifiers: ShortcutModifiers,
}

impl PointerEvent {
    pub fn primary(pointer_id: u32, x: f64, y: f64) -> Self {
        Self {
            pointer_id,
            position: Point::new(x, y),
            button: PointerButton::Primary,
            modifiers: ShortcutModifiers::default(),
        }
    }

    pub fn with_button(self, button: PointerButton) -> Self {
        Self { button, ..self }
    }

    pub fn with_modifiers(self, modifiers: ShortcutModifiers) -> Self {
        Self { modifiers, ..self }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelEvent {
    pub position: Point,
    /// Positive scrolls down (zooms out).
    pub delta_y: f64,
    pub modifiers: ShortcutModifiers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveTool {
    #[default]
    Select,
    Hand,
}

/// Everything a gesture may read or mutate, borrowed from the owning session for one call.
pub struct GestureContext<'a> {
    pub viewport: &'a mut ViewportController,
    pub overrides: &'a mut LayerOverrideStore,
    pub text_lines: &'a mut TextLineSpecStore,
    pub context: &'a EditorContext,
    pub config: &'a EditorConfig,
}

impl GestureContext<'_> {
    fn layout(&self) -> StageLayout {
        StageLayout::compute(self.context, &*self.overrides, &*self.text_lines)
    }

    /// Rendered stage size right now; the stage fills the viewport at 1x.
    fn stage_metrics(&self) -> StageMetrics {
        let (width, height) = self.viewport.size();
        let scale = self.viewport.scale();
        StageMetrics {
            width: width * scale,
            height: height * scale,
        }
    }
}

#[derive(Debug, Default)]
pub struct GestureRouter {
    tool: ActiveTool,
    active: Option<ActiveDrag>,
    guides: SnapGuides,
}

impl GestureRouter {
    pub fn tool(&self) -> ActiveTool {
        self.tool
    }

    pub fn set_tool(&mut self, tool: ActiveTool) {
        self.tool = tool;
    }

    pub fn is_dragging(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_session(&self) -> Option<&DragSession> {
        self.active.as_ref().map(|active| &active.session)
    }

    pub fn snap_guides(&self) -> SnapGuides {
        self.guides
    }

    fn owns(&self, pointer_id: u32) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.pointer_id == pointer_id)
    }

    /// Hit-tests and starts a drag. A second pointer while one drag is active is ignored.
    pub fn pointer_down(
        &mut self,
        cx: &mut GestureContext<'_>,
        event: PointerEvent,
        selected: Option<&LayerId>,
    ) -> Option<DragKind> {
        if let Some(active) = &self.active {
            tracing::debug!(
                pointer_id = event.pointer_id,
                active_pointer_id = active.pointer_id,
                "ignoring pointer-down during active drag"
            );
            return None;
        }

        let session = match (event.button, self.tool) {
            (PointerButton::Secondary, _) => return None,
            (PointerButton::Middle, _) | (PointerButton::Primary, ActiveTool::Hand) => {
                begin_viewport_pan(cx, event.position)?
            }
            (PointerButton::Primary, ActiveTool::Select) => {
                let layout = cx.layout();
                let target = hit_test(&layout, &*cx.viewport, event.position, selected)?;
                begin_layer_drag(cx, &layout, target, event.position)?
            }
        };

        let kind = session.kind();
        tracing::debug!(
            pointer_id = event.pointer_id,
            kind = kind.label(),
            "drag started"
        );
        self.guides = SnapGuides::default();
        self.active = Some(ActiveDrag {
            pointer_id: event.pointer_id,
            session,
        });
        Some(kind)
    }

    /// Recomputes the dragged value from the total delta. Returns whether anything moved.
    pub fn pointer_move(&mut self, cx: &mut GestureContext<'_>, event: PointerEvent) -> bool {
        let Some(active) = self
            .active
            .as_ref()
            .filter(|active| active.pointer_id == event.pointer_id)
        else {
            return false;
        };
        let (changed, guides) = apply_drag(&active.session, cx, event.position, event.modifiers);
        self.guides = guides;
        changed
    }

    pub fn pointer_up(
        &mut self,
        cx: &mut GestureContext<'_>,
        event: PointerEvent,
    ) -> Option<HistoryDomain> {
        if !self.owns(event.pointer_id) {
            return None;
        }
        self.pointer_move(cx, event);
        self.end_drag(cx)
    }

    pub fn pointer_cancel(
        &mut self,
        cx: &mut GestureContext<'_>,
        pointer_id: u32,
    ) -> Option<HistoryDomain> {
        if !self.owns(pointer_id) {
            return None;
        }
        self.end_drag(cx)
    }

    /// Ends the active drag, keeping its current values, and commits the pre-drag
    /// snapshot when the drag changed its store.
    pub fn end_drag(&mut self, cx: &mut GestureContext<'_>) -> Option<HistoryDomain> {
        let active = self.active.take()?;
        self.guides = SnapGuides::default();
        let kind = active.session.kind();
        let committed = match active.session {
            DragSession::BackgroundPan { pre, .. }
            | DragSession::PortraitOffset { pre, .. }
            | DragSession::PortraitZoom { pre, .. } => cx
                .overrides
                .commit_snapshot(pre)
                .then_some(HistoryDomain::Overrides),
            DragSession::TextMove { pre, .. }
            | DragSession::TextScale { pre, .. }
            | DragSession::TextRotate { pre, .. } => cx
                .text_lines
                .commit_snapshot(pre)
                .then_some(HistoryDomain::TextLines),
            DragSession::ViewportPan { .. } => None,
        };
        tracing::debug!(
            pointer_id = active.pointer_id,
            kind = kind.label(),
            committed = committed.is_some(),
            "drag ended"
        );
        committed
    }

    /// Command+wheel zooms the view at the cursor; alt+wheel zooms the layer under the
    /// cursor and records one undo entry per changed event. Ignored during a drag.
    pub fn wheel(
        &mut self,
        cx: &mut GestureContext<'_>,
        event: WheelEvent,
    ) -> Option<HistoryDomain> {
        if self.active.is_some() || !event.delta_y.is_finite() || event.delta_y == 0.0 {
            return None;
        }
        let factor = cx.config.wheel_zoom_factor(event.delta_y);
        if event.modifiers.command() {
            cx.viewport.zoom_at_point(event.position, factor);
            return None;
        }
        if !event.modifiers.alt {
            return None;
        }

        let layout = cx.layout();
        let (path, current, min, max, fallback) =
            match hit_test(&layout, &*cx.viewport, event.position, None)? {
                HitTarget::Background => (
                    OverridePaths::BG_ZOOM,
                    layout.background.zoom,
                    BG_ZOOM_MIN,
                    BG_ZOOM_MAX,
                    BG_ZOOM_MIN,
                ),
                HitTarget::PortraitBody | HitTarget::PortraitZoomHandle => (
                    OverridePaths::PORTRAIT_ZOOM,
                    layout.portrait?.zoom,
                    PORTRAIT_ZOOM_MIN,
                    PORTRAIT_ZOOM_MAX,
                    1.0,
                ),
                _ => return None,
            };
        let zoom = (current * factor).clamp(min, max);
        cx.overrides
            .merge_numbers(&[(path, zoom, fallback)], true)
            .then_some(HistoryDomain::Overrides)
    }

    /// Moves `layer` by a screen-pixel delta, converted the same way a drag would be,
    /// as one recorded change.
    pub fn nudge(
        &self,
        cx: &mut GestureContext<'_>,
        layer: &LayerId,
        dx_px: f64,
        dy_px: f64,
    ) -> Option<HistoryDomain> {
        let stage = cx.stage_metrics();
        let layout = cx.layout();
        match layer {
            LayerId::Background => {
                let background = layout.background;
                let pan_x = background.pan_x
                    + dx_px
                        * BackgroundPlacement::pan_per_pixel(background.zoom, stage.safe_width());
                let pan_y = background.pan_y
                    + dy_px
                        * BackgroundPlacement::pan_per_pixel(background.zoom, stage.safe_height());
                cx.overrides
                    .merge_numbers(&background_pan_patch(pan_x, pan_y), true)
                    .then_some(HistoryDomain::Overrides)
            }
            LayerId::Portrait => {
                let portrait = layout.portrait?;
                let offset_x = portrait.offset_x + dx_px / stage.safe_width();
                let offset_y = portrait.offset_y + dy_px / stage.safe_height();
                cx.overrides
                    .merge_numbers(&portrait_offset_patch(offset_x, offset_y), true)
                    .then_some(HistoryDomain::Overrides)
            }
            LayerId::TextSlot(key) => {
                let spec = layout.slot(key)?.spec;
                let moved = TextLineSpec {
                    offset_x: spec.offset_x + dx_px / stage.safe_width(),
                    offset_y: spec.offset_y + dy_px / stage.safe_height(),
                    ..spec
                };
                cx.text_lines
                    .set_spec(key, moved, true)
                    .then_some(HistoryDomain::TextLines)
            }
        }
    }
}

fn background_pan_patch(pan_x: f64, pan_y: f64) -> [(&'static str, f64, f64); 2] {
    [
        (
            OverridePaths::BG_PAN_X,
            pan_x.clamp(-BG_PAN_LIMIT, BG_PAN_LIMIT),
            0.0,
        ),
        (
            OverridePaths::BG_PAN_Y,
            pan_y.clamp(-BG_PAN_LIMIT, BG_PAN_LIMIT),
            0.0,
        ),
    ]
}

fn portrait_offset_patch(offset_x: f64, offset_y: f64) -> [(&'static str, f64, f64); 2] {
    [
        (
            OverridePaths::PORTRAIT_OFFSET_X,
            offset_x.clamp(-PORTRAIT_OFFSET_LIMIT, PORTRAIT_OFFSET_LIMIT),
            0.0,
        ),
        (
            OverridePaths::PORTRAIT_OFFSET_Y,
            offset_y.clamp(-PORTRAIT_OFFSET_LIMIT, PORTRAIT_OFFSET_LIMIT),
            0.0,
        ),
    ]
}

fn begin_viewport_pan(cx: &GestureContext<'_>, pointer: Point) -> Option<DragSession> {
    if !cx.viewport.is_zoomed() {
        return None;
    }
    let view = cx.viewport.state();
    Some(DragSession::ViewportPan {
        start_pointer: pointer,
        start_pan: Point::new(view.pan_x, view.pan_y),
    })
}

fn begin_layer_drag(
    cx: &GestureContext<'_>,
    layout: &StageLayout,
    target: HitTarget,
    pointer: Point,
) -> Option<DragSession> {
    let stage = cx.stage_metrics();
    let session = match target {
        HitTarget::Background => DragSession::BackgroundPan {
            start_pointer: pointer,
            start_pan: Point::new(layout.background.pan_x, layout.background.pan_y),
            zoom: layout.background.zoom,
            stage,
            pre: cx.overrides.snapshot(),
        },
        HitTarget::PortraitBody => {
            let portrait = layout.portrait?;
            DragSession::PortraitOffset {
                start_pointer: pointer,
                start_offset: Point::new(portrait.offset_x, portrait.offset_y),
                stage,
                pre: cx.overrides.snapshot(),
            }
        }
        HitTarget::PortraitZoomHandle => {
            let portrait = layout.portrait?;
            let pivot_screen = cx.viewport.stage_to_screen(portrait.pivot());
            DragSession::PortraitZoom {
                pivot_screen,
                start_distance: distance(pivot_screen, pointer).max(1.0),
                start_zoom: portrait.zoom,
                pre: cx.overrides.snapshot(),
            }
        }
        HitTarget::TextBody(slot) => {
            let placement = layout.slot(&slot)?;
            DragSession::TextMove {
                start_pointer: pointer,
                start_spec: placement.spec,
                slot_box: placement.base,
                stage,
                pre: cx.text_lines.snapshot(),
                slot,
            }
        }
        HitTarget::TextScaleHandle(slot) => {
            let placement = layout.slot(&slot)?;
            let center_screen = SlotScreenGeometry::new(placement, &*cx.viewport).center;
            DragSession::TextScale {
                center_screen,
                start_distance: distance(center_screen, pointer).max(1.0),
                start_spec: placement.spec,
                pre: cx.text_lines.snapshot(),
                slot,
            }
        }
        HitTarget::TextRotateHandle(slot) => {
            let placement = layout.slot(&slot)?;
            let center_screen = SlotScreenGeometry::new(placement, &*cx.viewport).center;
            DragSession::TextRotate {
                center_screen,
                start_angle: angle_deg(center_screen, pointer),
                start_spec: placement.spec,
                pre: cx.text_lines.snapshot(),
                slot,
            }
        }
    };
    Some(session)
}

/// Writes the value implied by `pointer` without recording history.
fn apply_drag(
    session: &DragSession,
    cx: &mut GestureContext<'_>,
    pointer: Point,
    modifiers: ShortcutModifiers,
) -> (bool, SnapGuides) {
    let mut guides = SnapGuides::default();
    let changed = match session {
        DragSession::BackgroundPan {
            start_pointer,
            start_pan,
            zoom,
            stage,
            ..
        } => {
            let pan_x = start_pan.x
                + (pointer.x - start_pointer.x)
                    * BackgroundPlacement::pan_per_pixel(*zoom, stage.safe_width());
            let pan_y = start_pan.y
                + (pointer.y - start_pointer.y)
                    * BackgroundPlacement::pan_per_pixel(*zoom, stage.safe_height());
            cx.overrides
                .merge_numbers(&background_pan_patch(pan_x, pan_y), false)
        }
        DragSession::PortraitOffset {
            start_pointer,
            start_offset,
            stage,
            ..
        } => {
            let offset_x = start_offset.x + (pointer.x - start_pointer.x) / stage.safe_width();
            let offset_y = start_offset.y + (pointer.y - start_pointer.y) / stage.safe_height();
            cx.overrides
                .merge_numbers(&portrait_offset_patch(offset_x, offset_y), false)
        }
        DragSession::PortraitZoom {
            pivot_screen,
            start_distance,
            start_zoom,
            ..
        } => {
            let zoom = (start_zoom * distance(*pivot_screen, pointer) / start_distance)
                .clamp(PORTRAIT_ZOOM_MIN, PORTRAIT_ZOOM_MAX);
            cx.overrides
                .merge_numbers(&[(OverridePaths::PORTRAIT_ZOOM, zoom, 1.0)], false)
        }
        DragSession::TextMove {
            slot,
            start_pointer,
            start_spec,
            slot_box,
            stage,
            ..
        } => {
            let raw_x = start_spec.offset_x + (pointer.x - start_pointer.x) / stage.safe_width();
            let raw_y = start_spec.offset_y + (pointer.y - start_pointer.y) / stage.safe_height();
            let (offset_x, offset_y) = if modifiers.command() {
                (raw_x, raw_y)
            } else {
                let (x, y, snapped) = snap_box(
                    slot_box.scaled_about_center(start_spec.scale),
                    raw_x,
                    raw_y,
                    cx.config.snap_threshold_px / stage.safe_width(),
                    cx.config.snap_threshold_px / stage.safe_height(),
                );
                guides = snapped;
                (x, y)
            };
            cx.text_lines.set_spec(
                slot,
                TextLineSpec {
                    offset_x,
                    offset_y,
                    ..*start_spec
                },
                false,
            )
        }
        DragSession::TextScale {
            slot,
            center_screen,
            start_distance,
            start_spec,
            ..
        } => {
            let scale =
                clamp_scale(start_spec.scale * distance(*center_screen, pointer) / start_distance);
            cx.text_lines.set_spec(
                slot,
                TextLineSpec {
                    scale,
                    ..*start_spec
                },
                false,
            )
        }
        DragSession::TextRotate {
            slot,
            center_screen,
            start_angle,
            start_spec,
            ..
        } => {
            let mut rotation =
                start_spec.rotation_deg + angle_deg(*center_screen, pointer) - start_angle;
            if modifiers.shift {
                rotation = snap_to_step(rotation, ROTATION_SNAP_STEP_DEG);
            }
            cx.text_lines.set_spec(
                slot,
                TextLineSpec {
                    rotation_deg: normalize_rotation(rotation),
                    ..*start_spec
                },
                false,
            )
        }
        DragSession::ViewportPan {
            start_pointer,
            start_pan,
        } => {
            let before = cx.viewport.state();
            cx.viewport.set_pan(
                start_pan.x + pointer.x - start_pointer.x,
                start_pan.y + pointer.y - start_pointer.y,
            );
            cx.viewport.state() != before
        }
    };
    (changed, guides)
}
