use crate::editor::overrides::OverrideLeaf;
use crate::editor::text_lines::{TextLineMap, TextLineSpec};
use crate::geometry::{NormRect, Point};

use super::hit_test::LayerId;

/// Rendered stage size in screen pixels, captured once at pointer-down so a mid-gesture
/// reflow cannot corrupt deltas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageMetrics {
    pub width: f64,
    pub height: f64,
}

impl StageMetrics {
    pub fn safe_width(&self) -> f64 {
        self.width.max(1.0)
    }

    pub fn safe_height(&self) -> f64 {
        self.height.max(1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DragKind {
    BackgroundPan,
    PortraitOffset,
    PortraitZoom,
    TextMove,
    TextScale,
    TextRotate,
    ViewportPan,
}

impl DragKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::BackgroundPan => "background pan",
            Self::PortraitOffset => "portrait offset",
            Self::PortraitZoom => "portrait zoom",
            Self::TextMove => "text move",
            Self::TextScale => "text scale",
            Self::TextRotate => "text rotate",
            Self::ViewportPan => "viewport pan",
        }
    }
}

/// One in-progress drag. Each variant carries the snapshot it needs to compute the
/// current value from the total pointer delta, plus the pre-drag store snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum DragSession {
    BackgroundPan {
        start_pointer: Point,
        start_pan: Point,
        zoom: f64,
        stage: StageMetrics,
        pre: OverrideLeaf,
    },
    PortraitOffset {
        start_pointer: Point,
        start_offset: Point,
        stage: StageMetrics,
        pre: OverrideLeaf,
    },
    PortraitZoom {
        pivot_screen: Point,
        start_distance: f64,
        start_zoom: f64,
        pre: OverrideLeaf,
    },
    TextMove {
        slot: String,
        start_pointer: Point,
        start_spec: TextLineSpec,
        slot_box: NormRect,
        stage: StageMetrics,
        pre: TextLineMap,
    },
    TextScale {
        slot: String,
        center_screen: Point,
        start_distance: f64,
        start_spec: TextLineSpec,
        pre: TextLineMap,
    },
    TextRotate {
        slot: String,
        center_screen: Point,
        start_angle: f64,
        start_spec: TextLineSpec,
        pre: TextLineMap,
    },
    ViewportPan {
        start_pointer: Point,
        start_pan: Point,
    },
}

impl DragSession {
    pub const fn kind(&self) -> DragKind {
        match self {
            Self::BackgroundPan { .. } => DragKind::BackgroundPan,
            Self::PortraitOffset { .. } => DragKind::PortraitOffset,
            Self::PortraitZoom { .. } => DragKind::PortraitZoom,
            Self::TextMove { .. } => DragKind::TextMove,
            Self::TextScale { .. } => DragKind::TextScale,
            Self::TextRotate { .. } => DragKind::TextRotate,
            Self::ViewportPan { .. } => DragKind::ViewportPan,
        }
    }

    /// Layer the drag edits; viewport pans edit none.
    pub fn layer(&self) -> Option<LayerId> {
        match self {
            Self::BackgroundPan { .. } => Some(LayerId::Background),
            Self::PortraitOffset { .. } | Self::PortraitZoom { .. } => Some(LayerId::Portrait),
            Self::TextMove { slot, .. }
            | Self::TextScale { slot, .. }
            | Self::TextRotate { slot, .. } => Some(LayerId::TextSlot(slot.clone())),
            Self::ViewportPan { .. } => None,
        }
    }

    pub fn slot(&self) -> Option<&str> {
        match self {
            Self::TextMove { slot, .. }
            | Self::TextScale { slot, .. }
            | Self::TextRotate { slot, .. } => Some(slot),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ActiveDrag {
    pub(crate) pointer_id: u32,
    pub(crate) session: DragSession,
}
