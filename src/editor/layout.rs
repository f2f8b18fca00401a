//! Derived placement of every layer, recomputed explicitly from the stores after each change.

use crate::bridge::EditorContext;
use crate::editor::overrides::{LayerOverrideStore, OverridePaths};
use crate::editor::text_lines::{TextLineSpec, TextLineSpecStore};
use crate::geometry::{NormRect, Point};

pub const BG_ZOOM_MIN: f64 = 1.0;
pub const BG_ZOOM_MAX: f64 = 6.0;
pub const BG_PAN_LIMIT: f64 = 1.0;
pub const PORTRAIT_OFFSET_LIMIT: f64 = 5.0;
pub const PORTRAIT_ZOOM_MIN: f64 = 0.5;
pub const PORTRAIT_ZOOM_MAX: f64 = 2.0;

pub(crate) fn clamp_finite(value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackgroundPlacement {
    pub zoom: f64,
    pub pan_x: f64,
    pub pan_y: f64,
}

impl BackgroundPlacement {
    pub fn read(overrides: &LayerOverrideStore) -> Self {
        Self {
            zoom: clamp_finite(
                overrides.effective_f64(OverridePaths::BG_ZOOM, BG_ZOOM_MIN),
                BG_ZOOM_MIN,
                BG_ZOOM_MAX,
                BG_ZOOM_MIN,
            ),
            pan_x: clamp_finite(
                overrides.effective_f64(OverridePaths::BG_PAN_X, 0.0),
                -BG_PAN_LIMIT,
                BG_PAN_LIMIT,
                0.0,
            ),
            pan_y: clamp_finite(
                overrides.effective_f64(OverridePaths::BG_PAN_Y, 0.0),
                -BG_PAN_LIMIT,
                BG_PAN_LIMIT,
                0.0,
            ),
        }
    }

    /// Pan units per screen pixel along an axis of `extent_px` rendered pixels.
    ///
    /// Panning a zoomed background moves proportionally slower so the image tracks the
    /// cursor at every zoom level.
    pub fn pan_per_pixel(zoom: f64, extent_px: f64) -> f64 {
        let half = (extent_px / 2.0).max(1.0);
        if zoom > BG_ZOOM_MIN {
            1.0 / ((zoom - 1.0) * half).max(f64::EPSILON)
        } else {
            1.0 / half
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortraitPlacement {
    pub offset_x: f64,
    pub offset_y: f64,
    pub zoom: f64,
    pub anchor: Point,
    /// Destination box after zoom about the anchor and offset.
    pub rect: NormRect,
}

impl PortraitPlacement {
    pub fn pivot(&self) -> Point {
        Point::new(
            self.rect.x + self.anchor.x * self.rect.w,
            self.rect.y + self.anchor.y * self.rect.h,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlotPlacement {
    pub key: String,
    pub base: NormRect,
    pub spec: TextLineSpec,
    /// Slot box after scale and offset, before rotation.
    pub rect: NormRect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageLayout {
    pub background: BackgroundPlacement,
    pub portrait: Option<PortraitPlacement>,
    /// Template order; later slots draw on top.
    pub slots: Vec<SlotPlacement>,
}

impl StageLayout {
    pub fn compute(
        context: &EditorContext,
        overrides: &LayerOverrideStore,
        text_lines: &TextLineSpecStore,
    ) -> Self {
        let portrait = context.portrait.map(|info| {
            let offset_x = clamp_finite(
                overrides.effective_f64(OverridePaths::PORTRAIT_OFFSET_X, 0.0),
                -PORTRAIT_OFFSET_LIMIT,
                PORTRAIT_OFFSET_LIMIT,
                0.0,
            );
            let offset_y = clamp_finite(
                overrides.effective_f64(OverridePaths::PORTRAIT_OFFSET_Y, 0.0),
                -PORTRAIT_OFFSET_LIMIT,
                PORTRAIT_OFFSET_LIMIT,
                0.0,
            );
            let zoom = clamp_finite(
                overrides.effective_f64(OverridePaths::PORTRAIT_ZOOM, 1.0),
                PORTRAIT_ZOOM_MIN,
                PORTRAIT_ZOOM_MAX,
                1.0,
            );
            PortraitPlacement {
                offset_x,
                offset_y,
                zoom,
                anchor: info.anchor,
                rect: info
                    .destination
                    .scaled_about_anchor(info.anchor, zoom)
                    .translated(offset_x, offset_y),
            }
        });

        let slots = context
            .slots
            .iter()
            .map(|slot| {
                let spec = text_lines.spec(&slot.key);
                SlotPlacement {
                    key: slot.key.clone(),
                    base: slot.rect,
                    spec,
                    rect: spec.placed_box(slot.rect),
                }
            })
            .collect();

        Self {
            background: BackgroundPlacement::read(overrides),
            portrait,
            slots,
        }
    }

    pub fn slot(&self, key: &str) -> Option<&SlotPlacement> {
        self.slots.iter().find(|slot| slot.key == key)
    }
}
