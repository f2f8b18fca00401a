//! Per text-slot placement: offset, scale and rotation layered on the template slot box.

mod migration;
mod store;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::geometry::{normalize_rotation, NormRect};

pub use migration::{LegacyTextMigration, MigrationOutcome};
pub use store::TextLineSpecStore;

pub const TEXT_OFFSET_LIMIT: f64 = 5.0;
pub const TEXT_SCALE_MIN: f64 = 0.25;
pub const TEXT_SCALE_MAX: f64 = 4.0;

pub type TextLineMap = BTreeMap<String, TextLineSpec>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextLineSpec {
    #[serde(default)]
    pub offset_x: f64,
    #[serde(default)]
    pub offset_y: f64,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default, rename = "rotate_deg")]
    pub rotation_deg: f64,
}

const fn default_scale() -> f64 {
    1.0
}

impl Default for TextLineSpec {
    fn default() -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 0.0,
            scale: default_scale(),
            rotation_deg: 0.0,
        }
    }
}

pub(crate) fn clamp_offset(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(-TEXT_OFFSET_LIMIT, TEXT_OFFSET_LIMIT)
    } else {
        0.0
    }
}

pub(crate) fn clamp_scale(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(TEXT_SCALE_MIN, TEXT_SCALE_MAX)
    } else {
        default_scale()
    }
}

impl TextLineSpec {
    pub fn clamped(self) -> Self {
        Self {
            offset_x: clamp_offset(self.offset_x),
            offset_y: clamp_offset(self.offset_y),
            scale: clamp_scale(self.scale),
            rotation_deg: if self.rotation_deg.is_finite() {
                normalize_rotation(self.rotation_deg)
            } else {
                0.0
            },
        }
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Slot box after offset and scale, before rotation.
    pub fn placed_box(&self, slot: NormRect) -> NormRect {
        slot.scaled_about_center(self.scale)
            .translated(self.offset_x, self.offset_y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamped_bounds_every_field() {
        let spec = TextLineSpec {
            offset_x: 9.0,
            offset_y: -9.0,
            scale: 10.0,
            rotation_deg: 270.0,
        }
        .clamped();
        assert_eq!(
            spec,
            TextLineSpec {
                offset_x: 5.0,
                offset_y: -5.0,
                scale: 4.0,
                rotation_deg: -90.0,
            }
        );
        assert_eq!(
            TextLineSpec {
                scale: f64::NAN,
                ..TextLineSpec::default()
            }
            .clamped()
            .scale,
            1.0
        );
    }

    #[test]
    fn wire_format_uses_snake_case_and_rotate_deg() {
        let spec: TextLineSpec =
            serde_json::from_str(r#"{"offset_x": 0.1, "rotate_deg": 15}"#).expect("spec parses");
        assert_eq!(
            spec,
            TextLineSpec {
                offset_x: 0.1,
                offset_y: 0.0,
                scale: 1.0,
                rotation_deg: 15.0,
            }
        );
    }

    #[test]
    fn placed_box_scales_about_center_then_offsets() {
        let slot = NormRect::new(0.1, 0.1, 0.2, 0.1);
        let spec = TextLineSpec {
            offset_x: 0.3,
            scale: 2.0,
            ..TextLineSpec::default()
        };
        let placed = spec.placed_box(slot);
        assert!((placed.w - 0.4).abs() < 1e-12);
        assert!((placed.center().x - 0.5).abs() < 1e-12);
        assert!((placed.center().y - 0.15).abs() < 1e-12);
    }
}
