use crate::geometry::NormRect;

/// Guide lines shown while a text slot is snapped, in normalized stage units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SnapGuides {
    pub vertical: Option<f64>,
    pub horizontal: Option<f64>,
}

impl SnapGuides {
    pub fn is_empty(&self) -> bool {
        self.vertical.is_none() && self.horizontal.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct AxisSnap {
    pub(crate) offset: f64,
    pub(crate) guide: f64,
}

/// Snaps one axis of a box whose unoffset extent is `(start, end)`.
///
/// Center aligns to 0.5, start edge to 0.0 and end edge to 1.0; the closest candidate
/// within `threshold` wins. The returned offset is computed from the target directly
/// so the snapped edge lands on it exactly.
pub(crate) fn snap_axis(start: f64, end: f64, raw_offset: f64, threshold: f64) -> Option<AxisSnap> {
    let center = (start + end) / 2.0;
    [(center, 0.5), (start, 0.0), (end, 1.0)]
        .into_iter()
        .map(|(edge, target)| (target - edge, target, (edge + raw_offset - target).abs()))
        .filter(|(_, _, distance)| *distance <= threshold)
        .min_by(|a, b| a.2.total_cmp(&b.2))
        .map(|(offset, guide, _)| AxisSnap { offset, guide })
}

/// Snaps `unoffset` (placed box with zero offset) moved by `(raw_x, raw_y)`.
pub(crate) fn snap_box(
    unoffset: NormRect,
    raw_x: f64,
    raw_y: f64,
    threshold_x: f64,
    threshold_y: f64,
) -> (f64, f64, SnapGuides) {
    let x = snap_axis(unoffset.left(), unoffset.right(), raw_x, threshold_x);
    let y = snap_axis(unoffset.top(), unoffset.bottom(), raw_y, threshold_y);
    (
        x.map_or(raw_x, |snap| snap.offset),
        y.map_or(raw_y, |snap| snap.offset),
        SnapGuides {
            vertical: x.map(|snap| snap.guide),
            horizontal: y.map(|snap| snap.guide),
        },
    )
}
