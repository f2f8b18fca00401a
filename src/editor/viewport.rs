use crate::geometry::Point;

pub const VIEW_SCALE_MIN: f64 = 1.0;
pub const VIEW_SCALE_MAX: f64 = 4.0;
const VIEW_SCALE_EPSILON: f64 = 1e-6;

/// View-level zoom and pan. Independent of content edits and never recorded in history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub scale: f64,
    pub pan_x: f64,
    pub pan_y: f64,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            scale: VIEW_SCALE_MIN,
            pan_x: 0.0,
            pan_y: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewportController {
    state: ViewState,
    width: f64,
    height: f64,
}

fn clamp_view_scale(scale: f64) -> f64 {
    if scale.is_finite() {
        scale.clamp(VIEW_SCALE_MIN, VIEW_SCALE_MAX)
    } else {
        VIEW_SCALE_MIN
    }
}

fn clamp_pan_axis(pan: f64, scale: f64, extent: f64) -> f64 {
    let min = -(scale - 1.0) * extent.max(0.0);
    if pan.is_finite() {
        pan.clamp(min, 0.0)
    } else {
        0.0
    }
}

impl ViewportController {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            state: ViewState::default(),
            width: width.max(0.0),
            height: height.max(0.0),
        }
    }

    pub const fn state(&self) -> ViewState {
        self.state
    }

    pub const fn scale(&self) -> f64 {
        self.state.scale
    }

    pub const fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    pub fn is_zoomed(&self) -> bool {
        self.state.scale > VIEW_SCALE_MIN + VIEW_SCALE_EPSILON
    }

    pub fn center(&self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width.max(0.0);
        self.height = height.max(0.0);
        self.state = self.clamped(self.state);
    }

    /// Applies the pan invariant: no pan at (or near) 1x, otherwise content may not
    /// leave a gap at any viewport edge.
    fn clamped(&self, state: ViewState) -> ViewState {
        let scale = clamp_view_scale(state.scale);
        if scale <= VIEW_SCALE_MIN + VIEW_SCALE_EPSILON {
            return ViewState {
                scale,
                pan_x: 0.0,
                pan_y: 0.0,
            };
        }
        ViewState {
            scale,
            pan_x: clamp_pan_axis(state.pan_x, scale, self.width),
            pan_y: clamp_pan_axis(state.pan_y, scale, self.height),
        }
    }

    /// Cursor-anchored zoom: the world point under `anchor` stays under `anchor`.
    pub fn zoom_at_point(&mut self, anchor: Point, factor: f64) {
        if !factor.is_finite() || factor <= 0.0 {
            return;
        }
        let ViewState {
            scale,
            pan_x,
            pan_y,
        } = self.state;
        let world_x = (anchor.x - pan_x) / scale;
        let world_y = (anchor.y - pan_y) / scale;
        let new_scale = clamp_view_scale(scale * factor);
        self.state = self.clamped(ViewState {
            scale: new_scale,
            pan_x: anchor.x - world_x * new_scale,
            pan_y: anchor.y - world_y * new_scale,
        });
        tracing::debug!(
            scale = self.state.scale,
            pan_x = self.state.pan_x,
            pan_y = self.state.pan_y,
            "view zoomed"
        );
    }

    pub fn zoom_at_center(&mut self, factor: f64) {
        self.zoom_at_point(self.center(), factor);
    }

    /// Jumps to an absolute scale, anchored on the viewport centre.
    pub fn set_scale_at_center(&mut self, scale: f64) {
        if !scale.is_finite() || scale <= 0.0 {
            return;
        }
        self.zoom_at_center(clamp_view_scale(scale) / self.state.scale);
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        if !self.is_zoomed() {
            return;
        }
        self.state = self.clamped(ViewState {
            pan_x: self.state.pan_x + dx,
            pan_y: self.state.pan_y + dy,
            ..self.state
        });
    }

    pub(crate) fn set_pan(&mut self, pan_x: f64, pan_y: f64) {
        self.state = self.clamped(ViewState {
            pan_x,
            pan_y,
            ..self.state
        });
    }

    pub fn reset(&mut self) {
        self.state = ViewState::default();
    }

    pub fn screen_to_world(&self, screen: Point) -> Point {
        Point::new(
            (screen.x - self.state.pan_x) / self.state.scale,
            (screen.y - self.state.pan_y) / self.state.scale,
        )
    }

    pub fn world_to_screen(&self, world: Point) -> Point {
        Point::new(
            world.x * self.state.scale + self.state.pan_x,
            world.y * self.state.scale + self.state.pan_y,
        )
    }

    /// Screen point to normalized stage space, where the stage fills the viewport at 1x.
    pub fn screen_to_stage(&self, screen: Point) -> Point {
        let world = self.screen_to_world(screen);
        Point::new(
            world.x / self.width.max(1.0),
            world.y / self.height.max(1.0),
        )
    }

    pub fn stage_to_screen(&self, stage: Point) -> Point {
        self.world_to_screen(Point::new(stage.x * self.width, stage.y * self.height))
    }
}
