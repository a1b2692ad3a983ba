use eframe::egui;
use egui::{Pos2, Rect, Vec2};

/// Lower bound for the view scale (image pixels → display points).
pub const MIN_ZOOM: f32 = 0.1;
/// Upper bound for the view scale.
pub const MAX_ZOOM: f32 = 8.0;
/// Factor applied by the zoom-in button and by one wheel notch towards the user.
pub const ZOOM_IN_STEP: f32 = 1.1;
/// Factor applied by the zoom-out button and by one wheel notch away from the user.
pub const ZOOM_OUT_STEP: f32 = 0.9;

// ============================================================================
// VIEW TRANSFORM - image space ↔ display space
// ============================================================================

/// Maps image pixel space to display space: `display = image * scale + offset`.
///
/// `offset` is the display position of the image's top-left corner, relative
/// to the top-left of the viewport.  `scale` always stays inside
/// [`MIN_ZOOM`, `MAX_ZOOM`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewTransform {
    pub scale: f32,
    pub offset: Vec2,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset: Vec2::ZERO,
        }
    }
}

impl ViewTransform {
    pub fn new(scale: f32, offset: Vec2) -> Self {
        Self {
            scale: clamp_zoom(scale),
            offset,
        }
    }

    /// `p * scale + offset`.
    pub fn to_display_space(&self, image_pos: Pos2) -> Pos2 {
        Pos2::new(
            image_pos.x * self.scale + self.offset.x,
            image_pos.y * self.scale + self.offset.y,
        )
    }

    /// Inverse of [`to_display_space`](Self::to_display_space) without any clamping.
    /// Points outside the image map outside `[0, w] × [0, h]`.
    pub fn to_world(&self, display_pos: Pos2) -> Pos2 {
        Pos2::new(
            (display_pos.x - self.offset.x) / self.scale,
            (display_pos.y - self.offset.y) / self.scale,
        )
    }

    /// Display point → image pixel space, clamped to `[0, width] × [0, height]`.
    pub fn to_image_space(&self, display_pos: Pos2, image_size: [u32; 2]) -> Pos2 {
        let world = self.to_world(display_pos);
        Pos2::new(
            world.x.clamp(0.0, image_size[0] as f32),
            world.y.clamp(0.0, image_size[1] as f32),
        )
    }

    /// Display-space rectangle covered by an image of `image_size`.
    pub fn image_rect(&self, image_size: [u32; 2]) -> Rect {
        Rect::from_min_max(
            self.to_display_space(Pos2::ZERO),
            self.to_display_space(Pos2::new(image_size[0] as f32, image_size[1] as f32)),
        )
    }

    /// Scale the image to fit the viewport and center it.
    pub fn fit_to_view(&mut self, viewport: Vec2, image_size: [u32; 2]) {
        let (iw, ih) = (image_size[0].max(1) as f32, image_size[1].max(1) as f32);
        let scale = (viewport.x / iw).min(viewport.y / ih);
        // A zero-sized viewport (minimised window) yields scale 0; the clamp keeps it usable.
        self.scale = clamp_zoom(if scale.is_finite() { scale } else { 1.0 });
        self.offset = Vec2::new(
            (viewport.x - iw * self.scale) / 2.0,
            (viewport.y - ih * self.scale) / 2.0,
        );
    }

    /// Multiply the scale by `factor` while keeping the world point under
    /// `anchor` (display space) fixed.
    pub fn zoom_at_point(&mut self, anchor: Pos2, factor: f32) {
        let next = clamp_zoom(self.scale * factor);
        self.set_scale_about(anchor, self.to_world(anchor), next);
    }

    /// Place `world` under `anchor` at the given scale (clamped).
    /// Used by pinch zoom, which pins the world point recorded at gesture start.
    pub fn set_scale_about(&mut self, anchor: Pos2, world: Pos2, scale: f32) {
        self.scale = clamp_zoom(scale);
        self.offset = Vec2::new(
            anchor.x - world.x * self.scale,
            anchor.y - world.y * self.scale,
        );
    }

    pub fn pan_by(&mut self, delta: Vec2) {
        self.offset += delta;
    }
}

pub fn clamp_zoom(scale: f32) -> f32 {
    if scale.is_nan() {
        return 1.0;
    }
    scale.clamp(MIN_ZOOM, MAX_ZOOM)
}

// ============================================================================
// REDRAW SCHEDULER - coalesces state changes into one render per frame
// ============================================================================

/// "Already scheduled" guard between the session and the shell's frame loop.
///
/// Any number of [`schedule`](Self::schedule) calls between two frames
/// collapse into a single `true` from [`take`](Self::take).
#[derive(Debug, Default)]
pub struct RedrawScheduler {
    scheduled: bool,
    renders: u64,
}

impl RedrawScheduler {
    /// Request a redraw.  Returns `true` only for the call that armed the guard.
    pub fn schedule(&mut self) -> bool {
        if self.scheduled {
            return false;
        }
        self.scheduled = true;
        true
    }

    /// Consume the pending request.  Returns whether a render should happen now.
    pub fn take(&mut self) -> bool {
        if !self.scheduled {
            return false;
        }
        self.scheduled = false;
        self.renders += 1;
        true
    }

    /// Number of render passes handed out so far.
    pub fn render_count(&self) -> u64 {
        self.renders
    }
}
