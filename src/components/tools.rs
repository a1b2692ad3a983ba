use crate::canvas::{ViewTransform, ZOOM_IN_STEP, ZOOM_OUT_STEP};
use crate::ops::effects::{
    EffectKind, EffectParams, MAX_BLUR_RADIUS, MAX_PIXEL_STRENGTH, MIN_PIXEL_STRENGTH,
};
use crate::ops::mask::BrushShape;
use eframe::egui;
use egui::{Pos2, Vec2};
use std::time::{Duration, Instant};

pub const MIN_BRUSH_SIZE: f32 = 1.0;
pub const MAX_BRUSH_SIZE: f32 = 400.0;
/// A still touch held this long erases the region under the finger.
pub const LONG_PRESS_DURATION: Duration = Duration::from_secs(1);
/// Display-space movement that cancels a pending long press.
pub const LONG_PRESS_SLOP: f32 = 10.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    Brush,
    Rectangle,
    Fill,
    Eraser,
}

impl Tool {
    pub fn label(&self) -> &'static str {
        match self {
            Tool::Brush => "Brush",
            Tool::Rectangle => "Rectangle",
            Tool::Fill => "Fill",
            Tool::Eraser => "Eraser",
        }
    }
    pub fn all() -> &'static [Tool] {
        &[Tool::Brush, Tool::Rectangle, Tool::Fill, Tool::Eraser]
    }
}

// ============================================================================
// TOOL CONFIGURATION
// ============================================================================

/// Plain value state edited by the toolbar and read by every gesture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ToolConfig {
    pub tool: Tool,
    pub shape: BrushShape,
    pub effect: EffectKind,
    /// Stamp diameter in image pixels.
    pub brush_size: f32,
    pub pixel_strength: u32,
    /// Blur radius in image pixels.
    pub blur_radius: f32,
    /// Clear the low bit of every alpha byte before export.
    pub strip_metadata: bool,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            tool: Tool::Brush,
            shape: BrushShape::Round,
            effect: EffectKind::Pixelate,
            brush_size: 32.0,
            pixel_strength: 12,
            blur_radius: 12.0,
            strip_metadata: true,
        }
    }
}

impl ToolConfig {
    pub fn set_brush_size(&mut self, size: f32) {
        self.brush_size = if size.is_finite() {
            size.clamp(MIN_BRUSH_SIZE, MAX_BRUSH_SIZE)
        } else {
            MIN_BRUSH_SIZE
        };
    }

    pub fn set_pixel_strength(&mut self, strength: u32) {
        self.pixel_strength = strength.clamp(MIN_PIXEL_STRENGTH, MAX_PIXEL_STRENGTH);
    }

    pub fn set_blur_radius(&mut self, radius: f32) {
        self.blur_radius = if radius.is_finite() {
            radius.clamp(0.0, MAX_BLUR_RADIUS)
        } else {
            0.0
        };
    }

    /// Copy with every numeric field pulled back into range.
    pub fn clamped(mut self) -> Self {
        self.set_brush_size(self.brush_size);
        self.set_pixel_strength(self.pixel_strength);
        self.set_blur_radius(self.blur_radius);
        self
    }

    pub fn effect_params(&self) -> EffectParams {
        EffectParams {
            kind: self.effect,
            pixel_strength: self.pixel_strength,
            blur_radius: self.blur_radius,
        }
        .normalized()
    }
}

// ============================================================================
// INPUT EVENTS - host-neutral pointer/touch stream
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
}

/// One input event in viewport-relative display space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputEvent {
    PointerDown {
        pos: Pos2,
        button: PointerButton,
        /// Held pan modifier (Ctrl): a primary drag pans instead of drawing.
        pan_modifier: bool,
    },
    PointerMove {
        pos: Pos2,
    },
    PointerUp {
        pos: Pos2,
    },
    PointerCancel,
    PointerLeave,
    TouchStart {
        id: u64,
        pos: Pos2,
    },
    TouchMove {
        id: u64,
        pos: Pos2,
    },
    TouchEnd {
        id: u64,
    },
    TouchCancel {
        id: u64,
    },
    Wheel {
        pos: Pos2,
        zoom_in: bool,
    },
}

impl InputEvent {
    /// Events that would start a gesture.
    pub fn is_gesture_start(&self) -> bool {
        matches!(
            self,
            InputEvent::PointerDown { .. } | InputEvent::TouchStart { .. }
        )
    }
}

/// What the session has to do in response to an event.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GestureAction {
    /// Push history, reset the stroke buffer, and draw at `at`.
    BeginStroke {
        at: Pos2,
        mode: StrokeMode,
        erase: bool,
    },
    ExtendStroke {
        to: Pos2,
    },
    CommitStroke,
    /// Drop the stroke and the history entry pushed for it.
    AbortStroke,
    FloodFill {
        at: Pos2,
        erase: bool,
    },
    SetView(ViewTransform),
    ZoomAt {
        anchor: Pos2,
        factor: f32,
    },
    /// Long press: flood-erase the redacted region under the finger.
    LongPressErase {
        at: Pos2,
    },
}

// ============================================================================
// GESTURE STATE MACHINE
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrokeMode {
    Brush,
    Rectangle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerSource {
    Mouse,
    Touch(u64),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StrokeState {
    pub source: PointerSource,
    pub mode: StrokeMode,
    pub erase: bool,
    pending_long_press: Option<LongPress>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct LongPress {
    started: Instant,
    origin: Pos2,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PinchState {
    ids: [u64; 2],
    points: [Pos2; 2],
    start_distance: f32,
    start_scale: f32,
    /// Image point that stays under the finger midpoint.
    world_anchor: Pos2,
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum GestureState {
    #[default]
    Idle,
    Drawing(StrokeState),
    Panning {
        source: PointerSource,
        start: Pos2,
        start_offset: Vec2,
    },
    PinchZooming(PinchState),
}

/// Turns raw pointer/touch events into mask and view actions.
///
/// Exactly one gesture owns the input stream at a time.  A gesture ends only
/// on its own terminal event (release, cancel, leave) or when a second touch
/// preempts a touch stroke, which is aborted before the pinch begins.
#[derive(Debug, Default)]
pub struct GestureMachine {
    state: GestureState,
    touches: Vec<(u64, Pos2)>,
    /// Touch whose long press already fired; ignored until it lifts.
    spent_touch: Option<u64>,
}

impl GestureMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &GestureState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, GestureState::Idle)
    }

    pub fn is_drawing(&self) -> bool {
        matches!(self.state, GestureState::Drawing(_))
    }

    /// Whether the mouse pointer is held by the current gesture.
    pub fn has_capture(&self) -> bool {
        match self.state {
            GestureState::Drawing(s) => s.source == PointerSource::Mouse,
            GestureState::Panning { source, .. } => source == PointerSource::Mouse,
            _ => false,
        }
    }

    pub fn active_touches(&self) -> usize {
        self.touches.len()
    }

    /// When the pending long press will fire, if one is armed.
    pub fn long_press_deadline(&self) -> Option<Instant> {
        match self.state {
            GestureState::Drawing(s) => s
                .pending_long_press
                .map(|lp| lp.started + LONG_PRESS_DURATION),
            _ => None,
        }
    }

    /// Forget everything, e.g. when a new image replaces the session.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn handle(
        &mut self,
        event: &InputEvent,
        now: Instant,
        config: &ToolConfig,
        view: &ViewTransform,
    ) -> Vec<GestureAction> {
        match *event {
            InputEvent::PointerDown {
                pos,
                button,
                pan_modifier,
            } => self.pointer_down(pos, button, pan_modifier, config, view),
            InputEvent::PointerMove { pos } => self.pointer_move(pos, view),
            InputEvent::PointerUp { .. } | InputEvent::PointerLeave => {
                self.finish_source(PointerSource::Mouse, true)
            }
            InputEvent::PointerCancel => self.finish_source(PointerSource::Mouse, false),
            InputEvent::TouchStart { id, pos } => self.touch_start(id, pos, now, config, view),
            InputEvent::TouchMove { id, pos } => self.touch_move(id, pos, view),
            InputEvent::TouchEnd { id } => self.touch_end(id, true),
            InputEvent::TouchCancel { id } => self.touch_end(id, false),
            InputEvent::Wheel { pos, zoom_in } => {
                if matches!(self.state, GestureState::PinchZooming(_)) {
                    return Vec::new();
                }
                let factor = if zoom_in { ZOOM_IN_STEP } else { ZOOM_OUT_STEP };
                vec![GestureAction::ZoomAt {
                    anchor: pos,
                    factor,
                }]
            }
        }
    }

    /// Fire the long press if its timer has elapsed.
    pub fn poll(&mut self, now: Instant) -> Vec<GestureAction> {
        let GestureState::Drawing(stroke) = self.state else {
            return Vec::new();
        };
        let (Some(lp), PointerSource::Touch(id)) = (stroke.pending_long_press, stroke.source)
        else {
            return Vec::new();
        };
        if now.duration_since(lp.started) < LONG_PRESS_DURATION {
            return Vec::new();
        }
        self.state = GestureState::Idle;
        self.spent_touch = Some(id);
        vec![
            GestureAction::AbortStroke,
            GestureAction::LongPressErase { at: lp.origin },
        ]
    }

    fn pointer_down(
        &mut self,
        pos: Pos2,
        button: PointerButton,
        pan_modifier: bool,
        config: &ToolConfig,
        view: &ViewTransform,
    ) -> Vec<GestureAction> {
        if !self.is_idle() {
            return Vec::new();
        }
        let pans = button == PointerButton::Middle
            || (button == PointerButton::Primary && pan_modifier);
        if pans {
            self.state = GestureState::Panning {
                source: PointerSource::Mouse,
                start: pos,
                start_offset: view.offset,
            };
            return Vec::new();
        }
        let erase = button == PointerButton::Secondary;
        self.begin(PointerSource::Mouse, pos, erase, None, config)
    }

    fn pointer_move(&mut self, pos: Pos2, view: &ViewTransform) -> Vec<GestureAction> {
        match self.state {
            GestureState::Drawing(s) if s.source == PointerSource::Mouse => {
                vec![GestureAction::ExtendStroke { to: pos }]
            }
            GestureState::Panning {
                source: PointerSource::Mouse,
                start,
                start_offset,
            } => vec![pan_action(view, start_offset, pos - start)],
            _ => Vec::new(),
        }
    }

    /// Terminal event for `source`: commit (release/leave) or abort (cancel).
    fn finish_source(&mut self, source: PointerSource, commit: bool) -> Vec<GestureAction> {
        match self.state {
            GestureState::Drawing(s) if s.source == source => {
                self.state = GestureState::Idle;
                if commit {
                    vec![GestureAction::CommitStroke]
                } else {
                    crate::log_info!("gesture: stroke cancelled");
                    vec![GestureAction::AbortStroke]
                }
            }
            GestureState::Panning { source: s, .. } if s == source => {
                self.state = GestureState::Idle;
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn touch_start(
        &mut self,
        id: u64,
        pos: Pos2,
        now: Instant,
        config: &ToolConfig,
        view: &ViewTransform,
    ) -> Vec<GestureAction> {
        self.touches.retain(|(t, _)| *t != id);
        self.touches.push((id, pos));

        match self.state {
            GestureState::Idle if self.touches.len() == 1 => {
                let long_press = Some(LongPress {
                    started: now,
                    origin: pos,
                });
                self.begin(PointerSource::Touch(id), pos, false, long_press, config)
            }
            GestureState::Idle if self.touches.len() == 2 => {
                self.spent_touch = None;
                self.state = GestureState::PinchZooming(self.start_pinch(view));
                Vec::new()
            }
            GestureState::Drawing(s) if matches!(s.source, PointerSource::Touch(_)) => {
                crate::log_info!("gesture: second touch aborts stroke, entering pinch");
                self.spent_touch = None;
                self.state = GestureState::PinchZooming(self.start_pinch(view));
                vec![GestureAction::AbortStroke]
            }
            _ => Vec::new(),
        }
    }

    fn touch_move(&mut self, id: u64, pos: Pos2, view: &ViewTransform) -> Vec<GestureAction> {
        if let Some(entry) = self.touches.iter_mut().find(|(t, _)| *t == id) {
            entry.1 = pos;
        }
        if self.spent_touch == Some(id) {
            return Vec::new();
        }
        match &mut self.state {
            GestureState::Drawing(s) if s.source == PointerSource::Touch(id) => {
                if let Some(lp) = s.pending_long_press
                    && (pos - lp.origin).length() > LONG_PRESS_SLOP
                {
                    s.pending_long_press = None;
                }
                vec![GestureAction::ExtendStroke { to: pos }]
            }
            GestureState::PinchZooming(pinch) => {
                let Some(slot) = pinch.ids.iter().position(|t| *t == id) else {
                    return Vec::new();
                };
                pinch.points[slot] = pos;
                let distance = pinch.points[0].distance(pinch.points[1]);
                let ratio = if pinch.start_distance > f32::EPSILON {
                    distance / pinch.start_distance
                } else {
                    1.0
                };
                let mid = pinch.points[0].lerp(pinch.points[1], 0.5);
                let mut next = *view;
                next.set_scale_about(mid, pinch.world_anchor, pinch.start_scale * ratio);
                vec![GestureAction::SetView(next)]
            }
            _ => Vec::new(),
        }
    }

    fn touch_end(&mut self, id: u64, commit: bool) -> Vec<GestureAction> {
        self.touches.retain(|(t, _)| *t != id);
        if self.spent_touch == Some(id) {
            self.spent_touch = None;
        }
        match self.state {
            GestureState::PinchZooming(p) if p.ids.contains(&id) => {
                self.state = GestureState::Idle;
                // the finger left behind must not start drawing mid-gesture
                self.spent_touch = p.ids.iter().copied().find(|t| *t != id);
                Vec::new()
            }
            _ => self.finish_source(PointerSource::Touch(id), commit),
        }
    }

    fn begin(
        &mut self,
        source: PointerSource,
        pos: Pos2,
        secondary: bool,
        long_press: Option<LongPress>,
        config: &ToolConfig,
    ) -> Vec<GestureAction> {
        let (mode, erase) = match config.tool {
            Tool::Fill => {
                return vec![GestureAction::FloodFill {
                    at: pos,
                    erase: secondary,
                }];
            }
            Tool::Brush => (StrokeMode::Brush, secondary),
            Tool::Eraser => (StrokeMode::Brush, true),
            Tool::Rectangle => (StrokeMode::Rectangle, secondary),
        };
        self.state = GestureState::Drawing(StrokeState {
            source,
            mode,
            erase,
            pending_long_press: long_press,
        });
        vec![GestureAction::BeginStroke {
            at: pos,
            mode,
            erase,
        }]
    }

    fn start_pinch(&self, view: &ViewTransform) -> PinchState {
        let (a, b) = match self.touches.as_slice() {
            [first, second, ..] => (*first, *second),
            [only] => (*only, *only),
            [] => ((0, Pos2::ZERO), (0, Pos2::ZERO)),
        };
        let mid = a.1.lerp(b.1, 0.5);
        PinchState {
            ids: [a.0, b.0],
            points: [a.1, b.1],
            start_distance: a.1.distance(b.1),
            start_scale: view.scale,
            world_anchor: view.to_world(mid),
        }
    }
}

/// View with the offset it had at drag start, moved by the drag so far.
fn pan_action(view: &ViewTransform, start_offset: Vec2, drag: Vec2) -> GestureAction {
    let mut next = ViewTransform {
        scale: view.scale,
        offset: start_offset,
    };
    next.pan_by(drag);
    GestureAction::SetView(next)
}
