// ============================================================================
// EDITOR SESSION - owns the image, the mask and every derived raster
// ============================================================================
//
// One `EditorSession` lives for the lifetime of the window.  Loading an image
// replaces its `Document` wholesale; everything else (tool settings, viewport
// size) survives a reload.  All mutation happens synchronously from the
// shell's event handler, and every change arms the redraw scheduler instead
// of rendering on the spot.
// ============================================================================

use crate::canvas::{RedrawScheduler, ViewTransform, ZOOM_IN_STEP, ZOOM_OUT_STEP};
use crate::components::history::HistoryManager;
use crate::components::tools::{
    GestureAction, GestureMachine, InputEvent, StrokeMode, ToolConfig,
};
use crate::error::RedactError;
use crate::io;
use crate::logger;
use crate::ops::composite::{build_output, build_overlay, overlay_onto};
use crate::ops::effects::{EffectParams, render_effect_layer};
use crate::ops::mask::{
    BlendRule, CENTER_RECT_FRACTION, MaskRect, StrokeBuffer, commit, flood_fill, preview_mask,
};
use eframe::egui;
use egui::{Pos2, Rect, Vec2};
use image::{GrayImage, RgbaImage};
use std::borrow::Cow;
use std::path::Path;
use std::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq)]
struct ActiveStroke {
    mode: StrokeMode,
    rule: BlendRule,
    /// Image-space anchor (rectangle corner / first stamp).
    start: Pos2,
    last: Pos2,
}

struct EffectCache {
    params: EffectParams,
    layer: RgbaImage,
}

/// Per-image state.  Created by a load, dropped by the next one.
pub struct Document {
    source: RgbaImage,
    mask: GrayImage,
    stroke: StrokeBuffer,
    history: HistoryManager,
    effect: Option<EffectCache>,
    active: Option<ActiveStroke>,
    overlay: RgbaImage,
    output: RgbaImage,
    derived_dirty: bool,
}

impl Document {
    fn new(source: RgbaImage) -> Self {
        let (w, h) = source.dimensions();
        Self {
            mask: GrayImage::new(w, h),
            stroke: StrokeBuffer::new(w, h),
            history: HistoryManager::default(),
            effect: None,
            active: None,
            overlay: RgbaImage::new(w, h),
            output: source.clone(),
            source,
            derived_dirty: true,
        }
    }

    pub fn size(&self) -> [u32; 2] {
        [self.source.width(), self.source.height()]
    }

    pub fn source(&self) -> &RgbaImage {
        &self.source
    }

    /// The committed mask (never includes an in-progress stroke).
    pub fn mask(&self) -> &GrayImage {
        &self.mask
    }

    pub fn stroke(&self) -> &StrokeBuffer {
        &self.stroke
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn is_stroking(&self) -> bool {
        self.active.is_some()
    }

    fn ensure_effect(&mut self, params: EffectParams) {
        if self.effect.as_ref().is_some_and(|c| c.params == params) {
            return;
        }
        let t0 = Instant::now();
        let layer = render_effect_layer(&self.source, &params);
        crate::log_info!(
            "effect: rendered {} layer in {:.1} ms",
            params.kind.label(),
            t0.elapsed().as_secs_f64() * 1000.0
        );
        self.effect = Some(EffectCache { params, layer });
    }

    fn ensure_not_stroking(&self) -> Result<(), RedactError> {
        if self.active.is_some() {
            return Err(RedactError::GestureActive);
        }
        Ok(())
    }
}

pub struct EditorSession {
    document: Option<Document>,
    tools: ToolConfig,
    view: ViewTransform,
    viewport: Vec2,
    gestures: GestureMachine,
    redraw: RedrawScheduler,
    /// Bumped whenever overlay/output pixels may have changed.
    revision: u64,
}

impl Default for EditorSession {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorSession {
    pub fn new() -> Self {
        Self {
            document: None,
            tools: ToolConfig::default(),
            view: ViewTransform::default(),
            viewport: Vec2::ZERO,
            gestures: GestureMachine::new(),
            redraw: RedrawScheduler::default(),
            revision: 0,
        }
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Install `image` as the new source, resetting mask, history, gestures
    /// and view.
    pub fn load_image(&mut self, image: RgbaImage) -> Result<(), RedactError> {
        if image.width() == 0 || image.height() == 0 {
            crate::log_err!("load: rejected empty image");
            return Err(RedactError::Decode("image has no pixels".into()));
        }
        crate::log_info!("load: {}x{} image", image.width(), image.height());
        self.gestures.reset();
        self.document = Some(Document::new(image));
        self.revision += 1;
        self.fit_to_view();
        self.redraw.schedule();
        Ok(())
    }

    /// Decode and load.  A decode failure leaves the current session as is.
    pub fn load_from_bytes(&mut self, bytes: &[u8]) -> Result<(), RedactError> {
        match io::decode_image(bytes) {
            Ok(img) => self.load_image(img),
            Err(e) => {
                crate::log_err!("load: decode failed: {}", e);
                Err(e)
            }
        }
    }

    pub fn load_from_path(&mut self, path: &Path) -> Result<(), RedactError> {
        let img = io::open_image(path).inspect_err(|e| {
            crate::log_err!("load: {} failed: {}", logger::display_path(path), e);
        })?;
        self.load_image(img)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn has_image(&self) -> bool {
        self.document.is_some()
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn image_size(&self) -> Option<[u32; 2]> {
        self.document.as_ref().map(Document::size)
    }

    pub fn mask(&self) -> Option<&GrayImage> {
        self.document.as_ref().map(Document::mask)
    }

    pub fn tools(&self) -> &ToolConfig {
        &self.tools
    }

    pub fn view(&self) -> &ViewTransform {
        &self.view
    }

    pub fn gestures(&self) -> &GestureMachine {
        &self.gestures
    }

    pub fn can_undo(&self) -> bool {
        self.document
            .as_ref()
            .is_some_and(|d| d.active.is_none() && d.history.can_undo())
    }

    pub fn can_redo(&self) -> bool {
        self.document
            .as_ref()
            .is_some_and(|d| d.active.is_none() && d.history.can_redo())
    }

    /// Consume the pending redraw request.  Several changes between two
    /// frames yield one `true`.
    pub fn take_redraw(&mut self) -> bool {
        self.redraw.take()
    }

    /// Changes whenever the pixels of the overlay or output may differ from
    /// the last call.  View-only changes (pan, zoom) leave it alone.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn doc_mut(&mut self) -> Result<&mut Document, RedactError> {
        self.document.as_mut().ok_or(RedactError::NoImage)
    }

    fn touched(&mut self) {
        if let Some(doc) = self.document.as_mut() {
            doc.derived_dirty = true;
        }
        self.revision += 1;
        self.redraw.schedule();
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    /// Replace the tool settings.  Numeric values are clamped; an effect
    /// change invalidates the output but never touches the mask.
    pub fn set_tool_config(&mut self, config: ToolConfig) {
        let config = config.clamped();
        if config == self.tools {
            return;
        }
        let effect_changed = config.effect_params() != self.tools.effect_params();
        self.tools = config;
        if effect_changed && self.document.is_some() {
            self.touched();
        }
    }

    /// Display size of the canvas area.  Does not refit on its own.
    pub fn set_viewport(&mut self, size: Vec2) {
        if size != self.viewport {
            self.viewport = size;
            self.redraw.schedule();
        }
    }

    pub fn viewport(&self) -> Vec2 {
        self.viewport
    }

    // ------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------

    /// Feed one pointer/touch/wheel event through the gesture machine.
    pub fn handle_input(&mut self, event: &InputEvent, now: Instant) -> Result<(), RedactError> {
        if self.document.is_none() {
            if event.is_gesture_start() {
                crate::log_warn!("input: ignored {:?}, no image loaded", event);
                return Err(RedactError::NoImage);
            }
            return Ok(());
        }
        let actions = self.gestures.handle(event, now, &self.tools, &self.view);
        self.apply_all(actions)
    }

    /// Advance timers (long press).  Call once per frame.
    pub fn tick(&mut self, now: Instant) -> Result<(), RedactError> {
        let actions = self.gestures.poll(now);
        self.apply_all(actions)
    }

    /// When the shell should wake up next even without input.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.gestures.long_press_deadline()
    }

    fn apply_all(&mut self, actions: Vec<GestureAction>) -> Result<(), RedactError> {
        for action in actions {
            self.apply(action)?;
        }
        Ok(())
    }

    fn apply(&mut self, action: GestureAction) -> Result<(), RedactError> {
        let size = self.image_size().ok_or(RedactError::NoImage)?;
        let to_image = |p: Pos2, view: &ViewTransform| view.to_image_space(p, size);
        match action {
            GestureAction::BeginStroke { at, mode, erase } => {
                self.begin_stroke_at(to_image(at, &self.view), mode, erase)
            }
            GestureAction::ExtendStroke { to } => self.extend_stroke(to_image(to, &self.view)),
            GestureAction::CommitStroke => self.commit_stroke().map(|_| ()),
            GestureAction::AbortStroke => self.abort_stroke(),
            GestureAction::FloodFill { at, erase } => {
                self.flood_fill_at(to_image(at, &self.view), erase).map(|_| ())
            }
            GestureAction::LongPressErase { at } => {
                crate::log_info!("gesture: long press erase");
                self.flood_fill_at(to_image(at, &self.view), true).map(|_| ())
            }
            GestureAction::SetView(view) => {
                self.view = view;
                self.redraw.schedule();
                Ok(())
            }
            GestureAction::ZoomAt { anchor, factor } => {
                self.zoom_at_point(anchor, factor);
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Mask editing (image space)
    // ------------------------------------------------------------------

    /// Start a stroke: snapshot the mask, reset the stroke buffer, and draw
    /// the first stamp or a zero-size rectangle at `at`.
    pub fn begin_stroke_at(
        &mut self,
        at: Pos2,
        mode: StrokeMode,
        erase: bool,
    ) -> Result<(), RedactError> {
        let brush_size = self.tools.brush_size;
        let shape = self.tools.shape;
        let doc = self.doc_mut()?;
        doc.ensure_not_stroking()?;
        let size = doc.size();

        let label = match (mode, erase) {
            (StrokeMode::Rectangle, _) => "Rectangle",
            (StrokeMode::Brush, true) => "Erase",
            (StrokeMode::Brush, false) => "Brush",
        };
        doc.history.push(label, &doc.mask);
        doc.stroke.clear();
        match mode {
            StrokeMode::Brush => doc.stroke.stamp(at, brush_size, shape),
            StrokeMode::Rectangle => doc.stroke.set_rectangle(MaskRect::from_corners(at, at, size)),
        }
        doc.active = Some(ActiveStroke {
            mode,
            rule: BlendRule::from_erase(erase),
            start: at,
            last: at,
        });
        self.touched();
        Ok(())
    }

    /// Continue the active stroke to `to`.  No-op without one.
    pub fn extend_stroke(&mut self, to: Pos2) -> Result<(), RedactError> {
        let brush_size = self.tools.brush_size;
        let shape = self.tools.shape;
        let doc = self.doc_mut()?;
        let size = doc.size();
        let Some(active) = doc.active.as_mut() else {
            return Ok(());
        };
        match active.mode {
            StrokeMode::Brush => {
                doc.stroke.line_of_stamps(active.last, to, brush_size, shape);
            }
            StrokeMode::Rectangle => {
                doc.stroke
                    .set_rectangle(MaskRect::from_corners(active.start, to, size));
            }
        }
        active.last = to;
        self.touched();
        Ok(())
    }

    /// Blend the stroke into the mask.  Returns `false` when the stroke drew
    /// nothing, in which case its history entry is dropped as well.
    pub fn commit_stroke(&mut self) -> Result<bool, RedactError> {
        let doc = self.doc_mut()?;
        let Some(active) = doc.active.take() else {
            return Ok(false);
        };
        let drew = !doc.stroke.is_empty();
        if drew {
            commit(&mut doc.mask, &doc.stroke, active.rule);
            doc.history.settle();
        } else {
            doc.history.discard_last();
            crate::log_info!("stroke: nothing drawn, dropped");
        }
        doc.stroke.clear();
        self.touched();
        Ok(drew)
    }

    /// Throw the active stroke away and restore the pre-stroke history.
    pub fn abort_stroke(&mut self) -> Result<(), RedactError> {
        let doc = self.doc_mut()?;
        if doc.active.take().is_none() {
            return Ok(());
        }
        doc.history.discard_last();
        doc.stroke.clear();
        crate::log_info!("stroke: aborted");
        self.touched();
        Ok(())
    }

    /// Flood fill the committed mask from `at` as one undoable step.
    /// Returns the size of the filled region.
    pub fn flood_fill_at(&mut self, at: Pos2, erase: bool) -> Result<usize, RedactError> {
        let doc = self.doc_mut()?;
        doc.ensure_not_stroking()?;
        doc.history.push(if erase { "Fill erase" } else { "Fill" }, &doc.mask);
        let filled = flood_fill(&mut doc.mask, at, BlendRule::from_erase(erase));
        doc.history.settle();
        self.touched();
        Ok(filled)
    }

    /// Redact a rectangle a tenth of the image size at its center.
    pub fn add_center_rect(&mut self) -> Result<bool, RedactError> {
        let doc = self.doc_mut()?;
        doc.ensure_not_stroking()?;
        let rect = MaskRect::centered(doc.size(), CENTER_RECT_FRACTION);
        doc.history.push("Center rectangle", &doc.mask);
        doc.stroke.set_rectangle(rect);
        let drew = !doc.stroke.is_empty();
        if drew {
            commit(&mut doc.mask, &doc.stroke, BlendRule::Paint);
            doc.history.settle();
        } else {
            doc.history.discard_last();
        }
        doc.stroke.clear();
        self.touched();
        Ok(drew)
    }

    pub fn undo(&mut self) -> Result<bool, RedactError> {
        let doc = self.doc_mut()?;
        doc.ensure_not_stroking()?;
        let undone = doc.history.undo(&mut doc.mask);
        if let Some(desc) = &undone {
            crate::log_info!("history: undo '{}'", desc);
        }
        let changed = undone.is_some();
        if changed {
            self.touched();
        }
        Ok(changed)
    }

    pub fn redo(&mut self) -> Result<bool, RedactError> {
        let doc = self.doc_mut()?;
        doc.ensure_not_stroking()?;
        let redone = doc.history.redo(&mut doc.mask);
        if let Some(desc) = &redone {
            crate::log_info!("history: redo '{}'", desc);
        }
        let changed = redone.is_some();
        if changed {
            self.touched();
        }
        Ok(changed)
    }

    // ------------------------------------------------------------------
    // View
    // ------------------------------------------------------------------

    /// Fit the image into the viewport.  With no viewport yet (headless use)
    /// the view falls back to 1:1 at the origin.
    pub fn fit_to_view(&mut self) {
        let Some(size) = self.image_size() else {
            return;
        };
        if self.viewport.x <= 0.0 || self.viewport.y <= 0.0 {
            self.view = ViewTransform::default();
        } else {
            self.view.fit_to_view(self.viewport, size);
        }
        self.redraw.schedule();
    }

    pub fn zoom_at_point(&mut self, anchor: Pos2, factor: f32) {
        self.view.zoom_at_point(anchor, factor);
        self.redraw.schedule();
    }

    /// Button zoom: about the viewport center.
    pub fn zoom_in(&mut self) {
        self.zoom_at_point((self.viewport / 2.0).to_pos2(), ZOOM_IN_STEP);
    }

    pub fn zoom_out(&mut self) {
        self.zoom_at_point((self.viewport / 2.0).to_pos2(), ZOOM_OUT_STEP);
    }

    /// Display-space outline of the rectangle being dragged, if any.
    pub fn rect_preview(&self) -> Option<Rect> {
        let doc = self.document.as_ref()?;
        let active = doc.active?;
        if active.mode != StrokeMode::Rectangle {
            return None;
        }
        let r = MaskRect::from_corners(active.start, active.last, doc.size());
        Some(Rect::from_min_max(
            self.view.to_display_space(Pos2::new(r.x, r.y)),
            self.view.to_display_space(r.max()),
        ))
    }

    // ------------------------------------------------------------------
    // Derived rasters
    // ------------------------------------------------------------------

    /// Rebuild overlay and output if anything they depend on changed.  While
    /// a stroke is active both use the preview mask.
    pub fn refresh_derived(&mut self) {
        let params = self.tools.effect_params();
        let Some(doc) = self.document.as_mut() else {
            return;
        };
        if !doc.derived_dirty {
            return;
        }
        doc.ensure_effect(params);
        let mask: Cow<'_, GrayImage> = match doc.active {
            Some(a) => Cow::Owned(preview_mask(&doc.mask, &doc.stroke, a.rule)),
            None => Cow::Borrowed(&doc.mask),
        };
        let Some(cache) = doc.effect.as_ref() else {
            return;
        };
        let overlay = build_overlay(&mask);
        let output = build_output(&doc.source, &cache.layer, &mask);
        doc.overlay = overlay;
        doc.output = output;
        doc.derived_dirty = false;
    }

    /// Tint layer for on-screen feedback.
    pub fn overlay(&mut self) -> Option<&RgbaImage> {
        self.refresh_derived();
        self.document.as_ref().map(|d| &d.overlay)
    }

    /// Censored result as it currently looks, stroke preview included.
    pub fn output(&mut self) -> Option<&RgbaImage> {
        self.refresh_derived();
        self.document.as_ref().map(|d| &d.output)
    }

    /// Source with the tint baked in: what the canvas shows while editing.
    pub fn editing_view(&mut self) -> Option<RgbaImage> {
        self.refresh_derived();
        self.document
            .as_ref()
            .map(|d| overlay_onto(&d.source, &d.overlay))
    }

    // ------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------

    /// Final raster from the committed mask, with the alpha LSB scrubbed
    /// when metadata stripping is on.
    pub fn export_image(&mut self) -> Result<RgbaImage, RedactError> {
        let params = self.tools.effect_params();
        let strip = self.tools.strip_metadata;
        let doc = self.doc_mut()?;
        doc.ensure_effect(params);
        let Some(cache) = doc.effect.as_ref() else {
            return Err(RedactError::Encode("effect layer unavailable".into()));
        };
        let mut out = build_output(&doc.source, &cache.layer, &doc.mask);
        if strip {
            io::scrub_alpha_lsb(&mut out);
        }
        Ok(out)
    }

    pub fn export_png(&mut self) -> Result<Vec<u8>, RedactError> {
        let out = self.export_image()?;
        let bytes = io::encode_png(&out).inspect_err(|e| {
            crate::log_err!("export: {}", e);
        })?;
        crate::log_info!(
            "export: {}x{} -> {} bytes (strip metadata: {})",
            out.width(),
            out.height(),
            bytes.len(),
            self.tools.strip_metadata
        );
        Ok(bytes)
    }

    pub fn export_to_path(&mut self, path: &Path) -> Result<(), RedactError> {
        let bytes = self.export_png()?;
        io::save_png(path, &bytes).inspect_err(|e| {
            crate::log_err!(
                "export: writing {} failed: {}",
                logger::display_path(path),
                e
            );
        })?;
        crate::log_info!("export: wrote {}", logger::display_path(path));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::tools::{PointerButton, Tool};
    use image::Rgba;

    fn session_with(w: u32, h: u32) -> EditorSession {
        let mut s = EditorSession::new();
        s.load_image(RgbaImage::from_pixel(w, h, Rgba([200, 150, 100, 255])))
            .unwrap();
        s
    }

    #[test]
    fn operations_without_image_report_no_image() {
        let mut s = EditorSession::new();
        assert!(matches!(s.undo(), Err(RedactError::NoImage)));
        assert!(matches!(s.export_png(), Err(RedactError::NoImage)));
        assert!(matches!(
            s.flood_fill_at(Pos2::ZERO, false),
            Err(RedactError::NoImage)
        ));
        let down = InputEvent::PointerDown {
            pos: Pos2::ZERO,
            button: PointerButton::Primary,
            pan_modifier: false,
        };
        assert!(matches!(
            s.handle_input(&down, Instant::now()),
            Err(RedactError::NoImage)
        ));
        assert!(s.gestures().is_idle());
    }

    #[test]
    fn failed_decode_keeps_previous_image() {
        let mut s = session_with(8, 8);
        s.flood_fill_at(Pos2::ZERO, false).unwrap();
        assert!(s.load_from_bytes(b"nope").is_err());
        assert_eq!(s.image_size(), Some([8, 8]));
        assert!(s.mask().unwrap().pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn undo_is_refused_mid_stroke() {
        let mut s = session_with(50, 50);
        s.begin_stroke_at(Pos2::new(10.0, 10.0), StrokeMode::Brush, false)
            .unwrap();
        assert!(matches!(s.undo(), Err(RedactError::GestureActive)));
        assert!(s.commit_stroke().unwrap());
        assert!(s.undo().unwrap());
    }

    #[test]
    fn abort_leaves_mask_and_history_untouched() {
        let mut s = session_with(50, 50);
        s.begin_stroke_at(Pos2::new(25.0, 25.0), StrokeMode::Brush, false)
            .unwrap();
        s.extend_stroke(Pos2::new(40.0, 25.0)).unwrap();
        s.abort_stroke().unwrap();
        let doc = s.document().unwrap();
        assert!(doc.mask().pixels().all(|p| p.0[0] == 0));
        assert!(!doc.history().can_undo());
        assert!(doc.stroke().is_empty());
    }

    #[test]
    fn tiny_rectangle_is_dropped_with_its_history_entry() {
        let mut s = session_with(50, 50);
        s.begin_stroke_at(Pos2::new(10.0, 10.0), StrokeMode::Rectangle, false)
            .unwrap();
        s.extend_stroke(Pos2::new(12.0, 30.0)).unwrap();
        assert!(!s.commit_stroke().unwrap());
        assert!(!s.can_undo());
        assert!(s.mask().unwrap().pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn preview_shows_stroke_before_commit() {
        let mut s = session_with(40, 40);
        s.begin_stroke_at(Pos2::new(20.0, 20.0), StrokeMode::Brush, false)
            .unwrap();
        let overlay = s.overlay().unwrap();
        assert!(overlay.get_pixel(20, 20)[3] > 0);
        assert!(s.mask().unwrap().pixels().all(|p| p.0[0] == 0));
        s.commit_stroke().unwrap();
        assert!(s.mask().unwrap().get_pixel(20, 20)[0] == 255);
    }

    #[test]
    fn rect_preview_is_in_display_space() {
        let mut s = session_with(100, 100);
        s.begin_stroke_at(Pos2::new(10.0, 10.0), StrokeMode::Rectangle, false)
            .unwrap();
        s.extend_stroke(Pos2::new(30.0, 20.0)).unwrap();
        s.view = ViewTransform::new(2.0, Vec2::new(5.0, 5.0));
        let r = s.rect_preview().unwrap();
        assert_eq!(r.min, Pos2::new(25.0, 25.0));
        assert_eq!(r.max, Pos2::new(65.0, 45.0));
    }

    #[test]
    fn changing_effect_keeps_mask() {
        let mut s = session_with(30, 30);
        s.flood_fill_at(Pos2::ZERO, false).unwrap();
        let before = s.mask().unwrap().clone();
        let mut config = *s.tools();
        config.effect = crate::ops::effects::EffectKind::SolidFill;
        s.set_tool_config(config);
        assert_eq!(s.mask().unwrap(), &before);
        assert_eq!(*s.output().unwrap().get_pixel(0, 0), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn center_rect_is_one_undo_step() {
        let mut s = session_with(200, 100);
        assert!(s.add_center_rect().unwrap());
        let mask = s.mask().unwrap();
        assert_eq!(mask.get_pixel(100, 50)[0], 255);
        assert_eq!(mask.get_pixel(80, 50)[0], 0);
        assert!(s.undo().unwrap());
        assert!(s.mask().unwrap().pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn load_fits_view_when_viewport_known() {
        let mut s = EditorSession::new();
        s.set_viewport(Vec2::new(800.0, 600.0));
        s.load_image(RgbaImage::new(400, 100)).unwrap();
        assert!((s.view().scale - 2.0).abs() < 1e-4);
        assert!((s.view().offset.y - 200.0).abs() < 1e-4);
    }

    #[test]
    fn redraws_coalesce_across_changes() {
        let mut s = session_with(20, 20);
        s.take_redraw();
        s.flood_fill_at(Pos2::ZERO, false).unwrap();
        s.zoom_in();
        s.undo().unwrap();
        assert!(s.take_redraw());
        assert!(!s.take_redraw());
    }

    #[test]
    fn eraser_tool_through_input_events() {
        let mut s = session_with(60, 60);
        s.flood_fill_at(Pos2::ZERO, false).unwrap();
        let mut config = *s.tools();
        config.tool = Tool::Eraser;
        config.set_brush_size(10.0);
        s.set_tool_config(config);
        let now = Instant::now();
        s.handle_input(
            &InputEvent::PointerDown {
                pos: Pos2::new(30.0, 30.0),
                button: PointerButton::Primary,
                pan_modifier: false,
            },
            now,
        )
        .unwrap();
        s.handle_input(&InputEvent::PointerUp { pos: Pos2::new(30.0, 30.0) }, now)
            .unwrap();
        let mask = s.mask().unwrap();
        assert_eq!(mask.get_pixel(30, 30)[0], 0);
        assert_eq!(mask.get_pixel(5, 5)[0], 255);
    }

    fn undone_fill(w: u32, h: u32) -> EditorSession {
        let mut s = session_with(w, h);
        s.flood_fill_at(Pos2::ZERO, false).unwrap();
        assert!(s.undo().unwrap());
        assert!(s.can_redo());
        s
    }

    fn primary_down(pos: Pos2) -> InputEvent {
        InputEvent::PointerDown {
            pos,
            button: PointerButton::Primary,
            pan_modifier: false,
        }
    }

    #[test]
    fn pinch_after_undo_keeps_redo() {
        let mut s = undone_fill(100, 100);
        let now = Instant::now();
        for event in [
            InputEvent::TouchStart {
                id: 1,
                pos: Pos2::new(20.0, 20.0),
            },
            InputEvent::TouchStart {
                id: 2,
                pos: Pos2::new(60.0, 60.0),
            },
            InputEvent::TouchEnd { id: 2 },
            InputEvent::TouchEnd { id: 1 },
        ] {
            s.handle_input(&event, now).unwrap();
        }
        assert!(s.can_redo());
        assert!(!s.can_undo());
        assert!(s.redo().unwrap());
        assert!(s.mask().unwrap().pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn rectangle_click_after_undo_keeps_redo() {
        let mut s = undone_fill(50, 50);
        let mut config = *s.tools();
        config.tool = Tool::Rectangle;
        s.set_tool_config(config);
        let now = Instant::now();
        s.handle_input(&primary_down(Pos2::new(10.0, 10.0)), now).unwrap();
        let up = InputEvent::PointerUp {
            pos: Pos2::new(10.0, 10.0),
        };
        s.handle_input(&up, now).unwrap();
        assert!(s.mask().unwrap().pixels().all(|p| p.0[0] == 0));
        assert!(s.can_redo());
        assert!(!s.can_undo());
    }

    #[test]
    fn pointer_cancel_restores_mask_and_history() {
        let mut s = undone_fill(60, 60);
        let now = Instant::now();
        s.handle_input(&primary_down(Pos2::new(10.0, 10.0)), now).unwrap();
        let drag = InputEvent::PointerMove {
            pos: Pos2::new(50.0, 10.0),
        };
        s.handle_input(&drag, now).unwrap();
        assert!(s.document().unwrap().is_stroking());

        s.handle_input(&InputEvent::PointerCancel, now).unwrap();
        assert!(s.gestures().is_idle());
        let doc = s.document().unwrap();
        assert!(!doc.is_stroking());
        assert!(doc.mask().pixels().all(|p| p.0[0] == 0));
        assert!(!s.can_undo());
        assert!(s.can_redo());
    }

    #[test]
    fn committed_stroke_after_undo_clears_redo() {
        let mut s = undone_fill(60, 60);
        s.begin_stroke_at(Pos2::new(30.0, 30.0), StrokeMode::Brush, false)
            .unwrap();
        assert!(s.commit_stroke().unwrap());
        assert!(!s.can_redo());
        assert!(s.can_undo());
    }
}
