// ============================================================================
// MASK STORE - stroke rasterization, commit, flood fill
// ============================================================================
//
// The redaction mask is a single-channel raster the size of the image:
// 0 = untouched, 255 = fully redacted, anything between is an anti-aliased
// edge.  Gestures never draw into it directly; they rasterize into a
// `StrokeBuffer` which is blended in on commit.
// ============================================================================

use eframe::egui::Pos2;
use image::{GrayImage, Luma};

/// Maximum alpha difference from the seed for a pixel to join a flood fill.
pub const FLOOD_TOLERANCE: u8 = 28;
/// Rectangles narrower or shorter than this (image pixels) are dropped.
pub const MIN_RECT_SIZE: f32 = 5.0;
/// Lower bound for the spacing between interpolated brush stamps.
pub const MIN_STAMP_SPACING: f32 = 2.0;
/// Fraction of each image dimension used by the center-rectangle action.
pub const CENTER_RECT_FRACTION: f32 = 0.1;

/// Brush footprint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BrushShape {
    #[default]
    Round,
    Square,
}

impl BrushShape {
    pub fn label(&self) -> &'static str {
        match self {
            BrushShape::Round => "Round",
            BrushShape::Square => "Square",
        }
    }

    pub fn all() -> &'static [BrushShape] {
        &[BrushShape::Round, BrushShape::Square]
    }
}

/// How a finished stroke (or a flood fill) changes the committed mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BlendRule {
    /// Union: `max(mask, stroke)`.  Painting twice never removes coverage.
    #[default]
    Paint,
    /// Difference: `mask - stroke`, saturating at zero.
    Erase,
}

impl BlendRule {
    pub fn from_erase(erase: bool) -> Self {
        if erase { BlendRule::Erase } else { BlendRule::Paint }
    }
}

// ============================================================================
// RECTANGLES
// ============================================================================

/// Axis-aligned rectangle in image space with non-negative size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaskRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl MaskRect {
    /// Normalize two arbitrary corners and clamp the result to the image.
    pub fn from_corners(a: Pos2, b: Pos2, image_size: [u32; 2]) -> Self {
        let (iw, ih) = (image_size[0] as f32, image_size[1] as f32);
        let x0 = a.x.min(b.x).clamp(0.0, iw);
        let y0 = a.y.min(b.y).clamp(0.0, ih);
        let x1 = a.x.max(b.x).clamp(0.0, iw);
        let y1 = a.y.max(b.y).clamp(0.0, ih);
        Self {
            x: x0,
            y: y0,
            w: (x1 - x0).max(0.0),
            h: (y1 - y0).max(0.0),
        }
    }

    /// A rectangle `fraction` of the image in each axis, centered on it.
    pub fn centered(image_size: [u32; 2], fraction: f32) -> Self {
        let (iw, ih) = (image_size[0] as f32, image_size[1] as f32);
        let (w, h) = (iw * fraction, ih * fraction);
        Self {
            x: (iw - w) / 2.0,
            y: (ih - h) / 2.0,
            w,
            h,
        }
    }

    /// Smaller than [`MIN_RECT_SIZE`] on either side.
    pub fn is_degenerate(&self) -> bool {
        self.w < MIN_RECT_SIZE || self.h < MIN_RECT_SIZE
    }

    pub fn max(&self) -> Pos2 {
        Pos2::new(self.x + self.w, self.y + self.h)
    }
}

// ============================================================================
// STROKE BUFFER
// ============================================================================

/// Inclusive pixel bounds `(min_x, min_y, max_x, max_y)`.
pub type PixelBounds = (u32, u32, u32, u32);

/// Transient raster holding only the in-progress gesture.
pub struct StrokeBuffer {
    pixels: GrayImage,
    bounds: Option<PixelBounds>,
    stamps: usize,
}

impl StrokeBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: GrayImage::new(width, height),
            bounds: None,
            stamps: 0,
        }
    }

    pub fn pixels(&self) -> &GrayImage {
        &self.pixels
    }

    /// Bounding box of every non-zero pixel written since the last clear.
    pub fn bounds(&self) -> Option<PixelBounds> {
        self.bounds
    }

    /// True when the stroke has no coverage anywhere.
    pub fn is_empty(&self) -> bool {
        self.bounds.is_none()
    }

    /// Number of stamps rasterized since the last clear.
    pub fn stamp_count(&self) -> usize {
        self.stamps
    }

    pub fn clear(&mut self) {
        if let Some((x0, y0, x1, y1)) = self.bounds.take() {
            for y in y0..=y1 {
                for x in x0..=x1 {
                    self.pixels.put_pixel(x, y, Luma([0]));
                }
            }
        }
        self.stamps = 0;
    }

    /// Rasterize one brush stamp of diameter `size` centered at `center`.
    pub fn stamp(&mut self, center: Pos2, size: f32, shape: BrushShape) {
        self.stamps += 1;
        if size <= 0.0 || !center.x.is_finite() || !center.y.is_finite() {
            return;
        }
        let r = size / 2.0;
        match shape {
            BrushShape::Square => {
                self.fill_box(center.x - r, center.y - r, center.x + r, center.y + r);
            }
            BrushShape::Round => self.fill_disc(center, r),
        }
    }

    /// Stamp along `from → to` so fast pointer motion still gives a solid line.
    /// Returns how many stamps were laid down.
    pub fn line_of_stamps(&mut self, from: Pos2, to: Pos2, size: f32, shape: BrushShape) -> usize {
        let positions = stamp_positions(from, to, size);
        for &p in &positions {
            self.stamp(p, size, shape);
        }
        positions.len()
    }

    /// Replace the whole buffer with a single rectangle.  Degenerate
    /// rectangles leave the buffer empty.
    pub fn set_rectangle(&mut self, rect: MaskRect) {
        self.clear();
        self.stamps = 1;
        if rect.is_degenerate() {
            return;
        }
        let max = rect.max();
        self.fill_box(rect.x, rect.y, max.x, max.y);
    }

    /// Anti-aliased disc: coverage falls off linearly over one pixel at the rim.
    fn fill_disc(&mut self, center: Pos2, r: f32) {
        let Some((x0, y0, x1, y1)) = self.clip_span(
            center.x - r - 1.0,
            center.y - r - 1.0,
            center.x + r + 1.0,
            center.y + r + 1.0,
        ) else {
            return;
        };
        for y in y0..y1 {
            let dy = y as f32 + 0.5 - center.y;
            for x in x0..x1 {
                let dx = x as f32 + 0.5 - center.x;
                let d = (dx * dx + dy * dy).sqrt();
                let cov = (r + 0.5 - d).clamp(0.0, 1.0);
                self.raise(x, y, cov);
            }
        }
    }

    /// Exact area coverage of the box `[left, right) × [top, bottom)`.
    fn fill_box(&mut self, left: f32, top: f32, right: f32, bottom: f32) {
        let Some((x0, y0, x1, y1)) = self.clip_span(left, top, right, bottom) else {
            return;
        };
        for y in y0..y1 {
            let oy = overlap(y as f32, top, bottom);
            if oy <= 0.0 {
                continue;
            }
            for x in x0..x1 {
                let ox = overlap(x as f32, left, right);
                self.raise(x, y, ox * oy);
            }
        }
    }

    /// Pixel span `[x0, x1) × [y0, y1)` touched by a float box, clipped to the buffer.
    fn clip_span(
        &self,
        left: f32,
        top: f32,
        right: f32,
        bottom: f32,
    ) -> Option<(u32, u32, u32, u32)> {
        let (w, h) = (self.pixels.width() as f32, self.pixels.height() as f32);
        let x0 = left.floor().clamp(0.0, w) as u32;
        let y0 = top.floor().clamp(0.0, h) as u32;
        let x1 = right.ceil().clamp(0.0, w) as u32;
        let y1 = bottom.ceil().clamp(0.0, h) as u32;
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some((x0, y0, x1, y1))
    }

    /// Max-blend a coverage value into one pixel.
    fn raise(&mut self, x: u32, y: u32, cov: f32) {
        let v = (cov * 255.0).round().clamp(0.0, 255.0) as u8;
        if v == 0 {
            return;
        }
        let px = self.pixels.get_pixel_mut(x, y);
        if v > px.0[0] {
            px.0[0] = v;
        }
        self.bounds = Some(match self.bounds {
            None => (x, y, x, y),
            Some((bx0, by0, bx1, by1)) => (bx0.min(x), by0.min(y), bx1.max(x), by1.max(y)),
        });
    }
}

/// Length of `[cell, cell + 1] ∩ [lo, hi]`.
#[inline]
fn overlap(cell: f32, lo: f32, hi: f32) -> f32 {
    ((cell + 1.0).min(hi) - cell.max(lo)).clamp(0.0, 1.0)
}

/// Stamp centers for a segment: spacing `max(2, size / 4)`, interval count
/// `max(1, ceil(distance / spacing))`, both endpoints included.
pub fn stamp_positions(from: Pos2, to: Pos2, size: f32) -> Vec<Pos2> {
    let distance = from.distance(to);
    let spacing = (size / 4.0).max(MIN_STAMP_SPACING);
    let steps = ((distance / spacing).ceil() as usize).max(1);
    (0..=steps)
        .map(|i| {
            let t = i as f32 / steps as f32;
            from.lerp(to, t)
        })
        .collect()
}

// ============================================================================
// COMMIT / PREVIEW
// ============================================================================

/// Blend a finished stroke into the committed mask.
pub fn commit(mask: &mut GrayImage, stroke: &StrokeBuffer, rule: BlendRule) {
    let Some((x0, y0, x1, y1)) = stroke.bounds() else {
        return;
    };
    if mask.dimensions() != stroke.pixels.dimensions() {
        crate::log_warn!(
            "commit: stroke {:?} does not match mask {:?}",
            stroke.pixels.dimensions(),
            mask.dimensions()
        );
        return;
    }
    let src = &stroke.pixels;
    for y in y0..=y1 {
        for x in x0..=x1 {
            let s = src.get_pixel(x, y).0[0];
            if s == 0 {
                continue;
            }
            let m = &mut mask.get_pixel_mut(x, y).0[0];
            *m = match rule {
                BlendRule::Paint => (*m).max(s),
                BlendRule::Erase => m.saturating_sub(s),
            };
        }
    }
}

/// Committed mask with the in-progress stroke applied.  Recomputed every
/// frame a stroke is active; never stored in history.
pub fn preview_mask(committed: &GrayImage, stroke: &StrokeBuffer, rule: BlendRule) -> GrayImage {
    let mut preview = committed.clone();
    commit(&mut preview, stroke, rule);
    preview
}

// ============================================================================
// FLOOD FILL
// ============================================================================

/// 4-connected flood fill over mask alpha from `seed` (image space, clamped).
///
/// Neighbours within [`FLOOD_TOLERANCE`] of the seed's value join the region,
/// which is then set to 255 (paint) or 0 (erase).  Returns the number of
/// pixels in the region.  Uses an explicit stack and a visited bitmap, so
/// every pixel is examined at most once.
pub fn flood_fill(mask: &mut GrayImage, seed: Pos2, rule: BlendRule) -> usize {
    let (w, h) = mask.dimensions();
    if w == 0 || h == 0 {
        return 0;
    }
    let wu = w as usize;
    let sx = (seed.x.floor().max(0.0) as u32).min(w - 1);
    let sy = (seed.y.floor().max(0.0) as u32).min(h - 1);

    let fill_value = match rule {
        BlendRule::Paint => 255u8,
        BlendRule::Erase => 0u8,
    };

    let raw: &mut [u8] = mask;
    let seed_idx = sy as usize * wu + sx as usize;
    let target = raw[seed_idx];

    #[inline(always)]
    fn matches(v: u8, target: u8) -> bool {
        v.abs_diff(target) <= FLOOD_TOLERANCE
    }

    let mut visited = vec![false; raw.len()];
    let mut stack: Vec<u32> = Vec::with_capacity(4096);
    visited[seed_idx] = true;
    stack.push(seed_idx as u32);
    let mut filled = 0usize;

    while let Some(idx) = stack.pop() {
        let idx = idx as usize;
        let x = (idx % wu) as u32;
        let y = (idx / wu) as u32;
        raw[idx] = fill_value;
        filled += 1;

        // Only unvisited neighbours are compared, and those still hold their
        // original values.
        let mut visit = |ni: usize, stack: &mut Vec<u32>| {
            if !visited[ni] && matches(raw[ni], target) {
                visited[ni] = true;
                stack.push(ni as u32);
            }
        };
        if x > 0 {
            visit(idx - 1, &mut stack);
        }
        if x + 1 < w {
            visit(idx + 1, &mut stack);
        }
        if y > 0 {
            visit(idx - wu, &mut stack);
        }
        if y + 1 < h {
            visit(idx + wu, &mut stack);
        }
    }

    filled
}

/// Number of pixels with any coverage.
pub fn covered_pixels(mask: &GrayImage) -> usize {
    mask.as_raw().iter().filter(|&&v| v > 0).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_rect(x: f32, y: f32, w: f32, h: f32) -> MaskRect {
        MaskRect { x, y, w, h }
    }

    fn painted(size: (u32, u32), f: impl FnOnce(&mut StrokeBuffer)) -> GrayImage {
        let mut mask = GrayImage::new(size.0, size.1);
        let mut stroke = StrokeBuffer::new(size.0, size.1);
        f(&mut stroke);
        commit(&mut mask, &stroke, BlendRule::Paint);
        mask
    }

    #[test]
    fn round_stamp_stays_inside_its_radius() {
        let mask = painted((100, 100), |s| s.stamp(Pos2::new(50.0, 50.0), 20.0, BrushShape::Round));
        assert_eq!(mask.get_pixel(50, 50).0[0], 255);
        for (x, y, p) in mask.enumerate_pixels() {
            if p.0[0] > 0 {
                let d = Pos2::new(x as f32 + 0.5, y as f32 + 0.5).distance(Pos2::new(50.0, 50.0));
                assert!(d < 10.5 + 1e-3, "pixel ({x},{y}) at distance {d}");
            }
        }
    }

    #[test]
    fn square_stamp_covers_exact_box() {
        let mask = painted((40, 40), |s| s.stamp(Pos2::new(20.0, 20.0), 10.0, BrushShape::Square));
        assert_eq!(covered_pixels(&mask), 100);
        assert_eq!(mask.get_pixel(15, 15).0[0], 255);
        assert_eq!(mask.get_pixel(24, 24).0[0], 255);
        assert_eq!(mask.get_pixel(25, 25).0[0], 0);
    }

    #[test]
    fn stamp_spacing_follows_brush_size() {
        // size 40 → spacing 10; 35 px → ceil(3.5) = 4 intervals, 5 stamps.
        let pts = stamp_positions(Pos2::new(0.0, 0.0), Pos2::new(35.0, 0.0), 40.0);
        assert_eq!(pts.len(), 5);
        assert_eq!(pts[0], Pos2::new(0.0, 0.0));
        assert_eq!(pts[4], Pos2::new(35.0, 0.0));

        // small brushes never space closer than 2 px
        let pts = stamp_positions(Pos2::new(0.0, 0.0), Pos2::new(10.0, 0.0), 4.0);
        assert_eq!(pts.len(), 6);
    }

    #[test]
    fn zero_length_segment_still_stamps() {
        let pts = stamp_positions(Pos2::new(7.0, 7.0), Pos2::new(7.0, 7.0), 12.0);
        assert_eq!(pts.len(), 2);
        assert!(pts.iter().all(|&p| p == Pos2::new(7.0, 7.0)));
    }

    #[test]
    fn fast_motion_leaves_no_gaps() {
        let mask = painted((200, 20), |s| {
            s.line_of_stamps(Pos2::new(5.0, 10.0), Pos2::new(195.0, 10.0), 8.0, BrushShape::Round);
        });
        for x in 5..195 {
            assert_eq!(mask.get_pixel(x, 10).0[0], 255, "gap at x={x}");
        }
    }

    #[test]
    fn reversed_corners_normalize() {
        let rect = MaskRect::from_corners(Pos2::new(10.0, 10.0), Pos2::new(5.0, 5.0), [100, 100]);
        assert_eq!(rect, mask_rect(5.0, 5.0, 5.0, 5.0));
        assert!(!rect.is_degenerate());
    }

    #[test]
    fn rectangles_clamp_to_the_image() {
        let rect =
            MaskRect::from_corners(Pos2::new(-20.0, 90.0), Pos2::new(30.0, 400.0), [50, 100]);
        assert_eq!(rect, mask_rect(0.0, 90.0, 30.0, 10.0));
    }

    #[test]
    fn rectangle_replaces_previous_rectangle() {
        let mut stroke = StrokeBuffer::new(50, 50);
        stroke.set_rectangle(mask_rect(0.0, 0.0, 20.0, 20.0));
        stroke.set_rectangle(mask_rect(30.0, 30.0, 10.0, 10.0));
        assert_eq!(stroke.pixels().get_pixel(5, 5).0[0], 0);
        assert_eq!(stroke.pixels().get_pixel(35, 35).0[0], 255);
        assert_eq!(stroke.bounds(), Some((30, 30, 39, 39)));
    }

    #[test]
    fn degenerate_rectangle_draws_nothing() {
        let mut stroke = StrokeBuffer::new(50, 50);
        stroke.set_rectangle(mask_rect(10.0, 10.0, 4.0, 30.0));
        assert!(stroke.is_empty());
    }

    #[test]
    fn painting_twice_equals_painting_once() {
        let once = painted((64, 64), |s| s.stamp(Pos2::new(30.3, 31.7), 17.0, BrushShape::Round));
        let mut twice = once.clone();
        let mut stroke = StrokeBuffer::new(64, 64);
        stroke.stamp(Pos2::new(30.3, 31.7), 17.0, BrushShape::Round);
        commit(&mut twice, &stroke, BlendRule::Paint);
        assert_eq!(once, twice);
    }

    #[test]
    fn erase_undoes_identical_paint() {
        let mut mask = GrayImage::new(64, 64);
        let mut seed = StrokeBuffer::new(64, 64);
        seed.set_rectangle(mask_rect(0.0, 0.0, 10.0, 10.0));
        commit(&mut mask, &seed, BlendRule::Paint);
        let before = mask.clone();

        let mut stroke = StrokeBuffer::new(64, 64);
        stroke.line_of_stamps(Pos2::new(30.0, 20.0), Pos2::new(50.2, 44.9), 9.0, BrushShape::Round);
        commit(&mut mask, &stroke, BlendRule::Paint);
        assert_ne!(mask, before);
        commit(&mut mask, &stroke, BlendRule::Erase);
        assert_eq!(mask, before);
    }

    #[test]
    fn clear_resets_pixels_and_bounds() {
        let mut stroke = StrokeBuffer::new(30, 30);
        stroke.stamp(Pos2::new(15.0, 15.0), 8.0, BrushShape::Square);
        stroke.clear();
        assert!(stroke.is_empty());
        assert!(stroke.pixels().as_raw().iter().all(|&v| v == 0));
        assert_eq!(stroke.stamp_count(), 0);
    }

    #[test]
    fn stamps_off_the_edge_are_clipped() {
        let mask = painted((20, 20), |s| s.stamp(Pos2::new(-3.0, 19.5), 12.0, BrushShape::Round));
        assert!(covered_pixels(&mask) > 0);
        assert_eq!(mask.get_pixel(19, 0).0[0], 0);
    }

    #[test]
    fn preview_does_not_touch_committed_mask() {
        let committed = GrayImage::new(20, 20);
        let mut stroke = StrokeBuffer::new(20, 20);
        stroke.stamp(Pos2::new(10.0, 10.0), 6.0, BrushShape::Round);
        let preview = preview_mask(&committed, &stroke, BlendRule::Paint);
        assert!(covered_pixels(&preview) > 0);
        assert_eq!(covered_pixels(&committed), 0);
    }

    #[test]
    fn flood_fill_paints_uniform_mask_entirely() {
        let mut mask = GrayImage::new(100, 100);
        let n = flood_fill(&mut mask, Pos2::new(0.0, 0.0), BlendRule::Paint);
        assert_eq!(n, 100 * 100);
        assert!(mask.as_raw().iter().all(|&v| v == 255));
    }

    #[test]
    fn flood_fill_erase_clears_fully_redacted_mask() {
        let mut mask = GrayImage::from_pixel(100, 100, Luma([255]));
        let n = flood_fill(&mut mask, Pos2::new(0.0, 0.0), BlendRule::Erase);
        assert_eq!(n, 10_000);
        assert_eq!(covered_pixels(&mask), 0);
    }

    #[test]
    fn flood_fill_stops_at_edges_beyond_tolerance() {
        let mut mask = GrayImage::new(30, 10);
        for y in 0..10 {
            mask.put_pixel(15, y, Luma([200]));
        }
        // within tolerance of the zero seed: joins the region
        mask.put_pixel(3, 3, Luma([FLOOD_TOLERANCE]));
        let n = flood_fill(&mut mask, Pos2::new(2.0, 2.0), BlendRule::Paint);
        assert_eq!(n, 15 * 10);
        assert_eq!(mask.get_pixel(3, 3).0[0], 255);
        assert_eq!(mask.get_pixel(15, 0).0[0], 200);
        assert_eq!(mask.get_pixel(20, 5).0[0], 0);
    }

    #[test]
    fn flood_fill_clamps_out_of_range_seed() {
        let mut mask = GrayImage::new(8, 8);
        let n = flood_fill(&mut mask, Pos2::new(500.0, -3.0), BlendRule::Paint);
        assert_eq!(n, 64);
    }

    #[test]
    fn flood_fill_on_empty_raster_is_noop() {
        let mut mask = GrayImage::new(0, 0);
        assert_eq!(flood_fill(&mut mask, Pos2::ZERO, BlendRule::Paint), 0);
    }

    #[test]
    fn center_rect_is_ten_percent() {
        let rect = MaskRect::centered([200, 100], CENTER_RECT_FRACTION);
        assert_eq!(rect, mask_rect(90.0, 45.0, 20.0, 10.0));
    }
}
