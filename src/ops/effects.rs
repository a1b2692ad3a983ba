// ============================================================================
// EFFECT RENDERER - full-frame censor layers, rayon-parallelized
// ============================================================================
//
// Each effect produces a complete transformed copy of the source.  The mask
// alone decides which of its pixels become visible, so a layer is rebuilt
// only when the effect kind or its strength changes, never per stroke.
// ============================================================================

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

/// Pixelation block size bounds.
pub const MIN_PIXEL_STRENGTH: u32 = 1;
pub const MAX_PIXEL_STRENGTH: u32 = 60;
/// Blur radius bounds (source pixels).
pub const MAX_BLUR_RADIUS: f32 = 100.0;

/// Censorship effect shown through the mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum EffectKind {
    SolidFill,
    Blur,
    #[default]
    Pixelate,
}

impl EffectKind {
    pub fn label(&self) -> &'static str {
        match self {
            EffectKind::SolidFill => "Black",
            EffectKind::Blur => "Blur",
            EffectKind::Pixelate => "Pixelate",
        }
    }

    pub fn all() -> &'static [EffectKind] {
        &[EffectKind::SolidFill, EffectKind::Blur, EffectKind::Pixelate]
    }
}

/// Everything an effect layer depends on besides the source pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EffectParams {
    pub kind: EffectKind,
    pub pixel_strength: u32,
    pub blur_radius: f32,
}

impl EffectParams {
    /// Two parameter sets that render identical layers compare equal, so the
    /// strength of an effect that is not selected never invalidates the cache.
    pub fn normalized(self) -> Self {
        match self.kind {
            EffectKind::SolidFill => Self {
                kind: self.kind,
                pixel_strength: 0,
                blur_radius: 0.0,
            },
            EffectKind::Blur => Self {
                pixel_strength: 0,
                blur_radius: self.blur_radius.clamp(0.0, MAX_BLUR_RADIUS),
                ..self
            },
            EffectKind::Pixelate => Self {
                pixel_strength: self.pixel_strength.clamp(MIN_PIXEL_STRENGTH, MAX_PIXEL_STRENGTH),
                blur_radius: 0.0,
                ..self
            },
        }
    }
}

/// Render the full-frame layer for `params`.
pub fn render_effect_layer(src: &RgbaImage, params: &EffectParams) -> RgbaImage {
    let p = params.normalized();
    match p.kind {
        EffectKind::SolidFill => solid_fill_layer(src.width(), src.height()),
        EffectKind::Blur => gaussian_blur_layer(src, p.blur_radius),
        EffectKind::Pixelate => pixelate_layer(src, p.pixel_strength),
    }
}

// --- Solid fill ---

/// Constant opaque black.
pub fn solid_fill_layer(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]))
}

// --- Blur ---

/// Normalized 1-D Gaussian with standard deviation `sigma`, truncated at 3σ.
fn build_gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil() as usize;
    if radius == 0 {
        return vec![1.0];
    }
    let len = radius * 2 + 1;
    let s2 = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..len)
        .map(|i| {
            let x = i as f32 - radius as f32;
            (-x * x / s2).exp()
        })
        .collect();
    let inv = 1.0 / kernel.iter().sum::<f32>();
    for v in &mut kernel {
        *v *= inv;
    }
    kernel
}

/// Separable Gaussian blur with σ = `radius` source pixels (the same meaning
/// a CSS `blur(radius px)` filter gives it).  Edges clamp.
///
/// Colour is convolved premultiplied, so RGB under fully transparent pixels
/// never bleeds into the blurred edge.
pub fn gaussian_blur_layer(src: &RgbaImage, radius: f32) -> RgbaImage {
    let w = src.width() as usize;
    let h = src.height() as usize;
    if w == 0 || h == 0 || radius < 0.5 {
        return src.clone();
    }

    let kernel = build_gaussian_kernel(radius);
    let kr = (kernel.len() / 2) as isize;
    let src_raw = src.as_raw();
    let stride = w * 4;

    // Horizontal pass (parallel by row) into premultiplied f32.
    let mut buf_h = vec![0.0f32; w * h * 4];
    buf_h.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        let row_in = &src_raw[y * stride..(y + 1) * stride];
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (ki, &kv) in kernel.iter().enumerate() {
                let sx = (x as isize + ki as isize - kr).clamp(0, w as isize - 1) as usize;
                let si = sx * 4;
                let a = row_in[si + 3] as f32;
                let weight = a / 255.0 * kv;
                for c in 0..3 {
                    acc[c] += row_in[si + c] as f32 * weight;
                }
                acc[3] += a * kv;
            }
            row_out[x * 4..x * 4 + 4].copy_from_slice(&acc);
        }
    });

    // Vertical pass, then unpremultiply back to u8.
    let mut dst_raw = vec![0u8; w * h * 4];
    dst_raw.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (ki, &kv) in kernel.iter().enumerate() {
                let sy = (y as isize + ki as isize - kr).clamp(0, h as isize - 1) as usize;
                let si = sy * stride + x * 4;
                for c in 0..4 {
                    acc[c] += buf_h[si + c] * kv;
                }
            }
            let alpha = acc[3].round().clamp(0.0, 255.0);
            if alpha > 0.0 {
                let unmul = 255.0 / acc[3];
                for c in 0..3 {
                    row_out[x * 4 + c] = (acc[c] * unmul).round().clamp(0.0, 255.0) as u8;
                }
            }
            row_out[x * 4 + 3] = alpha as u8;
        }
    });

    RgbaImage::from_raw(w as u32, h as u32, dst_raw).unwrap_or_else(|| src.clone())
}

// --- Pixelate ---

/// Size of the intermediate raster: `max(1, floor(dim / strength))` per axis.
pub fn pixelate_grid(width: u32, height: u32, strength: u32) -> (u32, u32) {
    let s = strength.clamp(MIN_PIXEL_STRENGTH, MAX_PIXEL_STRENGTH);
    ((width / s).max(1), (height / s).max(1))
}

/// Area-average down to the pixelate grid, then nearest-neighbour back up.
/// The two resamples share cell boundaries, so each visible block is exactly
/// the mean of the source pixels underneath it.
pub fn pixelate_layer(src: &RgbaImage, strength: u32) -> RgbaImage {
    let w = src.width();
    let h = src.height();
    if w == 0 || h == 0 {
        return src.clone();
    }
    let (gw, gh) = pixelate_grid(w, h, strength);
    let small = area_downsample(src, gw, gh);
    nearest_upsample(&small, w, h)
}

/// Box-filter downsample: output cell `i` averages source columns
/// `[floor(i·w/gw), floor((i+1)·w/gw))`, likewise for rows.
fn area_downsample(src: &RgbaImage, gw: u32, gh: u32) -> RgbaImage {
    let w = src.width() as u64;
    let h = src.height() as u64;
    let src_raw = src.as_raw();
    let src_stride = w as usize * 4;
    let mut dst_raw = vec![0u8; gw as usize * gh as usize * 4];

    dst_raw
        .par_chunks_mut(gw as usize * 4)
        .enumerate()
        .for_each(|(gy, row_out)| {
            let y0 = (gy as u64 * h / gh as u64) as usize;
            let y1 = (((gy as u64 + 1) * h / gh as u64) as usize).max(y0 + 1);
            for gx in 0..gw as usize {
                let x0 = (gx as u64 * w / gw as u64) as usize;
                let x1 = (((gx as u64 + 1) * w / gw as u64) as usize).max(x0 + 1);
                let mut sums = [0u64; 4];
                for y in y0..y1 {
                    let row = &src_raw[y * src_stride..(y + 1) * src_stride];
                    for x in x0..x1 {
                        for c in 0..4 {
                            sums[c] += row[x * 4 + c] as u64;
                        }
                    }
                }
                let n = ((y1 - y0) * (x1 - x0)) as u64;
                for c in 0..4 {
                    row_out[gx * 4 + c] = ((sums[c] + n / 2) / n) as u8;
                }
            }
        });

    RgbaImage::from_raw(gw, gh, dst_raw).unwrap_or_else(|| RgbaImage::new(gw, gh))
}

/// Nearest-neighbour upsample without any smoothing.
fn nearest_upsample(small: &RgbaImage, w: u32, h: u32) -> RgbaImage {
    let gw = small.width() as u64;
    let gh = small.height() as u64;
    let small_raw = small.as_raw();
    let small_stride = gw as usize * 4;
    let mut dst_raw = vec![0u8; w as usize * h as usize * 4];

    dst_raw
        .par_chunks_mut(w as usize * 4)
        .enumerate()
        .for_each(|(y, row_out)| {
            let sy = cell_of(y as u64, gh, h as u64);
            let row_in = &small_raw[sy * small_stride..(sy + 1) * small_stride];
            for x in 0..w as usize {
                let sx = cell_of(x as u64, gw, w as u64);
                row_out[x * 4..x * 4 + 4].copy_from_slice(&row_in[sx * 4..sx * 4 + 4]);
            }
        });

    RgbaImage::from_raw(w, h, dst_raw).unwrap_or_else(|| RgbaImage::new(w, h))
}

/// Grid cell holding pixel `p` when `full` pixels are split into `cells`
/// the way `area_downsample` splits them: the last `i` with
/// `floor(i·full/cells) <= p`.
#[inline]
fn cell_of(p: u64, cells: u64, full: u64) -> usize {
    (((p + 1) * cells - 1) / full) as usize
}
