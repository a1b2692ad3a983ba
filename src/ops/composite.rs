// ============================================================================
// COMPOSITOR - source + effect layer + mask → output, mask → tint overlay
// ============================================================================

use image::{GrayImage, Rgba, RgbaImage};
use rayon::prelude::*;

/// Editing-feedback tint (straight alpha): orange at ~45 % opacity.
pub const OVERLAY_TINT: Rgba<u8> = Rgba([242, 107, 58, 115]);

/// Tint layer that is visible only where the mask has coverage.  Its alpha
/// scales with mask coverage so soft brush edges stay soft.  On-screen only,
/// never exported.
pub fn build_overlay(mask: &GrayImage) -> RgbaImage {
    let w = mask.width() as usize;
    let h = mask.height() as usize;
    let mask_raw = mask.as_raw();
    let mut dst_raw = vec![0u8; w * h * 4];
    if w == 0 || h == 0 {
        return RgbaImage::new(w as u32, h as u32);
    }

    let [tr, tg, tb, ta] = OVERLAY_TINT.0;
    dst_raw
        .par_chunks_mut(w * 4)
        .enumerate()
        .for_each(|(y, row_out)| {
            let mrow = &mask_raw[y * w..(y + 1) * w];
            for (x, &m) in mrow.iter().enumerate() {
                if m == 0 {
                    continue;
                }
                let a = (ta as u32 * m as u32 + 127) / 255;
                row_out[x * 4..x * 4 + 4].copy_from_slice(&[tr, tg, tb, a as u8]);
            }
        });

    RgbaImage::from_raw(w as u32, h as u32, dst_raw)
        .unwrap_or_else(|| RgbaImage::new(w as u32, h as u32))
}

/// Censored result: `source` everywhere, with `effect` cut in through the
/// mask.  Full coverage copies the effect pixel, partial coverage mixes the
/// two by `mask / 255`, and zero coverage leaves the source byte-for-byte.
pub fn build_output(source: &RgbaImage, effect: &RgbaImage, mask: &GrayImage) -> RgbaImage {
    if source.dimensions() != effect.dimensions() || source.dimensions() != mask.dimensions() {
        crate::log_err!(
            "build_output: size mismatch source {:?} effect {:?} mask {:?}",
            source.dimensions(),
            effect.dimensions(),
            mask.dimensions()
        );
        return source.clone();
    }
    let w = source.width() as usize;
    if w == 0 || source.height() == 0 {
        return source.clone();
    }

    let src_raw = source.as_raw();
    let fx_raw = effect.as_raw();
    let mask_raw = mask.as_raw();
    let stride = w * 4;
    let mut dst_raw = src_raw.clone();

    dst_raw
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row_out)| {
            let mrow = &mask_raw[y * w..(y + 1) * w];
            let frow = &fx_raw[y * stride..(y + 1) * stride];
            for (x, &m) in mrow.iter().enumerate() {
                if m == 0 {
                    continue;
                }
                let pi = x * 4;
                if m == 255 {
                    row_out[pi..pi + 4].copy_from_slice(&frow[pi..pi + 4]);
                    continue;
                }
                let t = m as u32;
                for c in 0..4 {
                    let s = row_out[pi + c] as u32;
                    let e = frow[pi + c] as u32;
                    row_out[pi + c] = ((s * (255 - t) + e * t + 127) / 255) as u8;
                }
            }
        });

    RgbaImage::from_raw(source.width(), source.height(), dst_raw).unwrap_or_else(|| source.clone())
}

/// Alpha-over of `top` (straight alpha) onto `base`, used to bake the tint
/// into the on-screen editing view.
pub fn overlay_onto(base: &RgbaImage, top: &RgbaImage) -> RgbaImage {
    if base.dimensions() != top.dimensions() {
        return base.clone();
    }
    let mut out = base.clone();
    let out_raw: &mut [u8] = &mut out;
    out_raw
        .par_chunks_mut(4)
        .zip(top.as_raw().par_chunks(4))
        .for_each(|(dst, src)| {
            let a = src[3] as u32;
            if a == 0 {
                return;
            }
            for c in 0..3 {
                dst[c] = ((dst[c] as u32 * (255 - a) + src[c] as u32 * a + 127) / 255) as u8;
            }
            dst[3] = (dst[3] as u32 + (a * (255 - dst[3] as u32) + 127) / 255).min(255) as u8;
        });
    out
}
