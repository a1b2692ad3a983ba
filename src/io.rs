use crate::error::RedactError;
use image::codecs::png::PngEncoder;
use image::{ImageEncoder, RgbaImage};
use rfd::FileDialog;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "webp", "bmp", "tga", "gif", "ico", "tiff", "tif",
];

// ============================================================================
// DECODE
// ============================================================================

/// Decode any format the image crate understands into RGBA8.
pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage, RedactError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| RedactError::Decode(e.to_string()))?
        .to_rgba8();
    if img.width() == 0 || img.height() == 0 {
        return Err(RedactError::Decode("image has no pixels".into()));
    }
    Ok(img)
}

pub fn open_image(path: &Path) -> Result<RgbaImage, RedactError> {
    let bytes = std::fs::read(path)?;
    decode_image(&bytes)
}

/// Image from the system clipboard: raw bitmap data first, then a copied
/// file path as text.
pub fn read_clipboard_image() -> Result<RgbaImage, RedactError> {
    let mut clip = arboard::Clipboard::new().map_err(|e| RedactError::Clipboard(e.to_string()))?;

    if let Ok(img_data) = clip.get_image()
        && let Some(img) = RgbaImage::from_raw(
            img_data.width as u32,
            img_data.height as u32,
            img_data.bytes.into_owned(),
        )
        && img.width() > 0
        && img.height() > 0
    {
        return Ok(img);
    }

    if let Ok(text) = clip.get_text() {
        let path = Path::new(text.trim());
        if path.is_file() {
            return open_image(path);
        }
    }

    Err(RedactError::Clipboard("no image data".into()))
}

// ============================================================================
// ENCODE / EXPORT
// ============================================================================

/// Clear the least-significant bit of every alpha byte.  Anything hidden in
/// the alpha LSB plane is destroyed; opacity changes by at most 1/255.
pub fn scrub_alpha_lsb(img: &mut RgbaImage) {
    for px in img.pixels_mut() {
        px.0[3] &= 0xFE;
    }
}

/// PNG byte stream for `img`.
pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, RedactError> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf).write_image(
        img.as_raw(),
        img.width(),
        img.height(),
        image::ColorType::Rgba8,
    )?;
    if buf.is_empty() {
        return Err(RedactError::Encode("encoder returned no data".into()));
    }
    Ok(buf)
}

pub fn save_png(path: &Path, bytes: &[u8]) -> Result<(), RedactError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(bytes)?;
    writer.flush()?;
    Ok(())
}

// ============================================================================
// NATIVE DIALOGS
// ============================================================================

pub fn pick_image_file() -> Option<PathBuf> {
    FileDialog::new()
        .add_filter("Images", IMAGE_EXTENSIONS)
        .add_filter("All Files", &["*"])
        .pick_file()
}

pub fn pick_save_path() -> Option<PathBuf> {
    let path = FileDialog::new()
        .add_filter("PNG", &["png"])
        .set_file_name("redacted.png")
        .save_file()?;
    // the output is always PNG, whatever the user typed
    if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("png")) {
        Some(path)
    } else {
        Some(path.with_extension("png"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn scrub_clears_only_alpha_low_bit() {
        let mut img = RgbaImage::from_pixel(3, 2, Rgba([255, 255, 255, 255]));
        img.put_pixel(1, 1, Rgba([1, 3, 5, 128]));
        scrub_alpha_lsb(&mut img);
        assert_eq!(*img.get_pixel(0, 0), Rgba([255, 255, 255, 254]));
        assert_eq!(*img.get_pixel(1, 1), Rgba([1, 3, 5, 128]));
        assert!(img.pixels().all(|p| p.0[3] & 1 == 0));
    }

    #[test]
    fn png_bytes_decode_back_to_same_pixels() {
        let img = RgbaImage::from_fn(7, 5, |x, y| {
            Rgba([x as u8 * 30, y as u8 * 40, 9, 255 - x as u8])
        });
        let bytes = encode_png(&img).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
        assert_eq!(decode_image(&bytes).unwrap(), img);
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        let err = decode_image(b"definitely not an image").unwrap_err();
        assert!(matches!(err, RedactError::Decode(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = open_image(Path::new("/nonexistent/redactfe/input.png")).unwrap_err();
        assert!(matches!(err, RedactError::Io(_)));
    }
}
