// ============================================================================
// ERRORS - every failure the editing session can report to the shell
// ============================================================================

/// Error type for session, codec and clipboard operations.
///
/// None of these are fatal: the session is left exactly as it was before the
/// failing call, and the shell turns the message into status text.
#[derive(Debug)]
pub enum RedactError {
    /// A drawing, fill, history or export operation was attempted before any
    /// image was loaded.
    NoImage,
    /// Undo/redo was requested while a stroke is still being drawn.
    GestureActive,
    /// The input bytes could not be decoded into a raster.
    Decode(String),
    /// The encoder produced no data or failed outright.
    Encode(String),
    /// The system clipboard had no usable image.
    Clipboard(String),
    Io(std::io::Error),
}

impl std::fmt::Display for RedactError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RedactError::NoImage => write!(f, "No image loaded"),
            RedactError::GestureActive => write!(f, "Finish the current stroke first"),
            RedactError::Decode(e) => write!(f, "Could not load that image: {}", e),
            RedactError::Encode(e) => write!(f, "Export failed: {}", e),
            RedactError::Clipboard(e) => write!(f, "Clipboard has no image: {}", e),
            RedactError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for RedactError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RedactError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RedactError {
    fn from(e: std::io::Error) -> Self {
        RedactError::Io(e)
    }
}

impl From<image::ImageError> for RedactError {
    fn from(e: image::ImageError) -> Self {
        match e {
            image::ImageError::IoError(io) => RedactError::Io(io),
            image::ImageError::Encoding(enc) => RedactError::Encode(enc.to_string()),
            other => RedactError::Decode(other.to_string()),
        }
    }
}
