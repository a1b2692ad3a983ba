//! RedactFE core: mask editing, effect rendering and compositing for image
//! redaction.  The binary target wraps this in an eframe window; everything
//! here runs headless.

pub mod canvas;
pub mod components;
pub mod error;
pub mod io;
pub mod logger;
pub mod ops;
pub mod session;

pub use error::RedactError;
pub use session::EditorSession;
