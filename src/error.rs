//! Caller-recoverable failures.
//!
//! Misuse of the recording API (unbalanced draw brackets, unbalanced
//! save/restore) is a programming error and panics instead.

/// Errors reported by resource creation and rendering.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A texture was requested larger than `GL_MAX_TEXTURE_SIZE`.
    #[error("texture of {width}x{height} exceeds the maximum texture size of {max}")]
    TextureTooLarge {
        /// Requested width.
        width: i32,
        /// Requested height.
        height: i32,
        /// Largest dimension the driver supports.
        max: i32,
    },

    /// `glCheckFramebufferStatus` did not report completeness.
    #[error("framebuffer is incomplete (status {0:#06x})")]
    IncompleteFramebuffer(u32),

    /// The GL driver failed to create an object.
    #[error("GL error: {0}")]
    Gl(String),
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Self::Gl(message)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
