// Error types shared by the image and pixel catalog.

/// A numeric pixel-format id outside the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown pixel format id {0}")]
pub struct UnknownPixelFormat(pub u32);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageError {
    #[error("image has zero pixels ({width}x{height})")]
    Empty { width: u32, height: u32 },

    #[error("buffer length {actual} does not match {width}x{height} {format} ({expected} bytes)")]
    LengthMismatch {
        width: u32,
        height: u32,
        format: String,
        expected: usize,
        actual: usize,
    },

    #[error("region of interest {roi} exceeds {width}x{height}")]
    RoiOutOfBounds { roi: String, width: u32, height: u32 },
}
