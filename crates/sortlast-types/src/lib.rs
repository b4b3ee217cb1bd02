//! `sortlast-types` — shared data model for sort-last image compositing.
//!
//! - [`PixelFormat`] / [`PixelLayout`] — the eight wire pixel layouts
//! - [`ImageBuffer`] / [`Rect`] — format-tagged pixel storage and regions of interest
//! - [`CompositorConfig`] — engine tuning knobs

pub mod config;
pub mod error;
pub mod image;
pub mod pixel;

pub use config::CompositorConfig;
pub use error::{ImageError, UnknownPixelFormat};
pub use image::{ImageBuffer, Rect};
pub use pixel::{Background, ElementType, PixelFormat, PixelLayout, FAR_PLANE, MAX_BYTES_PER_PIXEL};

/// Library version, as reported by the compositing drivers.
pub const VERSION: &str = "0.9.1";
