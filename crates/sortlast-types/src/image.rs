// Format-tagged image storage and regions of interest.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::ImageError;
use crate::pixel::{Background, PixelFormat, PixelLayout};

// ── Resolution presets ───────────────────────────────────────────────────────

/// 4096 x 1024 equivalent.
pub const MPIXELS_4: usize = 4 * 1024 * 1024;
/// 8192 x 1024 equivalent.
pub const MPIXELS_8: usize = 8 * 1024 * 1024;
/// 16384 x 1024 equivalent.
pub const MPIXELS_16: usize = 16 * 1024 * 1024;
/// 32768 x 1024 equivalent.
pub const MPIXELS_32: usize = 32 * 1024 * 1024;
/// 65536 x 1024 equivalent.
pub const MPIXELS_64: usize = 64 * 1024 * 1024;
/// 131072 x 1024 equivalent.
pub const MPIXELS_128: usize = 128 * 1024 * 1024;

// ── Rect ─────────────────────────────────────────────────────────────────────

/// Half-open pixel rectangle `[x0, x1) x [y0, y1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Rect {
    pub const EMPTY: Rect = Rect { x0: 0, y0: 0, x1: 0, y1: 0 };

    pub const fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub const fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub const fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }

    pub const fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    pub const fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    pub const fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }

    /// Smallest rectangle covering both. Empty rectangles are ignored.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    pub const fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x1 <= width && self.y1 <= height
    }

    /// Raster-order pixel index ranges where this rectangle meets `span`.
    ///
    /// `span` is a range of linear pixel indices in an image `image_width`
    /// pixels wide. One range is produced per rectangle row that intersects
    /// the span, in increasing order.
    pub fn segments(
        self,
        image_width: usize,
        span: Range<usize>,
    ) -> impl Iterator<Item = Range<usize>> {
        let w = image_width.max(1);
        let rows = if self.is_empty() || span.is_empty() {
            0..0
        } else {
            (self.y0 as usize).max(span.start / w)..(self.y1 as usize).min(span.end.div_ceil(w))
        };
        rows.filter_map(move |y| {
            let start = (y * w + self.x0 as usize).max(span.start);
            let end = (y * w + self.x1 as usize).min(span.end);
            (start < end).then_some(start..end)
        })
    }

    /// Total pixel count of [`Rect::segments`].
    pub fn segment_pixels(self, image_width: usize, span: Range<usize>) -> usize {
        self.segments(image_width, span).map(|s| s.len()).sum()
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{})x[{},{})", self.x0, self.x1, self.y0, self.y1)
    }
}

// ── ImageBuffer ──────────────────────────────────────────────────────────────

/// Row-major pixel records tagged with their geometry and layout.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    roi: Option<Rect>,
    data: Vec<u8>,
}

impl ImageBuffer {
    /// A zero-filled (transparent black) image.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let len = width as usize * height as usize * format.bytes_per_pixel();
        Self {
            width,
            height,
            format,
            roi: None,
            data: vec![0u8; len],
        }
    }

    /// Wrap existing pixel records. The length must match the geometry exactly.
    pub fn from_bytes(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, ImageError> {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(ImageError::LengthMismatch {
                width,
                height,
                format: format.to_string(),
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            roi: None,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn layout(&self) -> PixelLayout {
        self.format.layout()
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn pixel(&self, index: usize) -> &[u8] {
        let bpp = self.format.bytes_per_pixel();
        &self.data[index * bpp..(index + 1) * bpp]
    }

    pub fn pixel_mut(&mut self, index: usize) -> &mut [u8] {
        let bpp = self.format.bytes_per_pixel();
        &mut self.data[index * bpp..(index + 1) * bpp]
    }

    pub fn pixel_at(&self, x: u32, y: u32) -> &[u8] {
        self.pixel(y as usize * self.width as usize + x as usize)
    }

    pub fn pixel_at_mut(&mut self, x: u32, y: u32) -> &mut [u8] {
        let index = y as usize * self.width as usize + x as usize;
        self.pixel_mut(index)
    }

    /// Caller-declared region of interest, if any.
    pub fn roi(&self) -> Option<Rect> {
        self.roi
    }

    pub fn set_roi(&mut self, roi: Option<Rect>) -> Result<(), ImageError> {
        if let Some(r) = roi {
            if !r.fits_within(self.width, self.height) {
                return Err(ImageError::RoiOutOfBounds {
                    roi: r.to_string(),
                    width: self.width,
                    height: self.height,
                });
            }
        }
        self.roi = roi;
        Ok(())
    }

    pub fn with_roi(mut self, roi: Rect) -> Result<Self, ImageError> {
        self.set_roi(Some(roi))?;
        Ok(self)
    }

    /// Bounding box of all pixels that are not `background`.
    pub fn bounding_box(&self, background: Background) -> Rect {
        let layout = self.layout();
        let w = self.width as usize;
        let mut bounds = Rect::EMPTY;
        for (i, px) in self.data.chunks_exact(layout.bytes_per_pixel).enumerate() {
            if layout.is_background(px, background) {
                continue;
            }
            let (x, y) = ((i % w) as u32, (i / w) as u32);
            bounds = bounds.union(&Rect::new(x, y, x + 1, y + 1));
        }
        bounds
    }

    /// The declared ROI, or the computed bounding box when none was declared.
    pub fn effective_roi(&self, background: Background) -> Rect {
        self.roi.unwrap_or_else(|| self.bounding_box(background))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
