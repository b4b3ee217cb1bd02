// Pixel layout catalog.
//
// Eight fixed-size wire layouts. Numeric ids match the ids used by existing
// drivers and raw image dumps (row-major, top-left origin, native byte order).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::UnknownPixelFormat;

/// Largest pixel record in the catalog (`RGBAZ160`, five f32 channels).
pub const MAX_BYTES_PER_PIXEL: usize = 20;

// ── Element type ─────────────────────────────────────────────────────────────

/// Storage type of a single channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    U8,
    F32,
}

impl ElementType {
    pub const fn size(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::F32 => 4,
        }
    }
}

// ── Layout descriptor ────────────────────────────────────────────────────────

/// Byte layout of one pixel record.
///
/// Color channels (R, G, B) always start at offset 0 and are contiguous.
/// Alpha, the optional padding byte (`X` in `RGBX`) and the optional depth
/// channel follow at the recorded offsets. Depth is always f32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelLayout {
    pub bytes_per_pixel: usize,
    pub color: ElementType,
    pub alpha: ElementType,
    pub alpha_offset: usize,
    pub pad_offset: Option<usize>,
    pub depth_offset: Option<usize>,
}

impl PixelLayout {
    /// Number of color channels preceding alpha.
    pub const COLOR_CHANNELS: usize = 3;

    /// Byte offset of color channel `index` (0 = R, 1 = G, 2 = B).
    pub const fn color_offset(&self, index: usize) -> usize {
        index * self.color.size()
    }

    pub const fn has_depth(&self) -> bool {
        self.depth_offset.is_some()
    }

    /// Number of pixels in a byte slice of this layout.
    pub const fn pixel_count(&self, bytes: usize) -> usize {
        bytes / self.bytes_per_pixel
    }

    /// Byte range covering pixels `[first, first + count)`.
    pub const fn byte_range(&self, first: usize, count: usize) -> std::ops::Range<usize> {
        first * self.bytes_per_pixel..(first + count) * self.bytes_per_pixel
    }

    /// Alpha of a pixel normalized to `[0, 1]` for byte alpha, raw for float alpha.
    pub fn alpha(&self, pixel: &[u8]) -> f32 {
        match self.alpha {
            ElementType::U8 => pixel[self.alpha_offset] as f32 / 255.0,
            ElementType::F32 => read_f32(pixel, self.alpha_offset),
        }
    }

    /// True if the pixel contributes nothing under alpha compositing.
    pub fn is_transparent(&self, pixel: &[u8]) -> bool {
        match self.alpha {
            ElementType::U8 => pixel[self.alpha_offset] == 0,
            ElementType::F32 => read_f32(pixel, self.alpha_offset) == 0.0,
        }
    }

    pub fn depth(&self, pixel: &[u8]) -> Option<f32> {
        self.depth_offset.map(|off| read_f32(pixel, off))
    }

    /// True if `pixel` is empty space under `background`.
    pub fn is_background(&self, pixel: &[u8], background: Background) -> bool {
        match (background, self.depth(pixel)) {
            (Background::FarPlane, Some(z)) => z >= FAR_PLANE || z.is_nan(),
            _ => self.is_transparent(pixel),
        }
    }
}

// ── Background ───────────────────────────────────────────────────────────────

/// Depth of the far plane. Depth values are normalized to `[0, 1]`.
pub const FAR_PLANE: f32 = 1.0;

/// Which pixels count as empty when bounding the content of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Background {
    /// Alpha is zero. Empty for alpha compositing.
    Transparent,
    /// Depth at or beyond [`FAR_PLANE`], or NaN. Empty for depth compositing;
    /// such a pixel never replaces a nearer one. Layouts without depth fall
    /// back to [`Background::Transparent`].
    FarPlane,
}

/// Read a native-endian f32 at `offset`.
#[inline]
pub fn read_f32(bytes: &[u8], offset: usize) -> f32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    f32::from_ne_bytes(raw)
}

/// Write a native-endian f32 at `offset`.
#[inline]
pub fn write_f32(bytes: &mut [u8], offset: usize, value: f32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
}

// ── Pixel format ─────────────────────────────────────────────────────────────

/// The eight supported pixel layouts.
///
/// Discriminants are the wire ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u32)]
pub enum PixelFormat {
    /// u8 R, G, B, A.
    Rgba32   = 0,
    /// u8 R, G, B, A + f32 Z.
    Rgbaz64  = 1,
    /// f32 R, G, B, A.
    Rgba128  = 2,
    /// f32 R, G, B, A, Z.
    Rgbaz160 = 3,
    /// u8 R, G, B + f32 A.
    Rgba56   = 4,
    /// u8 R, G, B + f32 A + f32 Z.
    Rgbaz88  = 5,
    /// u8 R, G, B, X + f32 A.
    Rgba64   = 6,
    /// u8 R, G, B, X + f32 A + f32 Z.
    Rgbaz96  = 7,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 8] = [
        Self::Rgba32,
        Self::Rgbaz64,
        Self::Rgba128,
        Self::Rgbaz160,
        Self::Rgba56,
        Self::Rgbaz88,
        Self::Rgba64,
        Self::Rgbaz96,
    ];

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    pub const fn id(self) -> u32 {
        self as u32
    }

    /// Index into per-format tables (same as the id).
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn layout(self) -> PixelLayout {
        use ElementType::{F32, U8};
        let (bytes_per_pixel, color, alpha, alpha_offset, pad_offset, depth_offset) = match self {
            Self::Rgba32   => (4,  U8,  U8,  3,  None,    None),
            Self::Rgbaz64  => (8,  U8,  U8,  3,  None,    Some(4)),
            Self::Rgba128  => (16, F32, F32, 12, None,    None),
            Self::Rgbaz160 => (20, F32, F32, 12, None,    Some(16)),
            Self::Rgba56   => (7,  U8,  F32, 3,  None,    None),
            Self::Rgbaz88  => (11, U8,  F32, 3,  None,    Some(7)),
            Self::Rgba64   => (8,  U8,  F32, 4,  Some(3), None),
            Self::Rgbaz96  => (12, U8,  F32, 4,  Some(3), Some(8)),
        };
        PixelLayout {
            bytes_per_pixel,
            color,
            alpha,
            alpha_offset,
            pad_offset,
            depth_offset,
        }
    }

    pub const fn bytes_per_pixel(self) -> usize {
        self.layout().bytes_per_pixel
    }

    /// RGBA formats have 4 channels, RGBAZ formats 5. The `X` pad byte is not a channel.
    pub const fn channel_count(self) -> usize {
        if self.has_depth() { 5 } else { 4 }
    }

    pub const fn has_depth(self) -> bool {
        self.layout().depth_offset.is_some()
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Rgba32   => "RGBA32",
            Self::Rgbaz64  => "RGBAZ64",
            Self::Rgba128  => "RGBA128",
            Self::Rgbaz160 => "RGBAZ160",
            Self::Rgba56   => "RGBA56",
            Self::Rgbaz88  => "RGBAZ88",
            Self::Rgba64   => "RGBA64",
            Self::Rgbaz96  => "RGBAZ96",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u32> for PixelFormat {
    type Error = UnknownPixelFormat;

    fn try_from(id: u32) -> Result<Self, Self::Error> {
        Self::from_id(id).ok_or(UnknownPixelFormat(id))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
