// Engine configuration. Every rank of a job must use the same values.

/// Tuning knobs for the compositing engine.
#[derive(Debug, Clone)]
pub struct CompositorConfig {
    /// Use the 256x256 product / 512-entry saturation tables for 8-bit alpha
    /// blending instead of direct integer arithmetic. Both give identical output.
    /// Default: `true`.
    pub use_blend_lut: bool,

    /// Dense merges over at least this many pixels are split across the
    /// `rayon` thread pool. Default: 65 536 pixels.
    pub parallel_merge_pixels: usize,

    /// Reject any received fragment envelope larger than this.
    /// Default: 1 GiB (a 64-megapixel RGBAZ160 half-image fits).
    pub max_message_bytes: usize,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            use_blend_lut: true,
            parallel_merge_pixels: 64 * 1024,
            max_message_bytes: 1024 * 1024 * 1024,
        }
    }
}
