//! Shared fixtures for the engine tests.
//!
//! Generated layers only use values for which every merge order gives the
//! exact same bytes, so a tree composite can be compared byte-for-byte with
//! a left-to-right fold:
//! - byte alpha is 0 or 255
//! - float alpha is 0.5 or 1 with colors on a 1/16 grid (sums stay exact)
//! - byte color over float alpha uses alpha 1 only
//! - background is all zero with depth 1.0, active depth is below 1
//! - for depth layers, half of the active pixels have alpha 0 and are
//!   visible through depth alone

use futures::future::join_all;
use tracing_subscriber::EnvFilter;

use sortlast_net::LocalWorld;
use sortlast_types::pixel::write_f32;
use sortlast_types::{CompositorConfig, ElementType, ImageBuffer, PixelFormat, PixelLayout};

use crate::compositor::{CompositeStatus, Compositor};
use crate::error::Result;
use crate::merge::{MergeKernel, MergeMode, MergeOp, Operand};

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// xorshift64, enough for reproducible fixtures.
pub(crate) struct XorShift(u64);

impl XorShift {
    pub(crate) fn new(seed: u64) -> Self {
        Self((seed ^ 0x9E37_79B9_7F4A_7C15).max(1))
    }

    pub(crate) fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn byte(&mut self) -> u8 {
        (self.next() >> 24) as u8
    }

    fn coin(&mut self) -> bool {
        self.next() & 0x100 != 0
    }
}

fn fill_pixel(px: &mut [u8], layout: PixelLayout, op: MergeOp, rng: &mut XorShift) {
    let active = rng.coin();
    if let Some(z) = layout.depth_offset {
        let depth = if active {
            (rng.next() % 1000) as f32 / 1024.0
        } else {
            1.0
        };
        write_f32(px, z, depth);
    }
    if !active {
        return;
    }

    match (layout.color, layout.alpha) {
        (ElementType::U8, ElementType::U8) => {
            for c in &mut px[..3] {
                *c = rng.byte();
            }
            px[layout.alpha_offset] = 255;
        }
        (ElementType::F32, _) => {
            let alpha = if op == MergeOp::Alpha && rng.coin() { 0.5 } else { 1.0 };
            for c in 0..3 {
                let level = (rng.next() % 9) as f32 / 8.0;
                write_f32(px, c * 4, level * alpha);
            }
            write_f32(px, layout.alpha_offset, alpha);
        }
        (ElementType::U8, ElementType::F32) => {
            for c in &mut px[..3] {
                *c = rng.byte();
            }
            if let Some(pad) = layout.pad_offset {
                px[pad] = rng.byte();
            }
            write_f32(px, layout.alpha_offset, 1.0);
        }
    }

    if op == MergeOp::Depth && layout.has_depth() && rng.coin() {
        match layout.alpha {
            ElementType::U8 => px[layout.alpha_offset] = 0,
            ElementType::F32 => write_f32(px, layout.alpha_offset, 0.0),
        }
    }
}

/// `count` random layers of `width` x `height` pixels, one per rank.
pub(crate) fn random_layers(
    format: PixelFormat,
    op: MergeOp,
    count: usize,
    width: u32,
    height: u32,
    seed: u64,
) -> Vec<ImageBuffer> {
    let mut rng = XorShift::new(seed);
    let layout = format.layout();
    (0..count)
        .map(|_| {
            let mut img = ImageBuffer::new(width, height, format);
            for i in 0..img.pixel_count() {
                fill_pixel(img.pixel_mut(i), layout, op, &mut rng);
            }
            img
        })
        .collect()
}

/// Left-to-right fold of `layers`, rank 0 farthest.
pub(crate) fn sequential_reference(layers: &[ImageBuffer], op: MergeOp) -> ImageBuffer {
    let kernel = MergeKernel::new(layers[0].format(), op, &CompositorConfig::default());
    let mut acc = layers[0].clone();
    for layer in &layers[1..] {
        kernel
            .merge(acc.as_bytes_mut(), layer.as_bytes(), Operand::First)
            .unwrap();
    }
    acc
}

/// Declare each layer's bounding box under `op` as its ROI.
pub(crate) fn with_declared_roi(layers: Vec<ImageBuffer>, op: MergeOp) -> Vec<ImageBuffer> {
    layers
        .into_iter()
        .map(|img| {
            let bounds = img.bounding_box(op.background());
            img.with_roi(bounds).unwrap()
        })
        .collect()
}

/// Composite `layers` (layer `r` on rank `r`) over an in-process world.
/// Returns each rank's status and image, in rank order.
pub(crate) async fn composite_world(
    layers: Vec<ImageBuffer>,
    mode: MergeMode,
    config: CompositorConfig,
) -> Vec<(Result<CompositeStatus>, ImageBuffer)> {
    let n = layers.len();
    let world = LocalWorld::new(n);
    let comms = world.communicators();

    join_all(layers.into_iter().zip(&comms).enumerate().map(|(rank, (mut image, comm))| {
        let config = config.clone();
        async move {
            let mut compositor = Compositor::new(config);
            let (width, height, format) = (image.width(), image.height(), image.format());
            let status = match compositor.init(rank, n, width, height, format) {
                Ok(()) => {
                    compositor
                        .composite(rank, n, width, height, format, mode, &mut image, comm)
                        .await
                }
                Err(e) => Err(e),
            };
            (status, image)
        }
    }))
    .await
}
