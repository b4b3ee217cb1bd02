//! Composition entry points.
//!
//! A [`Compositor`] owns one scratch slot per pixel format. The lifecycle is
//! `init` → any number of `composite` calls → `destroy`, with every rank of
//! the job making the same calls in the same order.
//!
//! `composite` runs, in order:
//! 1. remainder routing (world communicator)
//! 2. intra-group reduction into the representatives
//! 3. binary swap among representatives
//! 4. bit-reversal gather at the root, then the remainder splice

use tracing::{error, info};

use sortlast_net::Communicator;
use sortlast_types::{CompositorConfig, ImageBuffer, PixelFormat, Rect};

use crate::buffers::{BufferManager, ScratchSlot};
use crate::error::{CompositeError, Result};
use crate::exchange::{binary_swap, binary_swap_schedule, reduce_group, ExchangeState};
use crate::gather::{collect_remainder, gather_fragments, ROOT_RANK};
use crate::groups::ProcessGroups;
use crate::merge::{MergeKernel, MergeMode, MergeOp};
use crate::remainder::exchange_remainder;

/// Outcome of one successful composition on one rank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompositeStatus {
    /// True only on the root, whose image now holds the final composite.
    pub holds_final_image: bool,
    /// Merges of partner data performed by this rank.
    pub rounds: u32,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

#[derive(Debug, Default)]
pub struct Compositor {
    config: CompositorConfig,
    buffers: BufferManager,
}

impl Compositor {
    pub fn new(config: CompositorConfig) -> Self {
        Self {
            config,
            buffers: BufferManager::new(),
        }
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    pub fn is_initialized(&self, format: PixelFormat) -> bool {
        self.buffers.is_initialized(format)
    }

    /// Size the `format` slot for a job of `process_count` ranks and a
    /// `width` x `height` image.
    pub fn init(
        &mut self,
        rank: usize,
        process_count: usize,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<()> {
        self.buffers
            .init(rank, process_count, width, height, format)
            .map(|_| ())
    }

    /// [`Compositor::init`] with a numeric format id.
    pub fn init_with_format_id(
        &mut self,
        rank: usize,
        process_count: usize,
        width: u32,
        height: u32,
        format_id: u32,
    ) -> Result<()> {
        let format = PixelFormat::try_from(format_id)?;
        self.init(rank, process_count, width, height, format)
    }

    /// Release the `format` slot. Fails with `NotInitialized` if there is none.
    pub fn destroy(&mut self, format: PixelFormat) -> Result<()> {
        self.buffers.destroy(format)
    }

    /// Composite `image` across every rank of `comm`.
    ///
    /// On the root (rank 0) `image` holds the final image afterwards; on
    /// other ranks its content is unspecified. Fatal errors abort the job
    /// through `comm` before they are returned.
    #[allow(clippy::too_many_arguments)]
    pub async fn composite<C: Communicator>(
        &mut self,
        rank: usize,
        process_count: usize,
        width: u32,
        height: u32,
        format: PixelFormat,
        mode: MergeMode,
        image: &mut ImageBuffer,
        comm: &C,
    ) -> Result<CompositeStatus> {
        let config = &self.config;
        let slot = self.buffers.slot_mut(format)?;
        preflight(slot, rank, process_count, width, height, mode, image, comm)?;

        info!(rank, process_count, %format, %mode, width, height, "composite start");
        match run(config, slot, mode, image, comm).await {
            Ok(status) => {
                if status.holds_final_image {
                    info!(
                        rank,
                        %format,
                        bytes_sent = status.bytes_sent,
                        bytes_received = status.bytes_received,
                        "final image assembled"
                    );
                }
                Ok(status)
            }
            Err(e) => {
                if e.is_fatal() {
                    error!(rank, %format, %mode, error = %e, "compositing failed, aborting job");
                    comm.abort(&e.to_string());
                }
                Err(e)
            }
        }
    }

    /// Like [`Compositor::composite`], taking the image by value and
    /// returning the final image on the root only.
    pub async fn composite_to_owned<C: Communicator>(
        &mut self,
        rank: usize,
        process_count: usize,
        mode: MergeMode,
        mut image: ImageBuffer,
        comm: &C,
    ) -> Result<Option<ImageBuffer>> {
        let (width, height, format) = (image.width(), image.height(), image.format());
        let status = self
            .composite(rank, process_count, width, height, format, mode, &mut image, comm)
            .await?;
        Ok(status.holds_final_image.then_some(image))
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
fn preflight<C: Communicator>(
    slot: &ScratchSlot,
    rank: usize,
    process_count: usize,
    width: u32,
    height: u32,
    mode: MergeMode,
    image: &ImageBuffer,
    comm: &C,
) -> Result<()> {
    if !slot.matches(rank, process_count, width, height) {
        return Err(CompositeError::Configuration(format!(
            "composite of rank {rank}/{process_count} at {width}x{height} does not match the \
             slot initialized for rank {}/{} at {}x{}",
            slot.rank(),
            slot.process_count(),
            slot.width(),
            slot.height()
        )));
    }
    if comm.rank() != rank || comm.size() != process_count {
        return Err(CompositeError::Configuration(format!(
            "communicator is rank {} of {}, caller claims rank {rank} of {process_count}",
            comm.rank(),
            comm.size()
        )));
    }
    if image.width() != width || image.height() != height || image.format() != slot.format() {
        return Err(CompositeError::Configuration(format!(
            "image is {}x{} {}, expected {width}x{height} {}",
            image.width(),
            image.height(),
            image.format(),
            slot.format()
        )));
    }
    if mode.op() == MergeOp::Depth && !slot.format().has_depth() {
        return Err(CompositeError::Configuration(format!(
            "{mode} needs a depth channel, {} has none",
            slot.format()
        )));
    }
    Ok(())
}

async fn run<C: Communicator>(
    config: &CompositorConfig,
    slot: &mut ScratchSlot,
    mode: MergeMode,
    image: &mut ImageBuffer,
    comm: &C,
) -> Result<CompositeStatus> {
    let format = slot.format();
    let layout = format.layout();
    let kernel = MergeKernel::new(format, mode.op(), config);
    let (plan, gather_plan, work) = slot.parts_mut();

    let regular_bytes = gather_plan.regular_pixels() * layout.bytes_per_pixel;
    work[..regular_bytes].copy_from_slice(&image.as_bytes()[..regular_bytes]);
    work[regular_bytes..].fill(0);

    let merged_remainder = exchange_remainder(
        comm,
        gather_plan.remainder(),
        &kernel,
        format,
        image.as_bytes(),
        config.max_message_bytes,
    )
    .await?;

    let groups = ProcessGroups::build(comm, plan).await?;
    let roi = if mode.is_roi() {
        image.effective_roi(mode.op().background())
    } else {
        Rect::full(image.width(), image.height())
    };
    let mut state = ExchangeState::new(
        kernel,
        format,
        mode,
        image.width() as usize,
        gather_plan.regular_pixels(),
        roi,
        config.max_message_bytes,
    );

    if let Some(intra) = groups.intra() {
        reduce_group(intra, &mut state, work).await?;
    }

    let mut gathered = None;
    if let (Some(swap), Some(gather)) = (groups.swap(), groups.gather()) {
        let schedule = binary_swap_schedule(swap.rank(), swap.size(), gather_plan.padded_pixels());
        binary_swap(swap, &mut state, work, &schedule).await?;
        gathered = gather_fragments(gather, gather_plan, layout, work, swap.rank()).await?;
    }

    let holds_final_image = gathered.is_some();
    if let Some(bytes) = gathered {
        image.as_bytes_mut()[..regular_bytes].copy_from_slice(&bytes[..regular_bytes]);
    }
    collect_remainder(
        comm,
        gather_plan.remainder(),
        format,
        merged_remainder,
        image.as_bytes_mut(),
        config.max_message_bytes,
    )
    .await?;

    debug_assert!(!holds_final_image || comm.rank() == ROOT_RANK);
    let stats = state.stats();
    Ok(CompositeStatus {
        holds_final_image,
        rounds: stats.rounds,
        bytes_sent: stats.bytes_sent,
        bytes_received: stats.bytes_received,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::REDUCE_TAG_BASE;
    use crate::test_support::{
        composite_world, init_tracing, random_layers, sequential_reference, with_declared_roi,
    };
    use futures::future::join_all;
    use sortlast_net::LocalWorld;
    use sortlast_types::pixel::write_f32;

    fn opaque_rgba32(width: u32, height: u32, at: usize, color: [u8; 3]) -> ImageBuffer {
        let mut img = ImageBuffer::new(width, height, PixelFormat::Rgba32);
        img.pixel_mut(at).copy_from_slice(&[color[0], color[1], color[2], 255]);
        img
    }

    #[tokio::test]
    async fn scenario_four_processes_one_pixel_each() {
        init_tracing();
        let colors = [[255, 0, 0], [0, 255, 0], [0, 0, 255], [255, 255, 0]];
        let images = (0..4).map(|r| opaque_rgba32(2, 2, r, colors[r])).collect();

        let results = composite_world(images, MergeMode::Alpha, CompositorConfig::default()).await;

        let (status, root) = &results[0];
        assert!(status.as_ref().unwrap().holds_final_image);
        for (i, c) in colors.iter().enumerate() {
            assert_eq!(root.pixel(i), &[c[0], c[1], c[2], 255]);
        }
        for (status, _) in &results[1..] {
            assert!(!status.as_ref().unwrap().holds_final_image);
        }
    }

    #[tokio::test]
    async fn scenario_four_processes_background_stays_black() {
        init_tracing();
        // Only ranks 0 and 3 draw anything; pixels 1 and 2 stay transparent black.
        let images = (0..4)
            .map(|r| match r {
                0 => opaque_rgba32(2, 2, 0, [9, 8, 7]),
                3 => opaque_rgba32(2, 2, 3, [1, 2, 3]),
                _ => ImageBuffer::new(2, 2, PixelFormat::Rgba32),
            })
            .collect();
        let results = composite_world(images, MergeMode::Alpha, CompositorConfig::default()).await;
        let root = &results[0].1;
        assert_eq!(root.as_bytes(), &[9, 8, 7, 255, 0, 0, 0, 0, 0, 0, 0, 0, 1, 2, 3, 255]);
    }

    #[tokio::test]
    async fn scenario_three_processes_match_sequential_merge() {
        init_tracing();
        for format in PixelFormat::ALL {
            let images = random_layers(format, MergeOp::Alpha, 3, 5, 3, 0xB0B);
            let expected = sequential_reference(&images, MergeOp::Alpha);

            let results =
                composite_world(images, MergeMode::Alpha, CompositorConfig::default()).await;
            let (status, root) = &results[0];
            assert!(status.as_ref().unwrap().holds_final_image);
            assert_eq!(root.as_bytes(), expected.as_bytes(), "{format}");
        }
    }

    #[tokio::test]
    async fn scenario_five_processes_seven_pixels() {
        init_tracing();
        // Pixel i is drawn by rank i mod 5 only, so every pixel must come
        // through exactly once, including the two remainder pixels.
        let images = (0..5)
            .map(|r| {
                let mut img = ImageBuffer::new(7, 1, PixelFormat::Rgba32);
                for i in (r..7).step_by(5) {
                    img.pixel_mut(i).copy_from_slice(&[10 * i as u8 + 1, r as u8, 0, 255]);
                }
                img
            })
            .collect();

        let results = composite_world(images, MergeMode::Alpha, CompositorConfig::default()).await;
        let root = &results[0].1;
        for i in 0..7 {
            assert_eq!(root.pixel(i), &[10 * i as u8 + 1, (i % 5) as u8, 0, 255], "pixel {i}");
        }
    }

    #[tokio::test]
    async fn every_process_count_matches_sequential_merge() {
        init_tracing();
        for n in 1..=9 {
            for format in PixelFormat::ALL {
                for mode in [MergeMode::Alpha, MergeMode::AlphaCompressed, MergeMode::AlphaRoi] {
                    let images = random_layers(format, MergeOp::Alpha, n, 7, 3, n as u64 * 31 + 7);
                    let expected = sequential_reference(&images, MergeOp::Alpha);
                    let results = composite_world(images, mode, CompositorConfig::default()).await;
                    assert_eq!(
                        results[0].1.as_bytes(),
                        expected.as_bytes(),
                        "n={n} {format} {mode}"
                    );
                    assert!(results.iter().all(|(s, _)| s.is_ok()));
                }
            }
        }
    }

    #[tokio::test]
    async fn depth_modes_match_sequential_merge() {
        init_tracing();
        let depth_formats = PixelFormat::ALL.into_iter().filter(|f| f.has_depth());
        for format in depth_formats {
            for n in [1, 2, 3, 5, 6, 7, 8, 9] {
                for mode in [MergeMode::Depth, MergeMode::DepthRoi, MergeMode::DepthCompressed] {
                    let images = random_layers(format, MergeOp::Depth, n, 6, 5, 99 + n as u64);
                    let expected = sequential_reference(&images, MergeOp::Depth);
                    let results = composite_world(images, mode, CompositorConfig::default()).await;
                    assert_eq!(
                        results[0].1.as_bytes(),
                        expected.as_bytes(),
                        "n={n} {format} {mode}"
                    );
                }
            }
        }
    }

    #[tokio::test]
    async fn depth_roi_sends_transparent_near_pixels() {
        init_tracing();
        // Alpha is zero everywhere; only depth decides visibility.
        let layer = |depth: f32, color: u8| {
            let mut img = ImageBuffer::new(2, 1, PixelFormat::Rgbaz64);
            for i in 0..2 {
                let px = img.pixel_mut(i);
                px[..3].fill(color);
                write_f32(px, 4, depth);
            }
            img
        };
        let expected = layer(0.1, 200);

        for mode in [MergeMode::Depth, MergeMode::DepthRoi, MergeMode::DepthCompressed] {
            let images = vec![layer(0.9, 10), layer(0.1, 200)];
            let results = composite_world(images, mode, CompositorConfig::default()).await;
            assert_eq!(results[0].1.as_bytes(), expected.as_bytes(), "{mode}");
        }

        // Same with the bounding box declared up front.
        let images = with_declared_roi(vec![layer(0.9, 10), layer(0.1, 200)], MergeOp::Depth);
        assert_eq!(images[0].roi(), Some(Rect::full(2, 1)));
        let results = composite_world(images, MergeMode::DepthRoi, CompositorConfig::default()).await;
        assert_eq!(results[0].1.as_bytes(), expected.as_bytes());
    }

    #[tokio::test]
    async fn declared_roi_matches_dense() {
        init_tracing();
        for n in [2, 3, 4, 6] {
            let images = random_layers(PixelFormat::Rgbaz88, MergeOp::Alpha, n, 8, 4, 5);
            let dense = composite_world(images.clone(), MergeMode::Alpha, CompositorConfig::default()).await;
            let roi = composite_world(
                with_declared_roi(images, MergeOp::Alpha),
                MergeMode::AlphaRoi,
                CompositorConfig::default(),
            )
            .await;
            assert_eq!(roi[0].1.as_bytes(), dense[0].1.as_bytes(), "n={n}");
        }
    }

    #[tokio::test]
    async fn sparse_images_compress_well() {
        init_tracing();
        let images: Vec<ImageBuffer> = (0..4)
            .map(|r| opaque_rgba32(64, 64, r * 100, [1, 2, 3]))
            .collect();
        let dense = composite_world(images.clone(), MergeMode::Alpha, CompositorConfig::default()).await;
        let runs =
            composite_world(images, MergeMode::AlphaCompressed, CompositorConfig::default()).await;

        assert_eq!(runs[0].1.as_bytes(), dense[0].1.as_bytes());
        let sent = |r: &[(Result<CompositeStatus>, ImageBuffer)]| -> u64 {
            r.iter().map(|(s, _)| s.as_ref().unwrap().bytes_sent).sum()
        };
        assert!(sent(&runs) * 10 < sent(&dense));
    }

    #[tokio::test]
    async fn lut_and_parallel_settings_do_not_change_output() {
        init_tracing();
        let images = random_layers(PixelFormat::Rgba32, MergeOp::Alpha, 6, 9, 9, 4242);
        let baseline = composite_world(images.clone(), MergeMode::Alpha, CompositorConfig::default()).await;
        let config = CompositorConfig {
            use_blend_lut: false,
            parallel_merge_pixels: 1,
            ..CompositorConfig::default()
        };
        let tuned = composite_world(images, MergeMode::Alpha, config).await;
        assert_eq!(tuned[0].1.as_bytes(), baseline[0].1.as_bytes());
    }

    #[tokio::test]
    async fn composite_to_owned_returns_image_at_root_only() {
        init_tracing();
        let world = LocalWorld::new(3);
        let comms = world.communicators();
        let outputs = join_all(comms.iter().enumerate().map(|(rank, comm)| async move {
            let mut compositor = Compositor::default();
            compositor.init(rank, 3, 3, 1, PixelFormat::Rgba32)?;
            let image = opaque_rgba32(3, 1, rank, [rank as u8, 0, 0]);
            compositor
                .composite_to_owned(rank, 3, MergeMode::Alpha, image, comm)
                .await
        }))
        .await;

        let root = outputs[0].as_ref().unwrap().as_ref().unwrap();
        assert_eq!(root.as_bytes(), &[0, 0, 0, 255, 1, 0, 0, 255, 2, 0, 0, 255]);
        assert!(outputs[1].as_ref().unwrap().is_none());
        assert!(outputs[2].as_ref().unwrap().is_none());
    }

    #[tokio::test]
    async fn repeated_compositions_reuse_the_slot() {
        init_tracing();
        let world = LocalWorld::new(2);
        let comms = world.communicators();
        let outputs = join_all(comms.iter().enumerate().map(|(rank, comm)| async move {
            let mut compositor = Compositor::default();
            compositor.init(rank, 2, 2, 1, PixelFormat::Rgba32)?;
            let mut last = None;
            for frame in 0..3u8 {
                let mut image = opaque_rgba32(2, 1, rank, [frame, rank as u8, 0]);
                compositor
                    .composite(rank, 2, 2, 1, PixelFormat::Rgba32, MergeMode::Alpha, &mut image, comm)
                    .await?;
                last = Some(image);
            }
            Ok::<_, CompositeError>(last)
        }))
        .await;

        let root = outputs[0].as_ref().unwrap().as_ref().unwrap();
        assert_eq!(root.as_bytes(), &[2, 0, 0, 255, 2, 1, 0, 255]);
    }

    #[tokio::test]
    async fn uninitialized_or_destroyed_format_fails_without_peers() {
        init_tracing();
        let world = LocalWorld::new(1);
        let comms = world.communicators();
        let comm = &comms[0];
        let mut compositor = Compositor::default();
        let mut image = ImageBuffer::new(2, 2, PixelFormat::Rgbaz64);

        let err = compositor
            .composite(0, 1, 2, 2, PixelFormat::Rgbaz64, MergeMode::Depth, &mut image, comm)
            .await
            .unwrap_err();
        assert!(matches!(err, CompositeError::NotInitialized(PixelFormat::Rgbaz64)));
        assert_eq!(err.status_code(), 2);

        compositor.init(0, 1, 2, 2, PixelFormat::Rgbaz64).unwrap();
        compositor
            .composite(0, 1, 2, 2, PixelFormat::Rgbaz64, MergeMode::Depth, &mut image, comm)
            .await
            .unwrap();

        compositor.destroy(PixelFormat::Rgbaz64).unwrap();
        let err = compositor
            .composite(0, 1, 2, 2, PixelFormat::Rgbaz64, MergeMode::Depth, &mut image, comm)
            .await
            .unwrap_err();
        assert!(!err.is_fatal());
        assert!(world.abort_reason().is_none());
    }

    #[test]
    fn destroy_requires_an_initialized_slot() {
        let mut compositor = Compositor::default();
        assert!(matches!(
            compositor.destroy(PixelFormat::Rgba32),
            Err(CompositeError::NotInitialized(PixelFormat::Rgba32))
        ));

        compositor.init(0, 2, 4, 4, PixelFormat::Rgba32).unwrap();
        compositor.destroy(PixelFormat::Rgba32).unwrap();
        let err = compositor.destroy(PixelFormat::Rgba32).unwrap_err();
        assert!(matches!(err, CompositeError::NotInitialized(PixelFormat::Rgba32)));
        assert_eq!(err.status_code(), 2);
        assert!(!compositor.is_initialized(PixelFormat::Rgba32));
    }

    #[tokio::test]
    async fn configuration_errors_are_caught_before_any_exchange() {
        init_tracing();
        let world = LocalWorld::new(2);
        let comms = world.communicators();
        let mut compositor = Compositor::default();

        assert!(matches!(
            compositor.init_with_format_id(0, 2, 4, 4, 8),
            Err(CompositeError::Configuration(_))
        ));
        assert!(matches!(
            compositor.init(0, 2, 0, 4, PixelFormat::Rgba32),
            Err(CompositeError::Configuration(_))
        ));
        compositor.init_with_format_id(0, 2, 4, 4, 0).unwrap();
        assert!(compositor.is_initialized(PixelFormat::Rgba32));

        let mut image = ImageBuffer::new(4, 4, PixelFormat::Rgba32);
        let cases = [
            (0, 2, 4, 3, MergeMode::Alpha, &comms[0]),
            (0, 3, 4, 4, MergeMode::Alpha, &comms[0]),
            (1, 2, 4, 4, MergeMode::Alpha, &comms[0]),
            (0, 2, 4, 4, MergeMode::Depth, &comms[0]),
        ];
        for (rank, n, w, h, mode, comm) in cases {
            let err = compositor
                .composite(rank, n, w, h, PixelFormat::Rgba32, mode, &mut image, comm)
                .await
                .unwrap_err();
            assert!(matches!(err, CompositeError::Configuration(_)), "{err}");
            assert_eq!(err.status_code(), 1);
        }

        // Image geometry must match too.
        let mut small = ImageBuffer::new(2, 2, PixelFormat::Rgba32);
        let err = compositor
            .composite(0, 2, 4, 4, PixelFormat::Rgba32, MergeMode::Alpha, &mut small, &comms[0])
            .await
            .unwrap_err();
        assert!(matches!(err, CompositeError::Configuration(_)));
        assert!(world.abort_reason().is_none());
    }

    #[tokio::test]
    async fn peers_disagreeing_on_geometry_abort_the_job() {
        init_tracing();
        let world = LocalWorld::new(2);
        let comms = world.communicators();
        // Rank 0 believes the image is 4x1, rank 1 that it is 3x1.
        let widths = [4u32, 3];
        let results = join_all(comms.iter().enumerate().map(|(rank, comm)| async move {
            let width = widths[rank];
            let mut compositor = Compositor::default();
            compositor.init(rank, 2, width, 1, PixelFormat::Rgba32)?;
            let mut image = ImageBuffer::new(width, 1, PixelFormat::Rgba32);
            compositor
                .composite(rank, 2, width, 1, PixelFormat::Rgba32, MergeMode::Alpha, &mut image, comm)
                .await
        }))
        .await;

        assert!(results.iter().all(|r| r.as_ref().is_err_and(CompositeError::is_fatal)));
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(CompositeError::ProtocolMismatch(_)))));
        assert!(world.abort_reason().is_some());
    }

    #[tokio::test]
    async fn corrupted_payload_aborts_the_job() {
        init_tracing();
        let world = LocalWorld::new(3);
        let comms = world.communicators();
        // Ranks 0 and 1 composite normally. In place of rank 2, a saboteur
        // joins the group communicator and sends garbage on the level-1
        // reduction tag.
        let saboteur = async {
            let intra = comms[2].create_ordered(&[0, 1, 2]).await?;
            intra.send(0, REDUCE_TAG_BASE + 1, vec![0xFF; 3]).await
        };
        let (results, sabotage) = futures::join!(
            join_all(comms[..2].iter().enumerate().map(|(rank, comm)| async move {
                let mut compositor = Compositor::default();
                compositor.init(rank, 3, 3, 1, PixelFormat::Rgbaz64)?;
                let mut image = ImageBuffer::new(3, 1, PixelFormat::Rgbaz64);
                for i in 0..3 {
                    write_f32(image.pixel_mut(i), 4, 1.0);
                }
                compositor
                    .composite(rank, 3, 3, 1, PixelFormat::Rgbaz64, MergeMode::Depth, &mut image, comm)
                    .await
            })),
            saboteur,
        );
        sabotage.unwrap();

        assert!(matches!(results[0], Err(CompositeError::ProtocolMismatch(_))));
        assert_eq!(results[0].as_ref().unwrap_err().status_code(), 4);
        assert!(results[1].is_ok());
        assert!(world.abort_reason().is_some());
    }
}
