// THEORY:
// The `pipeline` module is the top-level, per-frame API of the engine. It wires
// the four stages into a single call and owns every piece of memory they reuse:
//
//   Frame Sampler -> Blob Detector -> Blob Selector -> Renderer
//
// `BlobPipeline` owns the small sampling surface, the detector's `visited` and
// `queue` buffers, the scratch blob list and the full-resolution output
// surface. All of them are resized only when the source dimensions change, so
// a steady video stream runs without per-frame allocation in the detection
// path. The caller passes a configuration snapshot with every frame; nothing
// inside the pipeline can observe a half-updated configuration.

use crate::config::EffectConfig;
use crate::core_modules::blob::Blob;
use crate::core_modules::blob_detector::{DetectorBuffers, blob_detector};
use crate::core_modules::blob_selector::blob_selector;
use crate::core_modules::frame_sampler::FrameSampler;
use crate::renderer::{RenderSummary, Renderer};
use ab_glyph::FontArc;
use image::RgbaImage;
use tracing::debug;

/// The result of one `process_frame` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameSummary {
    /// Zero-based count of frames this pipeline has processed.
    pub frame_index: u64,
    /// Components above the noise floor before selection.
    pub detected: usize,
    /// Blobs kept after selection.
    pub selected: usize,
    pub render: RenderSummary,
}

/// The main, top-level struct for the effect engine.
pub struct BlobPipeline {
    sampler: FrameSampler,
    buffers: DetectorBuffers,
    blobs: Vec<Blob>,
    renderer: Renderer,
    surface: RgbaImage,
    frames_processed: u64,
}

impl Default for BlobPipeline {
    fn default() -> Self {
        Self::with_renderer(Renderer::new())
    }
}

impl BlobPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_font(font: FontArc) -> Self {
        Self::with_renderer(Renderer::with_font(font))
    }

    fn with_renderer(renderer: Renderer) -> Self {
        Self {
            sampler: FrameSampler::new(),
            buffers: DetectorBuffers::new(),
            blobs: Vec::new(),
            renderer,
            surface: RgbaImage::new(0, 0),
            frames_processed: 0,
        }
    }

    /// Sampler + detector + selector only. Returns the selected blobs, ranked.
    pub fn detect(&mut self, frame: &RgbaImage, config: &EffectConfig) -> &[Blob] {
        let grid = self.sampler.sample_image(frame);
        blob_detector::find_blobs(grid, config.threshold, &mut self.buffers, &mut self.blobs);
        let detected = self.blobs.len();
        blob_selector::select_blobs(&mut self.blobs, config.max_blobs);
        debug!(detected, selected = self.blobs.len(), "blob detection pass");
        &self.blobs
    }

    /// Runs the whole frame: copies `frame` onto the output surface, detects
    /// and selects blobs, and draws the overlay.
    pub fn process_frame(&mut self, frame: &RgbaImage, config: &EffectConfig) -> FrameSummary {
        // --- Stage 1: Full-resolution frame onto the output surface ---
        if self.surface.dimensions() != frame.dimensions() {
            self.surface = RgbaImage::new(frame.width(), frame.height());
        }
        self.surface.copy_from_slice(frame.as_raw());

        // --- Stage 2: Sampling ---
        let grid = self.sampler.sample_image(frame);

        // --- Stage 3: Detection ---
        blob_detector::find_blobs(grid, config.threshold, &mut self.buffers, &mut self.blobs);
        let detected = self.blobs.len();

        // --- Stage 4: Selection ---
        blob_selector::select_blobs(&mut self.blobs, config.max_blobs);

        // --- Stage 5: Overlay ---
        let render = self.renderer.render(&mut self.surface, &self.blobs, config);

        let summary = FrameSummary {
            frame_index: self.frames_processed,
            detected,
            selected: self.blobs.len(),
            render,
        };
        self.frames_processed += 1;
        debug!(
            frame = summary.frame_index,
            detected,
            selected = summary.selected,
            "frame processed"
        );
        summary
    }

    /// The rendered output of the last processed frame.
    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    /// Selected blobs of the last frame, in id order.
    pub fn selected_blobs(&self) -> &[Blob] {
        &self.blobs
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }
}
