// THEORY:
// The `FrameSampler` shrinks every incoming frame to a 10% working copy before
// detection. Working on the small grid is what keeps the flood fill inside the
// per-frame budget: a 1280x720 frame becomes 128x72, about 9k pixels.
//
// Key architectural principles:
// 1.  **Spatial Pooling**: each small pixel is the average of the block of
//     source pixels it covers (a box filter). Averaging doubles as noise
//     reduction, so single hot pixels rarely survive to the detector.
// 2.  **One Persistent Surface**: the small buffer lives as long as the sampler.
//     It is resized in place when the source dimensions change and otherwise
//     overwritten, never reallocated per frame.
// 3.  **No Interpretation**: no color-space conversion happens here. Alpha is
//     averaged along with the other channels but nothing downstream reads it.

use crate::core_modules::pixel::pixel::CHANNELS;

/// Fixed linear scale of the detection grid relative to the source frame.
pub const SCALE: f64 = 0.1;

/// Grid length for a source length: `floor(len * SCALE)`.
pub fn scaled_dimension(len: u32) -> u32 {
    (len as f64 * SCALE).floor() as u32
}

/// A borrowed view of the downsampled RGBA grid.
#[derive(Debug, Clone, Copy)]
pub struct SampledGrid<'a> {
    pub width: u32,
    pub height: u32,
    pub pixels: &'a [u8],
}

impl SampledGrid<'_> {
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Owns the persistent small working surface.
#[derive(Debug, Default)]
pub struct FrameSampler {
    buffer: Vec<u8>,
    width: u32,
    height: u32,
    source_width: u32,
    source_height: u32,
}

impl FrameSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Raw RGBA bytes of the last sampled grid.
    pub fn as_rgba(&self) -> &[u8] {
        &self.buffer
    }

    pub fn grid(&self) -> SampledGrid<'_> {
        SampledGrid {
            width: self.width,
            height: self.height,
            pixels: &self.buffer,
        }
    }

    pub fn sample_image(&mut self, frame: &image::RgbaImage) -> SampledGrid<'_> {
        self.sample(frame.as_raw(), frame.width(), frame.height())
    }

    /// Resamples a `source_width x source_height` RGBA buffer into the working
    /// surface. A buffer shorter than its stated size yields an empty grid.
    pub fn sample(&mut self, frame_buffer: &[u8], source_width: u32, source_height: u32) -> SampledGrid<'_> {
        let expected = source_width as usize * source_height as usize * CHANNELS;
        if frame_buffer.len() < expected {
            self.resize(0, 0, 0, 0);
            return self.grid();
        }

        if source_width != self.source_width || source_height != self.source_height {
            self.resize(
                source_width,
                source_height,
                scaled_dimension(source_width),
                scaled_dimension(source_height),
            );
        }

        let src_w = source_width as usize;
        let src_h = source_height as usize;
        let dst_w = self.width as usize;
        let dst_h = self.height as usize;

        for sy in 0..dst_h {
            let (y0, y1) = block_bounds(sy, src_h, dst_h);
            for sx in 0..dst_w {
                let (x0, x1) = block_bounds(sx, src_w, dst_w);

                let mut sums = [0u64; CHANNELS];
                for y in y0..y1 {
                    let row = y * src_w;
                    for x in x0..x1 {
                        let byte_index = (row + x) * CHANNELS;
                        for (c, sum) in sums.iter_mut().enumerate() {
                            *sum += frame_buffer[byte_index + c] as u64;
                        }
                    }
                }

                let count = ((y1 - y0) * (x1 - x0)) as u64;
                let out = (sy * dst_w + sx) * CHANNELS;
                for (c, sum) in sums.iter().enumerate() {
                    self.buffer[out + c] = (sum / count) as u8;
                }
            }
        }

        self.grid()
    }

    fn resize(&mut self, source_width: u32, source_height: u32, width: u32, height: u32) {
        self.source_width = source_width;
        self.source_height = source_height;
        self.width = width;
        self.height = height;
        self.buffer
            .resize(width as usize * height as usize * CHANNELS, 0);
    }
}

/// Source range `[start, end)` covered by destination index `i`. Never empty
/// while `src_len >= dst_len`, which `scaled_dimension` guarantees.
#[inline]
fn block_bounds(i: usize, src_len: usize, dst_len: usize) -> (usize, usize) {
    let start = i * src_len / dst_len;
    let end = ((i + 1) * src_len / dst_len).max(start + 1).min(src_len);
    (start, end)
}
