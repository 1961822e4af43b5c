// THEORY:
// The `BlobDetector` is the engine of the spatial grouping stage. It scans the
// downsampled grid for pixels brighter than the threshold and grows each one into
// a 4-connected component with an iterative breadth-first flood fill.
//
// Key architectural principles & algorithm steps:
// 1.  **Seeding**: the grid is scanned row-major, top to bottom, left to right.
//     Every above-threshold pixel that is not yet part of a component seeds a
//     new one.
// 2.  **Region Growing**: the component grows through the right, left, down and
//     up neighbors, in that order. A neighbor is enqueued only if it is in
//     bounds, unvisited, and brighter than the threshold, and it is marked
//     visited the moment it is enqueued. No pixel can enter the queue twice in
//     one frame, so a fill never touches more than `width * height` entries.
// 3.  **Bounded Memory**: `visited` and `queue` live in `DetectorBuffers`, owned
//     by the pipeline and reused every frame. The hot loop performs no heap
//     allocation and no recursion; the emitted blobs go into a caller-owned
//     `Vec` that is cleared, not reallocated.
// 4.  **Data Aggregation**: while the queue drains we accumulate the sum of x,
//     the sum of y and the pixel count. Components of two pixels or fewer are
//     dropped as noise; the rest become `Blob`s with their centroid mapped back
//     to full resolution by dividing by the grid scale.
// 5.  **Stateless Utility**: apart from the scratch buffers, the detector keeps
//     nothing between frames.

use crate::core_modules::blob::Blob;
use crate::core_modules::frame_sampler::{SCALE, SampledGrid};
use crate::core_modules::pixel::pixel::{CHANNELS, brightness_at};

/// Components must be strictly larger than this to be reported.
pub const MIN_COMPONENT_PIXELS: usize = 2;

/// Scratch memory for one detection pass, reused across frames.
#[derive(Debug, Default)]
pub struct DetectorBuffers {
    /// One byte per grid pixel; non-zero once the pixel has been enqueued.
    visited: Vec<u8>,
    /// Pending `(x, y)` pairs, laid out flat. Twice the grid pixel count.
    queue: Vec<u32>,
}

impl DetectorBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sizes the buffers for a grid and clears `visited`. Capacity is kept
    /// when the grid shrinks, so a stable source never reallocates.
    pub fn prepare(&mut self, pixel_count: usize) {
        if self.visited.len() != pixel_count {
            self.visited.resize(pixel_count, 0);
            self.queue.resize(pixel_count * 2, 0);
        }
        self.visited.fill(0);
    }

    pub fn pixel_capacity(&self) -> usize {
        self.visited.len()
    }
}

pub mod blob_detector {
    use super::*;

    /// Finds every component of above-threshold pixels in `grid` and appends
    /// the ones larger than `MIN_COMPONENT_PIXELS` to `blobs` (cleared first),
    /// in seed scan order with `id = 0`.
    pub fn find_blobs(
        grid: SampledGrid<'_>,
        threshold: f64,
        buffers: &mut DetectorBuffers,
        blobs: &mut Vec<Blob>,
    ) {
        blobs.clear();
        if grid.is_empty() {
            return;
        }

        let width = grid.width as usize;
        let height = grid.height as usize;
        let pixels = grid.pixels;
        buffers.prepare(width * height);
        let DetectorBuffers { visited, queue } = buffers;

        for y in 0..height {
            for x in 0..width {
                let index = y * width + x;
                if visited[index] != 0 || brightness_at(pixels, index * CHANNELS) <= threshold {
                    continue;
                }

                // --- Flood fill from this seed ---
                let mut head = 0usize;
                let mut tail = 0usize;
                let mut sum_x = 0u64;
                let mut sum_y = 0u64;
                let mut count = 0usize;

                queue[tail] = x as u32;
                queue[tail + 1] = y as u32;
                tail += 2;
                visited[index] = 1;

                while head < tail {
                    let cx = queue[head] as usize;
                    let cy = queue[head + 1] as usize;
                    head += 2;

                    sum_x += cx as u64;
                    sum_y += cy as u64;
                    count += 1;

                    // Right
                    if cx + 1 < width {
                        try_enqueue(cx + 1, cy, width, pixels, threshold, visited, queue, &mut tail);
                    }
                    // Left
                    if cx > 0 {
                        try_enqueue(cx - 1, cy, width, pixels, threshold, visited, queue, &mut tail);
                    }
                    // Down
                    if cy + 1 < height {
                        try_enqueue(cx, cy + 1, width, pixels, threshold, visited, queue, &mut tail);
                    }
                    // Up
                    if cy > 0 {
                        try_enqueue(cx, cy - 1, width, pixels, threshold, visited, queue, &mut tail);
                    }
                }

                if count > MIN_COMPONENT_PIXELS {
                    blobs.push(Blob {
                        x: sum_x as f64 / count as f64 / SCALE,
                        y: sum_y as f64 / count as f64 / SCALE,
                        id: 0,
                        size: count,
                    });
                }
            }
        }
    }

    /// Marks and enqueues an in-bounds neighbor if it is unvisited and bright.
    #[inline(always)]
    #[allow(clippy::too_many_arguments)]
    fn try_enqueue(
        nx: usize,
        ny: usize,
        width: usize,
        pixels: &[u8],
        threshold: f64,
        visited: &mut [u8],
        queue: &mut [u32],
        tail: &mut usize,
    ) {
        let index = ny * width + nx;
        if visited[index] == 0 && brightness_at(pixels, index * CHANNELS) > threshold {
            visited[index] = 1;
            queue[*tail] = nx as u32;
            queue[*tail + 1] = ny as u32;
            *tail += 2;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::blob_detector::find_blobs;
    use super::*;

    /// Builds an RGBA grid from a brightness mask.
    fn grid_from_rows(rows: &[&str]) -> (u32, u32, Vec<u8>) {
        let height = rows.len() as u32;
        let width = rows[0].len() as u32;
        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        for row in rows {
            for c in row.chars() {
                let v = if c == '#' { 255 } else { 0 };
                pixels.extend_from_slice(&[v, v, v, 255]);
            }
        }
        (width, height, pixels)
    }

    fn detect(rows: &[&str], threshold: f64) -> Vec<Blob> {
        let (width, height, pixels) = grid_from_rows(rows);
        let mut buffers = DetectorBuffers::new();
        let mut blobs = Vec::new();
        find_blobs(
            SampledGrid { width, height, pixels: &pixels },
            threshold,
            &mut buffers,
            &mut blobs,
        );
        blobs
    }

    #[test]
    fn full_grid_is_one_blob_at_center() {
        let blobs = detect(&["####", "####", "####"], 100.0);
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].size, 12);
        assert!((blobs[0].x - 1.5 / SCALE).abs() < 1e-9);
        assert!((blobs[0].y - 1.0 / SCALE).abs() < 1e-9);
        assert_eq!(blobs[0].id, 0);
    }

    #[test]
    fn dark_grid_has_no_blobs() {
        assert!(detect(&["....", "....", "...."], 100.0).is_empty());
    }

    #[test]
    fn tiny_components_are_noise() {
        let blobs = detect(
            &[
                "#...##..",
                "........",
                "..#.....",
                "..#.....",
            ],
            100.0,
        );
        assert!(blobs.is_empty());
    }

    #[test]
    fn three_pixel_component_survives() {
        let blobs = detect(&["###.", "....", "...."], 100.0);
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].size, 3);
        assert!((blobs[0].x - 10.0).abs() < 1e-9);
        assert!((blobs[0].y - 0.0).abs() < 1e-9);
    }

    #[test]
    fn diagonal_pixels_are_not_connected() {
        let blobs = detect(&["#...", ".#..", "..#.", "...#"], 100.0);
        assert!(blobs.is_empty());
    }

    #[test]
    fn threshold_is_strict() {
        let (width, height, mut pixels) = grid_from_rows(&["###", "###"]);
        for px in pixels.chunks_mut(4) {
            px[0] = 120;
            px[1] = 120;
            px[2] = 120;
        }
        let mut buffers = DetectorBuffers::new();
        let mut blobs = Vec::new();
        let grid = SampledGrid { width, height, pixels: &pixels };

        find_blobs(grid, 120.0, &mut buffers, &mut blobs);
        assert!(blobs.is_empty());
        find_blobs(grid, 119.9, &mut buffers, &mut blobs);
        assert_eq!(blobs.len(), 1);
    }

    #[test]
    fn components_are_emitted_in_seed_scan_order() {
        let blobs = detect(
            &[
                "......###",
                "##.......",
                "##.......",
                ".........",
            ],
            100.0,
        );
        assert_eq!(blobs.len(), 2);
        assert_eq!(blobs[0].size, 3);
        assert_eq!(blobs[1].size, 4);
    }

    #[test]
    fn u_shape_is_a_single_component() {
        // Both arms are seeded from the top row but join at the bottom.
        let blobs = detect(&["#...#", "#...#", "#####"], 100.0);
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].size, 9);
    }

    #[test]
    fn buffers_are_reused_between_frames() {
        let (width, height, pixels) = grid_from_rows(&["###", "###", "###"]);
        let grid = SampledGrid { width, height, pixels: &pixels };
        let mut buffers = DetectorBuffers::new();
        let mut blobs = Vec::new();

        find_blobs(grid, 10.0, &mut buffers, &mut blobs);
        let first = blobs.clone();
        assert_eq!(buffers.pixel_capacity(), 9);

        find_blobs(grid, 10.0, &mut buffers, &mut blobs);
        assert_eq!(blobs, first);
    }

    #[test]
    fn centroid_stays_inside_source_frame() {
        let blobs = detect(&["....##", "....##", "##....", "##...."], 100.0);
        for blob in &blobs {
            assert!(blob.x >= 0.0 && blob.x <= 6.0 / SCALE);
            assert!(blob.y >= 0.0 && blob.y <= 4.0 / SCALE);
        }
    }
}
