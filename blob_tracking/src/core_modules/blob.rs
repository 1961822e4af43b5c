// THEORY:
// A `Blob` is one bright, 4-connected region of the downsampled grid, reduced
// to the two things the renderer needs: where it is and how big it is.
//
// Key architectural principles:
// 1.  **Frame-Scoped**: a blob exists for exactly one frame. The detector
//     creates it, the selector gives it an id, the renderer draws it, and then
//     it is gone. There is no memory of previous frames and no identity across
//     frames: id 0 is "the biggest blob this frame", nothing more.
// 2.  **Full-Resolution Coordinates**: the centroid is found on the small grid
//     but stored already mapped back to the source frame, so nothing after the
//     detector needs to know the grid scale.
// 3.  **Stateless Data Container**: a `Blob` is "dumb" data with no behavior.

/// A detected bright region for the current frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blob {
    /// Centroid x in full-resolution frame pixels.
    pub x: f64,
    /// Centroid y in full-resolution frame pixels.
    pub y: f64,
    /// Rank of this blob within the current frame, `0..selected_count`.
    /// Placeholder `0` until the selector runs.
    pub id: usize,
    /// Number of downsampled pixels in the component.
    pub size: usize,
}
