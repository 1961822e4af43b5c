// THEORY:
// The `BlobSelector` turns "every component above the noise floor" into "the
// few blobs worth drawing". It ranks by pixel count, keeps at most `max_blobs`,
// and hands out ids `0..n` in rank order.
//
// Ties between equally sized components keep the detector's emission order
// (the scan order of their seed pixels) because the sort is stable. The result
// is therefore a pure function of the grid and the threshold.
//
// Ids are per-frame ranks. They are not tracked identities: the blob with id 0
// in one frame and id 0 in the next may be different regions.

use crate::core_modules::blob::Blob;

pub mod blob_selector {
    use super::*;

    /// Sorts `blobs` by size descending, truncates to `max_blobs`, and assigns
    /// `id = rank`. Operates in place on the pipeline's scratch list.
    pub fn select_blobs(blobs: &mut Vec<Blob>, max_blobs: usize) {
        blobs.sort_by(|a, b| b.size.cmp(&a.size));
        blobs.truncate(max_blobs);
        for (rank, blob) in blobs.iter_mut().enumerate() {
            blob.id = rank;
        }
    }
}
