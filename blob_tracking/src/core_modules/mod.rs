// THEORY:
// `core_modules` holds the per-frame building blocks. None of them allocate on
// the hot path once their buffers are sized, and none of them know about
// threads, sources or recording.
//
// 1. `pixel`: RGBA access and the brightness rule.
// 2. `frame_sampler`: box-filter downsampling to the detection grid.
// 3. `blob` / `blob_detector`: connected bright regions on that grid.
// 4. `blob_selector`: ranking and id assignment.
// 5. `overlay` / `canvas`: the visual rules and the pixel operations behind them.

pub mod blob;
pub mod blob_detector;
pub mod blob_selector;
pub mod canvas;
pub mod frame_sampler;
pub mod overlay;
pub mod pixel;
