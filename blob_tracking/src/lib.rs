// THEORY:
// This file is the main entry point for the `blob_tracking` library crate.
// It defines the public API exposed to front ends (like the `visual_tester`
// binary).
//
// The primary goal is to export `BlobPipeline` and the `FrameLoop` that drives
// it, together with the configuration, frame sources and recorder that plug
// into that loop. The per-frame building blocks live in `core_modules`; they
// are public for testing and embedding, but most callers only need the
// re-exports below.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod export;
pub mod frame_loop;
pub mod pipeline;
pub mod renderer;
pub mod sources;

pub use config::{ColorRgb, ConfigHandle, DashStyle, EffectConfig, FillMode, LabelType};
pub use core_modules::blob::Blob;
pub use error::{EffectError, Result};
pub use export::{ExportFormat, Recorder, RecorderOptions, RecordingSummary};
pub use frame_loop::{
    FrameLoop, FramePacket, FrameSource, LoopHandle, LoopOutcome, LoopStats, SourcePoll,
    SurfaceBus,
};
pub use pipeline::{BlobPipeline, FrameSummary};
pub use renderer::{RenderSummary, Renderer, load_font};
pub use sources::{DirectorySource, MemorySource};
