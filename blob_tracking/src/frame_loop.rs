// THEORY:
// The frame loop is the engine's scheduler. It runs one cooperative iteration
// per display refresh on a tokio task:
//
//   tick -> snapshot config -> poll source -> process frame -> publish surface
//
// Invariants:
// - At most one frame is in flight. The loop owns the pipeline and the source
//   outright, so no two iterations can ever touch the reusable buffers at once.
// - A source that is not ready yet (`Idle`) skips the tick without touching the
//   pipeline. A closed source ends the loop.
// - Missed ticks are skipped rather than bursted: a slow frame never causes a
//   backlog of catch-up iterations.
// - Cancellation is observed before the next tick. Once `cancel` returns, no
//   further frame is processed after the one currently running.
// - The config snapshot is taken once per iteration. Edits made mid-frame land
//   on the next frame.
//
// Consumers (a display window, the recorder) subscribe to the `SurfaceBus`.
// The loop only copies the surface when at least one subscriber exists.

use crate::config::EffectConfig;
use crate::error::Result;
use crate::pipeline::{BlobPipeline, FrameSummary};
use image::RgbaImage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub const DEFAULT_REFRESH_HZ: f64 = 60.0;
pub const DEFAULT_BUS_CAPACITY: usize = 4;
/// Bounds for the interval period. Tokio rejects a zero period.
pub const MIN_TICK_PERIOD: Duration = Duration::from_nanos(1);
pub const MAX_TICK_PERIOD: Duration = Duration::from_secs(3600);

/// Interval period for a positive rate, clamped to the tick bounds.
pub(crate) fn tick_period(rate_hz: f64) -> Duration {
    Duration::try_from_secs_f64(1.0 / rate_hz)
        .unwrap_or(MAX_TICK_PERIOD)
        .clamp(MIN_TICK_PERIOD, MAX_TICK_PERIOD)
}

/// What a source has for the current tick.
pub enum SourcePoll<'a> {
    Frame(&'a RgbaImage),
    /// No frame this tick (not ready, or a decode hiccup). Try again next tick.
    Idle,
    /// The source is exhausted or has failed for good.
    Closed,
}

/// A pull-based video frame provider, polled once per tick.
pub trait FrameSource: Send + 'static {
    fn poll_frame(&mut self) -> SourcePoll<'_>;
}

impl FrameSource for Box<dyn FrameSource> {
    fn poll_frame(&mut self) -> SourcePoll<'_> {
        (**self).poll_frame()
    }
}

/// One rendered surface, shared with every subscriber.
#[derive(Debug, Clone)]
pub struct FramePacket {
    pub frame_index: u64,
    pub width: u32,
    pub height: u32,
    pub image: Arc<RgbaImage>,
}

#[derive(Clone)]
pub struct SurfaceBus {
    pub frames_tx: broadcast::Sender<FramePacket>,
}

impl SurfaceBus {
    pub fn new(capacity: usize) -> Self {
        let (frames_tx, _) = broadcast::channel::<FramePacket>(capacity.max(1));
        Self { frames_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FramePacket> {
        self.frames_tx.subscribe()
    }

    pub fn has_subscribers(&self) -> bool {
        self.frames_tx.receiver_count() > 0
    }

    /// Copies `surface` out to subscribers. Returns `false` when nobody listens.
    pub fn publish(&self, frame_index: u64, surface: &RgbaImage) -> bool {
        if !self.has_subscribers() {
            return false;
        }
        let packet = FramePacket {
            frame_index,
            width: surface.width(),
            height: surface.height(),
            image: Arc::new(surface.clone()),
        };
        self.frames_tx.send(packet).is_ok()
    }
}

impl Default for SurfaceBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames_processed: u64,
    pub idle_ticks: u64,
    pub last_frame: Option<FrameSummary>,
}

/// Everything the loop owned, handed back once it stops.
pub struct LoopOutcome<S> {
    pub stats: LoopStats,
    pub pipeline: BlobPipeline,
    pub source: S,
}

/// Builder for a frame loop task.
pub struct FrameLoop<S> {
    pipeline: BlobPipeline,
    source: S,
    config: watch::Receiver<EffectConfig>,
    bus: Option<SurfaceBus>,
    refresh_hz: f64,
}

impl<S: FrameSource> FrameLoop<S> {
    pub fn new(pipeline: BlobPipeline, source: S, config: watch::Receiver<EffectConfig>) -> Self {
        Self {
            pipeline,
            source,
            config,
            bus: None,
            refresh_hz: DEFAULT_REFRESH_HZ,
        }
    }

    pub fn with_bus(mut self, bus: SurfaceBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Non-finite or non-positive rates fall back to the default. Extreme
    /// rates are clamped to the tick bounds.
    pub fn with_refresh_hz(mut self, refresh_hz: f64) -> Self {
        self.refresh_hz = if refresh_hz.is_finite() && refresh_hz > 0.0 {
            refresh_hz
        } else {
            warn!(refresh_hz, "Invalid refresh rate, using {DEFAULT_REFRESH_HZ} Hz");
            DEFAULT_REFRESH_HZ
        };
        self
    }

    /// Starts the loop on the current tokio runtime.
    pub fn spawn(self) -> LoopHandle<S> {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let join = tokio::spawn(self.run(cancel_rx));
        LoopHandle { cancel_tx, join }
    }

    async fn run(self, mut cancel_rx: watch::Receiver<bool>) -> LoopOutcome<S> {
        let FrameLoop {
            mut pipeline,
            mut source,
            mut config,
            bus,
            refresh_hz,
        } = self;

        let mut stats = LoopStats::default();
        let mut ticker = tokio::time::interval(tick_period(refresh_hz));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(refresh_hz, "Frame loop started");

        loop {
            if *cancel_rx.borrow_and_update() {
                break;
            }
            tokio::select! {
                biased;
                changed = cancel_rx.changed() => {
                    // A dropped handle counts as cancellation.
                    if changed.is_err() || *cancel_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let snapshot = config.borrow_and_update().clone();
                    match source.poll_frame() {
                        SourcePoll::Frame(frame) => {
                            let summary = pipeline.process_frame(frame, &snapshot);
                            stats.frames_processed += 1;
                            stats.last_frame = Some(summary);
                            if let Some(bus) = &bus {
                                bus.publish(summary.frame_index, pipeline.surface());
                            }
                        }
                        SourcePoll::Idle => {
                            stats.idle_ticks += 1;
                        }
                        SourcePoll::Closed => {
                            debug!("Frame source closed");
                            break;
                        }
                    }
                }
            }
        }

        info!(
            frames = stats.frames_processed,
            idle_ticks = stats.idle_ticks,
            "Frame loop stopped"
        );
        LoopOutcome {
            stats,
            pipeline,
            source,
        }
    }
}

/// Handle to a running loop. Dropping it stops the loop.
pub struct LoopHandle<S> {
    cancel_tx: watch::Sender<bool>,
    join: JoinHandle<LoopOutcome<S>>,
}

impl<S> LoopHandle<S> {
    /// Requests a stop. Idempotent.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    /// Resolves once the loop task has exited. Cancel-safe.
    pub async fn stopped(&self) {
        self.cancel_tx.closed().await;
    }

    /// Waits for the loop to end on its own (source closed) or after `cancel`.
    pub async fn join(self) -> Result<LoopOutcome<S>> {
        let LoopHandle { cancel_tx, join } = self;
        let outcome = join.await?;
        drop(cancel_tx);
        Ok(outcome)
    }

    /// `cancel` followed by `join`.
    pub async fn stop(self) -> Result<LoopOutcome<S>> {
        self.cancel();
        self.join().await
    }
}
