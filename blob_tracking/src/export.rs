// THEORY:
// The recorder captures the rendered surface stream and packages it into a
// single downloadable file. It is a bus subscriber like any display: it never
// slows the frame loop down, and a recorder that falls behind simply loses the
// oldest packets (logged as lag).
//
// Encoding preference is a list. The first encoding the `image` build can
// write is used; falling back past the first choice is logged as a warning,
// and a list with nothing writable is `ExportUnavailable`.
//
// Capture runs at its own rate. On each capture tick the newest surface that
// has not been encoded yet is appended. Frames published between two ticks are
// coalesced to the newest one; ticks without a new frame append nothing.
//
// Palette quantization and JPEG coding are CPU-bound, so every encoder call
// runs on tokio's blocking pool. The async capture task only waits on it and
// never holds an async worker that the frame loop needs.
//
// Encoded data accumulates in memory as `Bytes` chunks. `stop` flushes the
// encoder, writes the file, and reports what was written.

use crate::error::{EffectError, Result};
use crate::frame_loop::{FramePacket, SurfaceBus, tick_period};
use bytes::{Bytes, BytesMut};
use image::buffer::ConvertBuffer;
use image::codecs::gif::{GifEncoder, Repeat};
use image::codecs::jpeg::JpegEncoder;
use image::{Delay, Frame, ImageFormat, RgbImage, RgbaImage};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub const DEFAULT_CAPTURE_FPS: u32 = 60;
pub const DEFAULT_JPEG_QUALITY: u8 = 85;
/// NeuQuant sampling factor for GIF palettes: 1 is best, 30 is fastest.
const GIF_QUANTIZER_SPEED: i32 = 30;
const FILE_STEM: &str = "blob-tracking";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Animated GIF, loops forever.
    Gif,
    /// Concatenated baseline JPEG frames.
    MotionJpeg,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Gif => "gif",
            ExportFormat::MotionJpeg => "mjpeg",
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            ExportFormat::Gif => ImageFormat::Gif,
            ExportFormat::MotionJpeg => ImageFormat::Jpeg,
        }
    }

    /// Whether this build of `image` can encode the format.
    pub fn is_available(self) -> bool {
        self.image_format().writing_enabled()
    }
}

/// Picks the first available format from `preferred`.
pub fn resolve_format(preferred: &[ExportFormat]) -> Result<ExportFormat> {
    let chosen = preferred
        .iter()
        .copied()
        .find(|format| format.is_available())
        .ok_or(EffectError::ExportUnavailable)?;
    if let Some(first) = preferred.first() {
        if *first != chosen {
            warn!(wanted = ?first, using = ?chosen, "Preferred export format unavailable, falling back");
        }
    }
    Ok(chosen)
}

#[derive(Debug, Clone)]
pub struct RecorderOptions {
    pub output_dir: PathBuf,
    pub capture_fps: u32,
    pub preferred: Vec<ExportFormat>,
    pub jpeg_quality: u8,
}

impl Default for RecorderOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            capture_fps: DEFAULT_CAPTURE_FPS,
            preferred: vec![ExportFormat::Gif, ExportFormat::MotionJpeg],
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingSummary {
    pub path: PathBuf,
    pub format: ExportFormat,
    pub frames: u64,
    pub bytes: usize,
}

/// `Write` adapter that collects encoder output into a shared buffer.
#[derive(Clone, Default)]
struct ChunkSink {
    buffer: Arc<Mutex<BytesMut>>,
}

impl ChunkSink {
    fn take(&self) -> Result<Bytes> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| EffectError::Recorder("encoder buffer poisoned".to_string()))?;
        Ok(buffer.split().freeze())
    }
}

impl Write for ChunkSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| std::io::Error::other("encoder buffer poisoned"))?;
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

enum StreamEncoder {
    Gif {
        encoder: GifEncoder<ChunkSink>,
        sink: ChunkSink,
        delay: Delay,
    },
    MotionJpeg {
        quality: u8,
        chunks: Vec<Bytes>,
        rgb: RgbImage,
    },
}

impl StreamEncoder {
    fn new(format: ExportFormat, options: &RecorderOptions) -> Result<Self> {
        match format {
            ExportFormat::Gif => {
                let sink = ChunkSink::default();
                let mut encoder = GifEncoder::new_with_speed(sink.clone(), GIF_QUANTIZER_SPEED);
                encoder.set_repeat(Repeat::Infinite)?;
                Ok(StreamEncoder::Gif {
                    encoder,
                    sink,
                    delay: Delay::from_numer_denom_ms(1000, options.capture_fps),
                })
            }
            ExportFormat::MotionJpeg => Ok(StreamEncoder::MotionJpeg {
                quality: options.jpeg_quality.clamp(1, 100),
                chunks: Vec::new(),
                rgb: RgbImage::new(0, 0),
            }),
        }
    }

    fn push(&mut self, surface: &RgbaImage) -> Result<()> {
        match self {
            StreamEncoder::Gif { encoder, delay, .. } => {
                encoder.encode_frame(Frame::from_parts(surface.clone(), 0, 0, *delay))?;
            }
            StreamEncoder::MotionJpeg { quality, chunks, rgb } => {
                *rgb = surface.convert();
                let mut jpeg = Vec::new();
                JpegEncoder::new_with_quality(&mut jpeg, *quality).encode_image(&*rgb)?;
                chunks.push(Bytes::from(jpeg));
            }
        }
        Ok(())
    }

    async fn push_off_runtime(self, image: Arc<RgbaImage>) -> Result<Self> {
        off_runtime(move || {
            let mut encoder = self;
            encoder.push(&image)?;
            Ok(encoder)
        })
        .await
    }

    /// Writes any trailer and returns the complete stream.
    fn finish(self) -> Result<Bytes> {
        match self {
            StreamEncoder::Gif { encoder, sink, .. } => {
                drop(encoder);
                sink.take()
            }
            StreamEncoder::MotionJpeg { chunks, .. } => {
                let mut out = BytesMut::with_capacity(chunks.iter().map(Bytes::len).sum());
                for chunk in &chunks {
                    out.extend_from_slice(chunk);
                }
                Ok(out.freeze())
            }
        }
    }
}

/// Runs `work` on the blocking pool and waits for it.
async fn off_runtime<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}

struct CapturedStream {
    data: Bytes,
    frames: u64,
}

/// A running capture. Call `stop` to finish and write the file.
pub struct Recorder {
    format: ExportFormat,
    output_dir: PathBuf,
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<CapturedStream>>,
}

impl Recorder {
    /// Subscribes to `bus` and starts capturing immediately.
    pub fn start(bus: &SurfaceBus, options: RecorderOptions) -> Result<Self> {
        if options.capture_fps == 0 {
            return Err(EffectError::Recorder("capture rate must be positive".to_string()));
        }
        let format = resolve_format(&options.preferred)?;
        let encoder = StreamEncoder::new(format, &options)?;
        let rx = bus.subscribe();
        let (stop_tx, stop_rx) = oneshot::channel();
        let period = tick_period(f64::from(options.capture_fps));
        info!(format = ?format, fps = options.capture_fps, "Recording started");
        let task = tokio::spawn(capture(rx, stop_rx, encoder, period));
        Ok(Self {
            format,
            output_dir: options.output_dir,
            stop_tx: Some(stop_tx),
            task,
        })
    }

    pub fn format(&self) -> ExportFormat {
        self.format
    }

    /// Stops capturing and writes `blob-tracking-<unix millis>.<ext>` into the
    /// output directory. Zero captured frames is an error and writes nothing.
    pub async fn stop(mut self) -> Result<RecordingSummary> {
        if let Some(stop_tx) = self.stop_tx.take() {
            // The task may already have ended on a closed bus.
            let _ = stop_tx.send(());
        }
        let stream = (&mut self.task).await??;
        if stream.frames == 0 {
            return Err(EffectError::Recorder("no frames were captured".to_string()));
        }

        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let path = self
            .output_dir
            .join(format!("{FILE_STEM}-{millis}.{}", self.format.extension()));
        tokio::fs::create_dir_all(&self.output_dir).await?;
        tokio::fs::write(&path, &stream.data).await?;

        let summary = RecordingSummary {
            path,
            format: self.format,
            frames: stream.frames,
            bytes: stream.data.len(),
        };
        info!(path = %summary.path.display(), frames = summary.frames, bytes = summary.bytes, "Recording saved");
        Ok(summary)
    }
}

async fn capture(
    mut rx: tokio::sync::broadcast::Receiver<FramePacket>,
    mut stop_rx: oneshot::Receiver<()>,
    mut encoder: StreamEncoder,
    period: Duration,
) -> Result<CapturedStream> {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut pending: Option<FramePacket> = None;
    let mut frames = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            received = rx.recv() => match received {
                Ok(packet) => pending = Some(packet),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Recorder lagged behind the frame stream");
                }
                Err(RecvError::Closed) => {
                    debug!("Surface bus closed");
                    break;
                }
            },
            _ = ticker.tick() => {
                if let Some(packet) = pending.take() {
                    encoder = encoder.push_off_runtime(packet.image).await?;
                    frames += 1;
                }
            }
        }
    }

    // Packets published before the stop signal still count.
    loop {
        match rx.try_recv() {
            Ok(packet) => pending = Some(packet),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    if let Some(packet) = pending.take() {
        encoder = encoder.push_off_runtime(packet.image).await?;
        frames += 1;
    }
    let data = off_runtime(move || encoder.finish()).await?;
    Ok(CapturedStream { data, frames })
}
