// OpenCV video input and MP4 output. Only built with the `opencv` feature.

use anyhow::bail;
use blob_tracking::{FramePacket, FrameSource, SourcePoll, SurfaceBus};
use image::RgbaImage;
use opencv::{
    core::{self, Mat, Scalar},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoWriter},
};
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct VideoFileSource {
    cap: VideoCapture,
    bgr: Mat,
    rgba: Mat,
    frame: RgbaImage,
    repeat: bool,
}

impl VideoFileSource {
    pub fn open(path: &Path, repeat: bool) -> anyhow::Result<Self> {
        let cap = VideoCapture::from_file(&path.to_string_lossy(), videoio::CAP_ANY)?;
        if !cap.is_opened()? {
            bail!("could not open video {}", path.display());
        }
        let fps = cap.get(videoio::CAP_PROP_FPS)?;
        info!(path = %path.display(), fps, "Opened video");
        Ok(Self {
            cap,
            bgr: Mat::default(),
            rgba: Mat::default(),
            frame: RgbaImage::new(0, 0),
            repeat,
        })
    }

    fn read_next(&mut self) -> opencv::Result<bool> {
        if self.cap.read(&mut self.bgr)? && !self.bgr.empty() {
            return Ok(true);
        }
        if !self.repeat {
            return Ok(false);
        }
        self.cap.set(videoio::CAP_PROP_POS_FRAMES, 0.0)?;
        Ok(self.cap.read(&mut self.bgr)? && !self.bgr.empty())
    }

    fn convert(&mut self) -> opencv::Result<()> {
        // Convert the OpenCV Mat (BGR) to an RGBA buffer for the pipeline.
        imgproc::cvt_color(&self.bgr, &mut self.rgba, imgproc::COLOR_BGR2RGBA, 0)?;
        let width = self.rgba.cols() as u32;
        let height = self.rgba.rows() as u32;
        let bytes = self.rgba.data_bytes()?;
        if self.frame.dimensions() != (width, height) {
            self.frame = RgbaImage::new(width, height);
        }
        self.frame.copy_from_slice(bytes);
        Ok(())
    }
}

impl FrameSource for VideoFileSource {
    fn poll_frame(&mut self) -> SourcePoll<'_> {
        match self.read_next() {
            Ok(true) => {}
            Ok(false) => return SourcePoll::Closed,
            Err(e) => {
                warn!(error = %e, "Error reading frame");
                return SourcePoll::Closed;
            }
        }
        match self.convert() {
            Ok(()) => SourcePoll::Frame(&self.frame),
            Err(e) => {
                warn!(error = %e, "Skipping frame that failed color conversion");
                SourcePoll::Idle
            }
        }
    }
}

/// Opens an MP4 writer, preferring H.264 (`avc1`) and falling back to `mp4v`.
fn open_writer(path: &Path, fps: f64, width: i32, height: i32) -> anyhow::Result<VideoWriter> {
    let size = core::Size::new(width, height);
    let name = path.to_string_lossy();
    for (codec, fourcc) in [("avc1", ['a', 'v', 'c', '1']), ("mp4v", ['m', 'p', '4', 'v'])] {
        let code = VideoWriter::fourcc(fourcc[0], fourcc[1], fourcc[2], fourcc[3])?;
        let writer = VideoWriter::new(&name, code, fps, size, true)?;
        if writer.is_opened()? {
            info!(codec, path = %path.display(), "MP4 writer opened");
            return Ok(writer);
        }
        warn!(codec, "MP4 codec unavailable, trying next");
    }
    bail!("no MP4 codec available for {}", path.display())
}

fn write_packet(writer: &mut VideoWriter, packet: &FramePacket, rgba: &mut Mat, bgr: &mut Mat) -> anyhow::Result<()> {
    let rows = packet.height as i32;
    let cols = packet.width as i32;
    if rgba.rows() != rows || rgba.cols() != cols {
        *rgba = Mat::new_rows_cols_with_default(rows, cols, core::CV_8UC4, Scalar::all(0.0))?;
    }
    rgba.data_bytes_mut()?.copy_from_slice(packet.image.as_raw());
    imgproc::cvt_color(rgba, bgr, imgproc::COLOR_RGBA2BGR, 0)?;
    writer.write(bgr)?;
    Ok(())
}

/// Writes every published surface to `path` until the bus closes. Returns the
/// number of frames written.
pub fn spawn_mp4_writer(bus: &SurfaceBus, path: PathBuf, fps: f64) -> JoinHandle<anyhow::Result<u64>> {
    let mut rx = bus.subscribe();
    tokio::task::spawn_blocking(move || {
        let mut writer: Option<VideoWriter> = None;
        let mut rgba = Mat::default();
        let mut bgr = Mat::default();
        let mut written = 0u64;
        loop {
            let packet = match rx.blocking_recv() {
                Ok(packet) => packet,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "MP4 writer lagged behind the frame stream");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if writer.is_none() {
                writer = Some(open_writer(&path, fps, packet.width as i32, packet.height as i32)?);
            }
            if let Some(writer) = writer.as_mut() {
                write_packet(writer, &packet, &mut rgba, &mut bgr)?;
                written += 1;
            }
        }
        if let Some(mut writer) = writer {
            writer.release()?;
        }
        Ok(written)
    })
}
