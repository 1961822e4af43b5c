// THEORY:
// Built-in frame sources. The loop pulls from them once per tick through the
// `FrameSource` trait, so anything that can hand out an `RgbaImage` can drive
// the effect: a decoded video, a camera, or a folder of stills.
//
// - `MemorySource` replays frames already in memory. Tests and demos use it.
// - `DirectorySource` decodes the image files of a directory in name order,
//   one per tick. A file that fails to decode is logged and skipped; it costs
//   the loop one idle tick and never stops playback.

use crate::error::{EffectError, Result};
use crate::frame_loop::{FrameSource, SourcePoll};
use image::RgbaImage;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct MemorySource {
    frames: Vec<RgbaImage>,
    next: usize,
    idle_ticks: usize,
    looping: bool,
}

impl MemorySource {
    pub fn new(frames: Vec<RgbaImage>) -> Self {
        Self {
            frames,
            next: 0,
            idle_ticks: 0,
            looping: false,
        }
    }

    /// Reports `Idle` for the first `ticks` polls, like a stream still buffering.
    pub fn with_idle_ticks(mut self, ticks: usize) -> Self {
        self.idle_ticks = ticks;
        self
    }

    /// Restarts from the first frame instead of closing.
    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }
}

impl FrameSource for MemorySource {
    fn poll_frame(&mut self) -> SourcePoll<'_> {
        if self.idle_ticks > 0 {
            self.idle_ticks -= 1;
            return SourcePoll::Idle;
        }
        if self.next >= self.frames.len() {
            if !self.looping || self.frames.is_empty() {
                return SourcePoll::Closed;
            }
            self.next = 0;
        }
        let index = self.next;
        self.next += 1;
        SourcePoll::Frame(&self.frames[index])
    }
}

/// Plays the image files of a directory, sorted by file name.
#[derive(Debug)]
pub struct DirectorySource {
    paths: Vec<PathBuf>,
    next: usize,
    looping: bool,
    current: RgbaImage,
}

impl DirectorySource {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && image::ImageFormat::from_path(&path).is_ok() {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            return Err(EffectError::Source(format!(
                "no image files in {}",
                dir.display()
            )));
        }
        paths.sort();
        debug!(frames = paths.len(), dir = %dir.display(), "Opened frame directory");
        Ok(Self {
            paths,
            next: 0,
            looping: false,
            current: RgbaImage::new(0, 0),
        })
    }

    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl FrameSource for DirectorySource {
    fn poll_frame(&mut self) -> SourcePoll<'_> {
        if self.next >= self.paths.len() {
            if !self.looping {
                return SourcePoll::Closed;
            }
            self.next = 0;
        }
        let path = &self.paths[self.next];
        self.next += 1;
        match image::open(path) {
            Ok(decoded) => {
                self.current = decoded.to_rgba8();
                SourcePoll::Frame(&self.current)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping undecodable frame");
                SourcePoll::Idle
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn poll_kind(poll: SourcePoll<'_>) -> &'static str {
        match poll {
            SourcePoll::Frame(_) => "frame",
            SourcePoll::Idle => "idle",
            SourcePoll::Closed => "closed",
        }
    }

    #[test]
    fn memory_source_idles_then_plays_then_closes() {
        let mut source = MemorySource::new(vec![RgbaImage::new(4, 4)]).with_idle_ticks(1);
        assert_eq!(poll_kind(source.poll_frame()), "idle");
        assert_eq!(poll_kind(source.poll_frame()), "frame");
        assert_eq!(poll_kind(source.poll_frame()), "closed");
    }

    #[test]
    fn memory_source_loops() {
        let mut source = MemorySource::new(vec![RgbaImage::new(1, 1), RgbaImage::new(2, 2)]).looping();
        let widths: Vec<u32> = (0..5)
            .map(|_| match source.poll_frame() {
                SourcePoll::Frame(f) => f.width(),
                _ => 0,
            })
            .collect();
        assert_eq!(widths, vec![1, 2, 1, 2, 1]);
    }

    #[test]
    fn empty_looping_source_still_closes() {
        let mut source = MemorySource::new(Vec::new()).looping();
        assert_eq!(poll_kind(source.poll_frame()), "closed");
    }

    #[test]
    fn directory_source_sorts_and_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        RgbaImage::from_pixel(3, 2, Rgba([1, 2, 3, 255]))
            .save(dir.path().join("b.png"))
            .unwrap();
        RgbaImage::from_pixel(5, 4, Rgba([9, 9, 9, 255]))
            .save(dir.path().join("a.png"))
            .unwrap();
        std::fs::write(dir.path().join("c.png"), b"not a png").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let mut source = DirectorySource::open(dir.path()).unwrap();
        assert_eq!(source.paths().len(), 3);
        match source.poll_frame() {
            SourcePoll::Frame(f) => assert_eq!(f.dimensions(), (5, 4)),
            _ => panic!("expected a.png"),
        }
        match source.poll_frame() {
            SourcePoll::Frame(f) => assert_eq!(f.get_pixel(0, 0).0, [1, 2, 3, 255]),
            _ => panic!("expected b.png"),
        }
        assert_eq!(poll_kind(source.poll_frame()), "idle");
        assert_eq!(poll_kind(source.poll_frame()), "closed");
    }

    #[test]
    fn directory_without_images_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(DirectorySource::open(dir.path()), Err(EffectError::Source(_))));
        assert!(matches!(
            DirectorySource::open(dir.path().join("missing")),
            Err(EffectError::Io(_))
        ));
    }
}
