use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::source::frame_source::{describe, size_matches};
use crate::source::{Frame, FrameSource};
use crate::tracking::TrackingError;

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tif"];

/// File playback: still images in a directory, played in file-name order.
/// The descriptor passed to `open` is the directory path.
#[derive(Default)]
pub struct ImageSequenceSource {
    files: Vec<PathBuf>,
    cursor: usize,
    descriptor: String,
    width: u32,
    height: u32,
    fps: i32,
    active: bool,
}

impl ImageSequenceSource {
    pub fn new() -> Self {
        ImageSequenceSource::default()
    }
    /// Number of frames in the opened sequence
    pub fn len(&self) -> usize {
        self.files.len()
    }
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
    fn list_images(dir: &Path) -> Result<Vec<PathBuf>, TrackingError> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map_or(false, |ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            })
            .collect();
        files.sort();
        Ok(files)
    }
    fn load(path: &Path) -> Result<Frame, TrackingError> {
        Ok(image::open(path)?.to_rgb8())
    }
}

impl FrameSource for ImageSequenceSource {
    fn open(&mut self, descriptor: &str, width: i32, height: i32, fps: i32) -> bool {
        if self.active {
            self.close();
        }
        let files = match ImageSequenceSource::list_images(Path::new(descriptor)) {
            Ok(files) if !files.is_empty() => files,
            Ok(_) => {
                warn!(descriptor, "no images found");
                return false;
            }
            Err(err) => {
                warn!(descriptor, error = %err, "cannot list image directory");
                return false;
            }
        };
        let (w, h) = match ImageSequenceSource::load(&files[0]) {
            Ok(first) => first.dimensions(),
            Err(err) => {
                warn!(descriptor, error = %err, "cannot decode first image");
                return false;
            }
        };
        if !size_matches(width, w) || !size_matches(height, h) {
            warn!(descriptor, requested = ?(width, height), actual = ?(w, h), "frame size mismatch");
            return false;
        }
        debug!(descriptor, frames = files.len(), width = w, height = h, "image sequence opened");
        self.files = files;
        self.cursor = 0;
        self.descriptor = descriptor.to_string();
        self.width = w;
        self.height = h;
        self.fps = fps;
        self.active = true;
        true
    }
    /// Undecodable files are skipped; `None` means the sequence is exhausted
    fn capture(&mut self) -> Option<Frame> {
        if !self.active {
            return None;
        }
        while self.cursor < self.files.len() {
            let path = &self.files[self.cursor];
            self.cursor += 1;
            match ImageSequenceSource::load(path) {
                Ok(frame) => return Some(frame),
                Err(err) => warn!(path = %path.display(), error = %err, "cannot decode frame, skipping"),
            }
        }
        None
    }
    fn is_open(&self) -> bool {
        self.active
    }
    fn close(&mut self) {
        self.active = false;
        self.files.clear();
        self.cursor = 0;
        self.width = 0;
        self.height = 0;
        self.fps = 0;
        self.descriptor.clear();
    }
    fn info(&self) -> String {
        describe("Image sequence", &self.descriptor, self.width, self.height, self.fps, self.active)
    }
}
