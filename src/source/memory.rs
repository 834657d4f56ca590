use tracing::{debug, warn};

use crate::source::frame_source::{describe, size_matches};
use crate::source::{Frame, FrameSource};

/// Frames held in memory, played back in order. Optionally restarts from the first frame.
pub struct MemorySource {
    frames: Vec<Frame>,
    cursor: usize,
    looping: bool,
    descriptor: String,
    fps: i32,
    active: bool,
}

impl MemorySource {
    pub fn new(frames: Vec<Frame>) -> Self {
        MemorySource {
            frames,
            cursor: 0,
            looping: false,
            descriptor: String::new(),
            fps: 0,
            active: false,
        }
    }
    /// Restart from the first frame instead of running dry
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }
    /// Creates the source already opened with source defaults
    pub fn opened(mut self) -> Self {
        self.open("memory", -1, -1, -1);
        self
    }
    pub fn len(&self) -> usize {
        self.frames.len()
    }
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
    fn dimensions(&self) -> (u32, u32) {
        self.frames.first().map(|f| f.dimensions()).unwrap_or((0, 0))
    }
}

impl FrameSource for MemorySource {
    fn open(&mut self, descriptor: &str, width: i32, height: i32, fps: i32) -> bool {
        if self.active {
            self.close();
        }
        if self.frames.is_empty() {
            warn!(descriptor, "memory source has no frames");
            return false;
        }
        let (w, h) = self.dimensions();
        if !size_matches(width, w) || !size_matches(height, h) {
            warn!(descriptor, requested = ?(width, height), actual = ?(w, h), "frame size mismatch");
            return false;
        }
        self.descriptor = descriptor.to_string();
        self.fps = fps;
        self.cursor = 0;
        self.active = true;
        debug!(descriptor, frames = self.frames.len(), "memory source opened");
        true
    }
    fn capture(&mut self) -> Option<Frame> {
        if !self.active {
            return None;
        }
        if self.cursor >= self.frames.len() {
            if !self.looping {
                return None;
            }
            self.cursor = 0;
        }
        let frame = self.frames[self.cursor].clone();
        self.cursor += 1;
        Some(frame)
    }
    fn is_open(&self) -> bool {
        self.active
    }
    fn close(&mut self) {
        self.active = false;
        self.cursor = 0;
    }
    fn info(&self) -> String {
        let (w, h) = self.dimensions();
        describe("Memory", &self.descriptor, w, h, self.fps, self.active)
    }
}
