use image::RgbImage;

/// Frames are 8-bit RGB images
pub type Frame = RgbImage;

/// Value for `width`, `height` or `fps` meaning "whatever the source provides"
pub const SOURCE_DEFAULT: i32 = -1;

/// Producer of frames. One implementation per acquisition backend;
/// the tracking code only talks to this trait.
pub trait FrameSource: Send {
    /// Opens the source. Reopens if already open.
    /// Fails when a positive `width`/`height` does not match what the source delivers.
    fn open(&mut self, descriptor: &str, width: i32, height: i32, fps: i32) -> bool;
    /// Next frame, or `None` on exhaustion or a transient failure
    fn capture(&mut self) -> Option<Frame>;
    fn is_open(&self) -> bool;
    fn close(&mut self);
    /// Human-readable description of the source and its state
    fn info(&self) -> String;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn open(&mut self, descriptor: &str, width: i32, height: i32, fps: i32) -> bool {
        (**self).open(descriptor, width, height, fps)
    }
    fn capture(&mut self) -> Option<Frame> {
        (**self).capture()
    }
    fn is_open(&self) -> bool {
        (**self).is_open()
    }
    fn close(&mut self) {
        (**self).close()
    }
    fn info(&self) -> String {
        (**self).info()
    }
}

/// Whether a source delivering `actual` satisfies the `requested` size (non-positive means any)
pub(crate) fn size_matches(requested: i32, actual: u32) -> bool {
    requested <= 0 || requested as u32 == actual
}

pub(crate) fn describe(kind: &str, descriptor: &str, width: u32, height: u32, fps: i32, open: bool) -> String {
    format!(
        "Frame source info:\n  Source Type: {}\n  Source: {}\n  Resolution: {}x{}\n  FPS: {}\n  Status: {}",
        kind,
        descriptor,
        width,
        height,
        fps,
        if open { "Open" } else { "Closed" }
    )
}
