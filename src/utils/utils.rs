use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in frame coordinates (pixels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }
    /// Rectangle covering the whole frame
    pub fn full_frame(frame_width: u32, frame_height: u32) -> Self {
        Rect::new(0, 0, frame_width as i32, frame_height as i32)
    }
    /// Rectangle of the given size centered on the point
    pub fn centered_at(center: &Point, width: i32, height: i32) -> Self {
        Rect::new(
            (center.x - width as f32 / 2.0).round() as i32,
            (center.y - height as f32 / 2.0).round() as i32,
            width,
            height,
        )
    }
    pub fn area(&self) -> i64 {
        if self.is_degenerate() {
            return 0;
        }
        self.width as i64 * self.height as i64
    }
    pub fn is_degenerate(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
    pub fn center(&self) -> Point {
        Point::new(
            self.x as f32 + self.width as f32 / 2.0,
            self.y as f32 + self.height as f32 / 2.0,
        )
    }
    /// True when the rectangle shares no pixel with a frame of the given size
    pub fn is_outside(&self, frame_width: u32, frame_height: u32) -> bool {
        let right = self.x as i64 + self.width as i64;
        let bottom = self.y as i64 + self.height as i64;
        right <= 0
            || bottom <= 0
            || self.x as i64 >= frame_width as i64
            || self.y as i64 >= frame_height as i64
    }
    /// Intersection with the frame bounds. Result may be degenerate.
    pub fn clipped_to(&self, frame_width: u32, frame_height: u32) -> Rect {
        let x0 = i64::max(self.x as i64, 0);
        let y0 = i64::max(self.y as i64, 0);
        let x1 = i64::min(self.x as i64 + self.width as i64, frame_width as i64);
        let y1 = i64::min(self.y as i64 + self.height as i64, frame_height as i64);
        Rect::new(x0 as i32, y0 as i32, (x1 - x0) as i32, (y1 - y0) as i32)
    }
    /// Same center, each dimension multiplied by `factor`
    pub fn scaled_around(&self, center: &Point, factor: i32) -> Rect {
        Rect::centered_at(
            center,
            self.width.saturating_mul(factor),
            self.height.saturating_mul(factor),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Point { x, y }
    }
}

pub fn euclidean_distance(p1: &Point, p2: &Point) -> f32 {
    let x_squared = f32::powi(p1.x - p2.x, 2);
    let y_squared = f32::powi(p1.y - p2.y, 2);
    f32::sqrt(x_squared + y_squared)
}
