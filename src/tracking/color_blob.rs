use image::{GrayImage, Luma, RgbImage};
use imageproc::contours::{find_contours, Contour};
use imageproc::distance_transform::Norm;
use imageproc::geometry::convex_hull;
use imageproc::morphology::{close, open};
use imageproc::point::Point as PixelPoint;
use serde::{Deserialize, Serialize};

use crate::utils::{Point, Rect};

// Chessboard radius of the structuring element (5x5 square)
const MORPH_RADIUS: u8 = 2;
const CIRCLE_EPS: f64 = 1e-7;

/// Color in 8-bit HSV scale: H in [0, 180), S and V in [0, 255]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Hsv {
    pub h: f32,
    pub s: f32,
    pub v: f32,
}

impl Hsv {
    pub fn new(h: f32, s: f32, v: f32) -> Self {
        Hsv { h, s, v }
    }
    pub fn as_array(&self) -> [f32; 3] {
        [self.h, self.s, self.v]
    }
}

impl From<[f32; 3]> for Hsv {
    fn from(v: [f32; 3]) -> Self {
        Hsv::new(v[0], v[1], v[2])
    }
}

/// Convert RGB to HSV.
/// Hue is halved so it fits a byte (0-180), saturation and value are 0-255.
#[inline]
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> Hsv {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let s = if max <= 0.0 { 0.0 } else { 255.0 * delta / max };
    let mut h = if delta <= 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }
    let mut h = (h / 2.0).round();
    if h >= 180.0 {
        h -= 180.0;
    }
    Hsv::new(h, s.round(), max)
}

/// Reference color of a ball: per-channel mean and standard deviation in HSV.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorProfile {
    pub mean: Hsv,
    pub stddev: Hsv,
}

impl ColorProfile {
    pub fn new(mean: [f32; 3], stddev: [f32; 3]) -> Self {
        ColorProfile {
            mean: Hsv::from(mean),
            stddev: Hsv::from(stddev),
        }
    }
    /// Calibrates a profile from a patch of a frame known to show the ball: per-channel HSV mean
    /// and population standard deviation. `None` when the rectangle does not overlap the frame.
    pub fn from_region(frame: &RgbImage, rect: Rect) -> Option<ColorProfile> {
        let (width, height) = frame.dimensions();
        let rect = rect.clipped_to(width, height);
        if rect.is_degenerate() {
            return None;
        }
        let mut sum = [0.0f64; 3];
        let mut sum_sq = [0.0f64; 3];
        for y in rect.y..rect.y + rect.height {
            for x in rect.x..rect.x + rect.width {
                let p = frame.get_pixel(x as u32, y as u32);
                for (c, value) in rgb_to_hsv(p[0], p[1], p[2]).as_array().iter().enumerate() {
                    sum[c] += *value as f64;
                    sum_sq[c] += (*value as f64).powi(2);
                }
            }
        }
        let n = rect.area() as f64;
        let mut mean = [0.0f32; 3];
        let mut stddev = [0.0f32; 3];
        for c in 0..3 {
            let m = sum[c] / n;
            mean[c] = m as f32;
            stddev[c] = (sum_sq[c] / n - m * m).max(0.0).sqrt() as f32;
        }
        Some(ColorProfile::new(mean, stddev))
    }
    /// Checks `mean - k*stddev <= value <= mean + k*stddev` on every channel
    pub fn accepts(&self, color: &Hsv, window: f32) -> bool {
        let mean = self.mean.as_array();
        let stddev = self.stddev.as_array();
        color
            .as_array()
            .iter()
            .zip(mean.iter().zip(stddev.iter()))
            .all(|(value, (m, s))| *value >= m - window * s && *value <= m + window * s)
    }
}

/// Result of a successful blob search. Coordinates are local to the searched image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlobDetection {
    pub center: Point,
    pub radius: f32,
    pub mean_color: Hsv,
}

/// Finds the largest blob of the profile's color in `image` and fits a circle around it.
///
/// The color window is `window` standard deviations wide on each side of the mean.
/// Returns `None` when the cleaned mask has no external contour.
pub fn detect_blob(image: &RgbImage, profile: &ColorProfile, window: f32) -> Option<BlobDetection> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return None;
    }
    let hsv_pixels: Vec<Hsv> = image
        .pixels()
        .map(|p| rgb_to_hsv(p[0], p[1], p[2]))
        .collect();

    let mut mask = GrayImage::new(width, height);
    for (idx, color) in hsv_pixels.iter().enumerate() {
        if profile.accepts(color, window) {
            let x = idx as u32 % width;
            let y = idx as u32 / width;
            mask.put_pixel(x, y, Luma([255u8]));
        }
    }
    // Remove speckles first, then fill small holes
    let mask = open(&mask, Norm::LInf, MORPH_RADIUS);
    let mask = close(&mask, Norm::LInf, MORPH_RADIUS);

    let contours: Vec<Contour<i32>> = find_contours(&mask);
    let mut best: Option<(&Contour<i32>, f64)> = None;
    for contour in contours.iter().filter(|c| c.parent.is_none()) {
        let area = polygon_area(&contour.points);
        match best {
            Some((_, best_area)) if area <= best_area => {}
            _ => best = Some((contour, area)),
        }
    }
    let (contour, _) = best?;
    let (center, radius) = min_enclosing_circle(&contour.points)?;

    Some(BlobDetection {
        center,
        radius,
        mean_color: masked_mean(&hsv_pixels, &mask),
    })
}

/// Shoelace area of a closed contour
fn polygon_area(points: &[PixelPoint<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    (twice as f64).abs() / 2.0
}

fn masked_mean(hsv_pixels: &[Hsv], mask: &GrayImage) -> Hsv {
    let mut sum = [0.0f64; 3];
    let mut count = 0usize;
    for (color, m) in hsv_pixels.iter().zip(mask.pixels()) {
        if m[0] == 0 {
            continue;
        }
        sum[0] += color.h as f64;
        sum[1] += color.s as f64;
        sum[2] += color.v as f64;
        count += 1;
    }
    if count == 0 {
        return Hsv::default();
    }
    let n = count as f64;
    Hsv::new((sum[0] / n) as f32, (sum[1] / n) as f32, (sum[2] / n) as f32)
}

#[derive(Debug, Clone, Copy)]
struct Circle {
    cx: f64,
    cy: f64,
    r: f64,
}

impl Circle {
    fn contains(&self, p: (f64, f64)) -> bool {
        let dx = p.0 - self.cx;
        let dy = p.1 - self.cy;
        (dx * dx + dy * dy).sqrt() <= self.r + CIRCLE_EPS * (1.0 + self.r)
    }
    fn from_two(a: (f64, f64), b: (f64, f64)) -> Circle {
        let cx = (a.0 + b.0) / 2.0;
        let cy = (a.1 + b.1) / 2.0;
        let r = ((a.0 - cx).powi(2) + (a.1 - cy).powi(2)).sqrt();
        Circle { cx, cy, r }
    }
    fn from_three(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> Circle {
        let d = 2.0 * (a.0 * (b.1 - c.1) + b.0 * (c.1 - a.1) + c.0 * (a.1 - b.1));
        if d.abs() < CIRCLE_EPS {
            // Collinear: the circle over the farthest pair covers all three
            let candidates = [Circle::from_two(a, b), Circle::from_two(a, c), Circle::from_two(b, c)];
            let mut widest = candidates[0];
            for candidate in candidates {
                if candidate.r > widest.r {
                    widest = candidate;
                }
            }
            return widest;
        }
        let a2 = a.0 * a.0 + a.1 * a.1;
        let b2 = b.0 * b.0 + b.1 * b.1;
        let c2 = c.0 * c.0 + c.1 * c.1;
        let cx = (a2 * (b.1 - c.1) + b2 * (c.1 - a.1) + c2 * (a.1 - b.1)) / d;
        let cy = (a2 * (c.0 - b.0) + b2 * (a.0 - c.0) + c2 * (b.0 - a.0)) / d;
        let r = ((a.0 - cx).powi(2) + (a.1 - cy).powi(2)).sqrt();
        Circle { cx, cy, r }
    }
}

/// Smallest circle enclosing all points (incremental Welzl over the convex hull).
fn min_enclosing_circle(points: &[PixelPoint<i32>]) -> Option<(Point, f32)> {
    if points.is_empty() {
        return None;
    }
    let hull = if points.len() > 3 {
        convex_hull(points)
    } else {
        points.to_vec()
    };
    let pts: Vec<(f64, f64)> = hull.iter().map(|p| (p.x as f64, p.y as f64)).collect();

    let mut circle = Circle {
        cx: pts[0].0,
        cy: pts[0].1,
        r: 0.0,
    };
    for i in 1..pts.len() {
        if circle.contains(pts[i]) {
            continue;
        }
        circle = Circle {
            cx: pts[i].0,
            cy: pts[i].1,
            r: 0.0,
        };
        for j in 0..i {
            if circle.contains(pts[j]) {
                continue;
            }
            circle = Circle::from_two(pts[i], pts[j]);
            for k in 0..j {
                if !circle.contains(pts[k]) {
                    circle = Circle::from_three(pts[i], pts[j], pts[k]);
                }
            }
        }
    }
    Some((
        Point::new(circle.cx as f32, circle.cy as f32),
        circle.r as f32,
    ))
}
