//! Synthetic frames for tests
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;

use crate::tracking::{ColorProfile, Hsv};

pub const YELLOW: Rgb<u8> = Rgb([255, 255, 0]);

pub const YELLOW_PROFILE: ColorProfile = ColorProfile {
    mean: Hsv {
        h: 30.0,
        s: 255.0,
        v: 255.0,
    },
    stddev: Hsv {
        h: 2.0,
        s: 10.0,
        v: 10.0,
    },
};

pub fn blank_frame(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([20, 20, 20]))
}

pub fn frame_with_ball(width: u32, height: u32, center: (i32, i32), radius: i32, color: Rgb<u8>) -> RgbImage {
    let mut frame = blank_frame(width, height);
    draw_filled_circle_mut(&mut frame, center, radius, color);
    frame
}

/// Ball moving along a straight line, one frame per step
pub fn moving_ball_frames(
    width: u32,
    height: u32,
    start: (i32, i32),
    step: (i32, i32),
    radius: i32,
    n: usize,
) -> Vec<RgbImage> {
    (0..n as i32)
        .map(|i| {
            frame_with_ball(
                width,
                height,
                (start.0 + step.0 * i, start.1 + step.1 * i),
                radius,
                YELLOW,
            )
        })
        .collect()
}
