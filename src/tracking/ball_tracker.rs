use std::sync::Arc;

use image::{imageops, RgbImage};
use kalman_rust::kalman::Kalman2D;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::tracking::{detect_blob, ColorProfile, TrackingError, TrajectoryRecord};
use crate::utils::{Point, Rect};

// Detection window in standard deviations. Wider than the calibration window to survive lighting drift
const DETECTION_WINDOW: f32 = 2.0;
// ROI side after a hit, in detected radii
const ROI_RADIUS_FACTOR: f32 = 4.0;
// ROI growth per dimension after a miss
const ROI_GROWTH: i32 = 2;

/// Snapshot of one ball as reported to consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BallStatus {
    pub id: i32,
    pub color: String,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    /// Fraction of the reference trajectory covered, 0.0 without a reference
    pub progress: f32,
    pub detected: bool,
}

/// Single ball tracker: color blob detection inside an adaptive ROI
/// plus a constant-velocity Kalman filter (position and velocity, pixels per frame).
#[derive(Debug, Clone)]
pub struct BallTracker {
    profile: ColorProfile,
    init_pos: Point,
    // None until the first frame tells us the frame size
    roi: Option<Rect>,
    tracker: Kalman2D,
    dt: f32,
    status: BallStatus,
    reference: Option<Arc<TrajectoryRecord>>,
}

/* Kalman filter props */
// No control input: plain constant-velocity model
fn new_estimator(dt: f32, x: f32, y: f32) -> Kalman2D {
    let ux = 0.0;
    let uy = 0.0;
    let std_dev_a = 2.0;
    let std_dev_mx = 0.1;
    let std_dev_my = 0.1;
    Kalman2D::new_with_state(dt, ux, uy, std_dev_a, std_dev_mx, std_dev_my, x, y)
}

impl BallTracker {
    pub fn new(id: i32, color: &str, profile: ColorProfile, init_pos: Point) -> Self {
        BallTracker::new_with_dt(id, color, profile, init_pos, 1.0)
    }
    pub fn new_with_dt(id: i32, color: &str, profile: ColorProfile, init_pos: Point, dt: f32) -> Self {
        BallTracker {
            profile,
            init_pos,
            roi: None,
            tracker: new_estimator(dt, init_pos.x, init_pos.y),
            dt,
            status: BallStatus {
                id,
                color: color.to_string(),
                x: init_pos.x,
                y: init_pos.y,
                vx: 0.0,
                vy: 0.0,
                progress: 0.0,
                detected: false,
            },
            reference: None,
        }
    }
    pub fn get_id(&self) -> i32 {
        self.status.id
    }
    pub fn get_color(&self) -> &str {
        &self.status.color
    }
    pub fn get_profile(&self) -> &ColorProfile {
        &self.profile
    }
    pub fn get_init_pos(&self) -> Point {
        self.init_pos
    }
    /// Search rectangle for the next frame (not yet clipped)
    pub fn get_roi(&self) -> Option<Rect> {
        self.roi
    }
    pub fn get_status(&self) -> BallStatus {
        self.status.clone()
    }
    /// Reference run used to compute `progress`
    pub fn set_reference(&mut self, reference: Option<Arc<TrajectoryRecord>>) {
        self.reference = reference;
    }

    /// Processes one frame. Returns whether the ball was detected in it.
    /// On a miss the reported state is the filter's prediction.
    pub fn update(&mut self, frame: &RgbImage) -> Result<bool, TrackingError> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            self.status.detected = false;
            return Ok(false);
        }
        let full = Rect::full_frame(width, height);

        let mut roi = match self.roi {
            Some(roi) => roi,
            None => {
                let side = u32::min(width, height) as i32 / 2;
                Rect::centered_at(&self.init_pos, side, side)
            }
        };
        if roi.is_outside(width, height) {
            // Search area lost the frame completely: restart from the frame center
            let center = full.center();
            warn!(
                id = self.status.id,
                roi = ?roi,
                "ROI left the frame, resetting estimator to ({}, {})", center.x, center.y
            );
            roi = full;
            self.tracker = new_estimator(self.dt, center.x, center.y);
        }
        let mut roi = roi.clipped_to(width, height);
        if roi.is_degenerate() {
            roi = full;
        }
        self.roi = Some(roi);

        let patch = imageops::crop_imm(frame, roi.x as u32, roi.y as u32, roi.width as u32, roi.height as u32)
            .to_image();

        match detect_blob(&patch, &self.profile, DETECTION_WINDOW) {
            Some(blob) => {
                let measured = Point::new(blob.center.x + roi.x as f32, blob.center.y + roi.y as f32);
                // Advance to the current frame, then correct with the measurement
                self.tracker.predict();
                self.tracker.update(measured.x, measured.y)?;
                let (vx, vy) = self.estimated_velocity();

                // Report the detection itself; the filter only supplies velocity
                self.status.x = measured.x;
                self.status.y = measured.y;
                self.status.vx = vx;
                self.status.vy = vy;
                self.status.detected = true;
                self.refresh_progress();

                let side = (ROI_RADIUS_FACTOR * blob.radius).round() as i32;
                self.roi = Some(Rect::centered_at(&measured, side, side));
                debug!(id = self.status.id, x = measured.x, y = measured.y, radius = blob.radius, "ball detected");
                Ok(true)
            }
            None => {
                self.tracker.predict();
                let (x, y) = self.tracker.get_state();
                let (vx, vy) = self.estimated_velocity();
                let predicted = Point::new(x, y);

                self.status.x = x;
                self.status.y = y;
                self.status.vx = vx;
                self.status.vy = vy;
                self.status.detected = false;
                self.refresh_progress();

                self.roi = Some(roi.scaled_around(&predicted, ROI_GROWTH));
                Ok(false)
            }
        }
    }

    // Velocity is the displacement one more prediction step would produce
    fn estimated_velocity(&self) -> (f32, f32) {
        let (x, y) = self.tracker.get_state();
        let mut probe = self.tracker.clone();
        probe.predict();
        let (next_x, next_y) = probe.get_state();
        ((next_x - x) / self.dt, (next_y - y) / self.dt)
    }

    fn refresh_progress(&mut self) {
        self.status.progress = match &self.reference {
            Some(reference) => reference.progress_of(&Point::new(self.status.x, self.status.y)),
            None => 0.0,
        };
    }
}
