//! Real-time tracking of colored balls on a track.
//!
//! Each ball is found by HSV color segmentation inside an adaptive region of interest
//! and smoothed by a constant-velocity Kalman filter. [`tracking::TrackingOrchestrator`]
//! drives all trackers from one [`source::FrameSource`].
pub mod config;
pub mod source;
pub mod tracking;
pub mod utils;
