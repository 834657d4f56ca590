use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tracking::TrackingError;
use crate::utils::{euclidean_distance, Point};

/// Reference run of a ball around the track, recorded once by the bootstrap procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryRecord {
    pub run_id: Uuid,
    pub points: Vec<Point>,
    /// Sum of distances between consecutive points (pixels)
    pub length: f64,
    pub start_point: Option<Point>,
    pub end_point: Option<Point>,
    pub timestamp: DateTime<Utc>,
}

// On-disk layout: the record is nested under "track_trajectory"
#[derive(Serialize, Deserialize)]
struct TrajectoryDocument {
    track_trajectory: TrajectoryRecord,
}

impl TrajectoryRecord {
    pub fn new() -> Self {
        TrajectoryRecord {
            run_id: Uuid::new_v4(),
            points: Vec::with_capacity(1024),
            length: 0.0,
            start_point: None,
            end_point: None,
            timestamp: Utc::now(),
        }
    }
    /// Appends a point. The first point becomes the start, the latest one is always the end.
    pub fn push(&mut self, point: Point) {
        if self.start_point.is_none() {
            self.start_point = Some(point);
        }
        self.end_point = Some(point);
        self.points.push(point);
    }
    pub fn len(&self) -> usize {
        self.points.len()
    }
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
    /// Computes total length and stamps the capture time
    pub fn finalize(&mut self) {
        self.length = path_length(&self.points);
        self.timestamp = Utc::now();
    }
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), TrackingError> {
        let doc = TrajectoryDocument {
            track_trajectory: self.clone(),
        };
        let contents = serde_json::to_string_pretty(&doc)?;
        fs::write(path, contents)?;
        Ok(())
    }
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TrackingError> {
        let contents = fs::read_to_string(path)?;
        let doc: TrajectoryDocument = serde_json::from_str(&contents)?;
        Ok(doc.track_trajectory)
    }
    /// Fraction of the track covered when standing at the trajectory point nearest to `position`.
    /// Returns 0.0 for a record without length.
    pub fn progress_of(&self, position: &Point) -> f32 {
        if self.points.len() < 2 || self.length <= 0.0 {
            return 0.0;
        }
        let mut travelled = 0.0f64;
        let mut best_travelled = 0.0f64;
        let mut best_distance = f32::MAX;
        for (idx, point) in self.points.iter().enumerate() {
            if idx > 0 {
                travelled += euclidean_distance(&self.points[idx - 1], point) as f64;
            }
            let distance = euclidean_distance(point, position);
            if distance < best_distance {
                best_distance = distance;
                best_travelled = travelled;
            }
        }
        (best_travelled / self.length).clamp(0.0, 1.0) as f32
    }
}

impl Default for TrajectoryRecord {
    fn default() -> Self {
        TrajectoryRecord::new()
    }
}

/// Sum of Euclidean distances between consecutive points
pub fn path_length(points: &[Point]) -> f64 {
    points
        .iter()
        .tuple_windows()
        .map(|(a, b)| euclidean_distance(a, b) as f64)
        .sum()
}
