use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::tracking::{ColorProfile, TrackingError};

/// One tracked ball as described in the configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BallConfig {
    pub id: i32,
    /// Free-form label, usually the ball color
    pub color: String,
    pub hsv_mean: [f32; 3],
    pub hsv_stddev: [f32; 3],
}

impl BallConfig {
    pub fn new(id: i32, color: &str, hsv_mean: [f32; 3], hsv_stddev: [f32; 3]) -> Self {
        BallConfig {
            id,
            color: color.to_string(),
            hsv_mean,
            hsv_stddev,
        }
    }
    pub fn profile(&self) -> ColorProfile {
        ColorProfile::new(self.hsv_mean, self.hsv_stddev)
    }
}

/// How to open the frame source when it is found closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub descriptor: String,
    /// -1 keeps the source default
    pub width: i32,
    pub height: i32,
    pub fps: i32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            descriptor: "0".to_string(),
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub balls: Vec<BallConfig>,
    #[serde(default)]
    pub source: SourceConfig,
}

impl TrackerConfig {
    pub fn new(balls: Vec<BallConfig>) -> Self {
        TrackerConfig {
            balls,
            source: SourceConfig::default(),
        }
    }
    pub fn with_source(mut self, source: SourceConfig) -> Self {
        self.source = source;
        self
    }
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TrackingError> {
        let contents = fs::read_to_string(path)?;
        TrackerConfig::from_json_str(&contents)
    }
    pub fn from_json_str(contents: &str) -> Result<Self, TrackingError> {
        let config: TrackerConfig = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }
    /// At least one ball, unique ids, finite colors and non-negative deviations
    pub fn validate(&self) -> Result<(), TrackingError> {
        if self.balls.is_empty() {
            return Err(TrackingError::BadConfig("no balls configured".to_string()));
        }
        let mut seen = HashSet::new();
        for ball in self.balls.iter() {
            if !seen.insert(ball.id) {
                return Err(TrackingError::BadConfig(format!("duplicate ball id {}", ball.id)));
            }
            if ball.hsv_mean.iter().any(|v| !v.is_finite()) {
                return Err(TrackingError::BadConfig(format!("ball {}: hsv_mean must be finite", ball.id)));
            }
            if ball.hsv_stddev.iter().any(|v| !v.is_finite() || *v < 0.0) {
                return Err(TrackingError::BadConfig(format!(
                    "ball {}: hsv_stddev must be finite and non-negative",
                    ball.id
                )));
            }
        }
        Ok(())
    }
}
