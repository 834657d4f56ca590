use kalman_rust::kalman;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("estimator error: {0:?}")]
    KalmanError(kalman::Kalman2DError),
    #[error("bad configuration: {0}")]
    BadConfig(String),
    #[error("frame source error: {0}")]
    Source(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl From<kalman::Kalman2DError> for TrackingError {
    fn from(e: kalman::Kalman2DError) -> Self {
        TrackingError::KalmanError(e)
    }
}
