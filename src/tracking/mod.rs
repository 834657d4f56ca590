//! Export contents of `tracking` folder
mod ball_tracker;
mod cancellation;
mod color_blob;
mod orchestrator;
mod tracking_errors;
mod trajectory;

#[cfg(test)]
pub(crate) mod test_frames;

pub use self::{ball_tracker::*, cancellation::*, color_blob::*, orchestrator::*, tracking_errors::*, trajectory::*};
