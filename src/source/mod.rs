//! Export contents of `source` folder
mod frame_source;
mod image_sequence;
mod memory;

pub use self::{frame_source::*, image_sequence::*, memory::*};
