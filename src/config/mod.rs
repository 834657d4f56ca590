//! Export contents of `config` folder
mod config;

pub use self::config::*;
