pub mod artifacts;
pub mod config;
pub mod error;
pub mod job;
pub mod stats;

pub use config::Config;
pub use error::{Error, Result};
