mod reader;
mod types;

pub use reader::{JobReader, ValidationReport};
pub use types::*;
