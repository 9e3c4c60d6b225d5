pub mod completion;
pub mod profile;
pub mod run;
pub mod stats;
pub mod validate;
