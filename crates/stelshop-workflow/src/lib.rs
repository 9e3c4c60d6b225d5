//! The shop update workflow on top of a [`stelshop_browser::BrowserSession`].
//!
//! [`BatchProcessor`] walks a job item by item: optional field generation via
//! a [`FieldGenerator`], then [`StelNavigator`] search/edit/save, recording one
//! outcome per started item. Progress is available both as pushed
//! [`RunEvent`]s and as a pulled [`RunStatus`].

mod error;
pub mod fields;
pub mod login;
pub mod navigator;
pub mod processor;
pub mod report;
mod slot;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use fields::{FieldGenerator, TemplateFields};
pub use login::LoginGate;
pub use navigator::{
    FailureKind, ItemOutcome, NavigatorConfig, SiteNavigator, StelNavigator, Step, StepFailure,
};
pub use processor::{BatchProcessor, ProcessorConfig};
pub use report::{CurrentItem, RunEvent, RunStatus, StatusReporter};
pub use slot::SessionSlot;
