use stelshop_core::stats::ProcessingState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Not logged in to Stelorder")]
    NotAuthenticated,

    #[error("A job is already running")]
    AlreadyRunning,

    #[error("Browser session is in use by a running job")]
    SessionBusy,

    #[error("Cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: ProcessingState,
    },

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Field generation failed: {0}")]
    Generation(String),

    #[error(transparent)]
    Browser(#[from] stelshop_browser::Error),

    #[error(transparent)]
    Core(#[from] stelshop_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
