use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Profile is in use by another browser: {0}")]
    ProfileLocked(PathBuf),

    #[error("Browser unavailable: {0}")]
    DriverUnavailable(String),

    #[error("Navigation to {url} timed out after {attempts} attempt(s)")]
    NavigationTimeout { url: String, attempts: u32 },

    #[error("Browser session is closed")]
    SessionClosed,

    #[error("Browser session lost: {0}")]
    SessionLost(String),

    #[error("Browser command timed out: {0}")]
    Timeout(String),

    #[error("Script error: {0}")]
    Script(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("CDP error: {0}")]
    Cdp(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when the session itself is gone and no further command can succeed
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::SessionClosed | Error::SessionLost(_) | Error::NavigationTimeout { .. }
        )
    }
}

impl From<chromiumoxide::error::CdpError> for Error {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        use chromiumoxide::error::CdpError;

        let message = err.to_string();
        match err {
            CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse => {
                Error::SessionLost(message)
            }
            CdpError::Timeout => Error::Timeout(message),
            CdpError::JavascriptException(_) => Error::Script(message),
            _ => Error::Cdp(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::SessionClosed.is_fatal());
        assert!(Error::SessionLost("ws closed".to_string()).is_fatal());
        assert!(
            Error::NavigationTimeout {
                url: "https://example.com".to_string(),
                attempts: 3
            }
            .is_fatal()
        );
        assert!(!Error::Script("TypeError".to_string()).is_fatal());
        assert!(!Error::Timeout("evaluate".to_string()).is_fatal());
    }
}
