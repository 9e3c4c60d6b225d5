//! Browser session management.
//!
//! [`SessionManager`] finds Chrome, prepares a persistent profile, launches the
//! browser with remote debugging enabled and hands back a [`ChromeSession`].
//! Everything above this crate talks to the browser through the
//! [`BrowserSession`] trait.

mod cdp_session;
mod chrome_finder;
mod error;
mod launcher;
mod profile;
mod session;

pub use cdp_session::{CdpConnection, CdpSession};
pub use chrome_finder::ChromeFinder;
pub use error::{Error, Result};
pub use launcher::ChromeLauncher;
pub use profile::{ProfileInfo, ProfileManager};
pub use session::{BrowserSession, ChromeSession, SessionManager, SessionState};
