use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Shared ownership of the one browser session.
///
/// A running job keeps the owned guard for its whole duration; anyone else
/// asking for the session meanwhile gets [`Error::SessionBusy`].
pub struct SessionSlot<S> {
    inner: Arc<Mutex<S>>,
}

impl<S> Clone for SessionSlot<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> SessionSlot<S> {
    pub fn new(session: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Take the session without waiting
    pub fn try_acquire(&self) -> Result<OwnedMutexGuard<S>> {
        Arc::clone(&self.inner)
            .try_lock_owned()
            .map_err(|_| Error::SessionBusy)
    }

    /// Wait until the session is free, e.g. after a run finished
    pub async fn acquire(&self) -> OwnedMutexGuard<S> {
        Arc::clone(&self.inner).lock_owned().await
    }
}
