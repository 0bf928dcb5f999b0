//! Shared ownership of a session for concurrent front ends
//!
//! Remote operations (`next`, `submit`, `analyze`) run on a spawned task that
//! owns the session lock. A second remote operation started while one is in
//! flight is rejected with [`WizardError::Busy`]. A caller that stops
//! waiting does not cancel the remote call; its result is still applied to
//! the session.

use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::core::analysis::{DocumentSet, MergeReport};
use crate::core::ports::SubmissionAck;
use crate::core::workflow::{Cursor, GotoOutcome, WizardError, WizardSession};

#[derive(Clone)]
pub struct SharedSession {
    inner: Arc<Mutex<WizardSession>>,
}

impl fmt::Debug for SharedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSession")
            .field("busy", &self.is_busy())
            .field("handles", &Arc::strong_count(&self.inner))
            .finish_non_exhaustive()
    }
}

impl SharedSession {
    pub fn new(session: WizardSession) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// A remote operation currently holds the session
    pub fn is_busy(&self) -> bool {
        self.inner.try_lock().is_err()
    }

    fn acquire(&self) -> Result<OwnedMutexGuard<WizardSession>, WizardError> {
        Arc::clone(&self.inner)
            .try_lock_owned()
            .map_err(|_| WizardError::Busy)
    }

    pub async fn next(&self) -> Result<Cursor, WizardError> {
        let mut guard = self.acquire()?;
        tokio::spawn(async move { guard.next().await })
            .await
            .map_err(|_| WizardError::Interrupted)?
    }

    pub async fn submit(&self) -> Result<SubmissionAck, WizardError> {
        let mut guard = self.acquire()?;
        tokio::spawn(async move { guard.submit().await })
            .await
            .map_err(|_| WizardError::Interrupted)?
    }

    pub async fn analyze(&self, documents: Option<DocumentSet>) -> Result<MergeReport, WizardError> {
        let mut guard = self.acquire()?;
        tokio::spawn(async move { guard.analyze(documents).await })
            .await
            .map_err(|_| WizardError::Interrupted)?
    }

    /// Local moves wait for any running operation to finish
    pub async fn previous(&self) -> Result<Cursor, WizardError> {
        self.inner.lock().await.previous()
    }

    pub async fn goto(&self, key: &str) -> Result<GotoOutcome, WizardError> {
        self.inner.lock().await.goto(key)
    }

    /// Run a closure against the session once it is free
    pub async fn with<R>(&self, f: impl FnOnce(&mut WizardSession) -> R) -> R {
        let mut guard = self.inner.lock().await;
        f(&mut guard)
    }

    /// Take the session back when no other handle remains
    pub fn into_inner(self) -> Result<WizardSession, Self> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|inner| Self { inner })
    }
}
