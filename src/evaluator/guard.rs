use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use parking_lot::Mutex;
use tokio::sync::OwnedSemaphorePermit;
use tokio::sync::Semaphore;
use tracing::trace;
use tracing::warn;

use crate::PipelineError;
use crate::Result;

/// Critical section around the client lifecycle processes of a tick.
///
/// Join and detach rewrite call and client records that other observer instances may share.
/// An implementation backed by a distributed lock keeps them from interleaving.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ExclusivityGuard: Send + Sync + 'static {
    async fn acquire(&self) -> Result<()>;

    async fn release(&self) -> Result<()>;
}

/// Guard shared by the evaluators of one process
pub struct LocalExclusivityGuard {
    semaphore: Arc<Semaphore>,
    permit: Mutex<Option<OwnedSemaphorePermit>>,
}

impl LocalExclusivityGuard {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
            permit: Mutex::new(None),
        }
    }

    pub fn is_held(&self) -> bool {
        self.permit.lock().is_some()
    }
}

impl Default for LocalExclusivityGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExclusivityGuard for LocalExclusivityGuard {
    async fn acquire(&self) -> Result<()> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| PipelineError::GuardUnavailable(e.to_string()))?;
        *self.permit.lock() = Some(permit);
        trace!("exclusivity guard acquired");
        Ok(())
    }

    async fn release(&self) -> Result<()> {
        match self.permit.lock().take() {
            Some(permit) => drop(permit),
            None => warn!("released an exclusivity guard that was not held"),
        }
        Ok(())
    }
}

/// Guard for a single observer owning its storage
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopExclusivityGuard;

#[async_trait]
impl ExclusivityGuard for NoopExclusivityGuard {
    async fn acquire(&self) -> Result<()> {
        Ok(())
    }

    async fn release(&self) -> Result<()> {
        Ok(())
    }
}
