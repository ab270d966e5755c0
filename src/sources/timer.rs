use std::sync::Arc;
use std::sync::Weak;

use tokio::sync::watch;
use tokio::sync::Notify;
use tokio::time::sleep_until;
use tokio::time::Instant;
use tracing::debug;

use super::SourcesInner;

/// Flushes the builders whenever the deadline in the sources state passes. Flushes by
/// sample count move the deadline and wake the task through `timer_reset`.
///
/// The task only holds the state while reading or flushing it, so dropping the last
/// [`Sources`](super::Sources) handle stops it.
pub(crate) fn spawn_flush_timer(
    inner: Weak<SourcesInner>,
    timer_reset: Arc<Notify>,
    mut shutdown: watch::Receiver<()>,
) {
    tokio::spawn(async move {
        loop {
            let reset = timer_reset.notified();
            let deadline = {
                let Some(sources) = inner.upgrade() else {
                    break;
                };
                let state = sources.state.lock();
                if state.closed {
                    break;
                }
                state.deadline
            };

            tokio::select! {
                _ = shutdown.changed() => {
                    debug!("flush timer shutdown signal received");
                    break;
                }
                _ = reset => {}
                _ = wait_for(deadline) => {
                    let Some(sources) = inner.upgrade() else {
                        break;
                    };
                    let mut state = sources.state.lock();
                    if !state.closed && state.deadline.is_some_and(|d| d <= Instant::now()) {
                        sources.flush_locked(&mut state);
                    }
                }
            }
        }
        debug!("flush timer stopped");
    });
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
