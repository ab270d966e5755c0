use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::EvaluatorContext;
use super::ExclusivityGuard;
use super::TickOutcome;
use super::TickReport;
use crate::metrics::QUEUE_DEPTH_METRIC;
use crate::metrics::TICKS_TOTAL_METRIC;
use crate::metrics::TICK_COMPLETED;
use crate::metrics::TICK_DURATION_METRIC;
use crate::metrics::TICK_FAILED;
use crate::middleware::Processor;
use crate::processes::CallOperationsContext;
use crate::processes::DetachedClient;
use crate::snapshot::ObservedSamples;
use crate::sources::ClientSourceConfig;
use crate::storage::StorageProvider;
use crate::time::Timestamp;
use crate::transaction::TransactionContext;
use crate::PipelineError;
use crate::Result;

/// One enqueued reconciliation pass
#[derive(Debug)]
pub(crate) struct Tick {
    pub(crate) id: u64,
    pub(crate) created: Timestamp,
    pub(crate) samples: ObservedSamples,
    pub(crate) joined_clients: Vec<ClientSourceConfig>,
    pub(crate) detached_clients: Vec<DetachedClient>,
}

/// Runs ticks one at a time, in the order they were enqueued
pub(crate) struct TickWorker {
    pub(crate) guard: Arc<dyn ExclusivityGuard>,
    pub(crate) storages: StorageProvider,
    pub(crate) call_processor: Processor<CallOperationsContext>,
    pub(crate) transaction_processor: Processor<TransactionContext>,
    pub(crate) user_processor: Arc<Processor<EvaluatorContext>>,
    pub(crate) queue_depth: Arc<AtomicUsize>,
    pub(crate) ticks: broadcast::Sender<TickReport>,
    pub(crate) rx: mpsc::UnboundedReceiver<Tick>,
    pub(crate) shutdown: watch::Receiver<()>,
}

impl TickWorker {
    pub(crate) async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                biased;
                // P0: shutdown received
                _ = self.shutdown.changed() => {
                    info!("evaluator shutdown signal received, draining {} ticks", self.queue_depth.load(Ordering::Acquire));
                    self.rx.close();
                    while let Some(tick) = self.rx.recv().await {
                        self.handle_tick(tick).await;
                    }
                    return Ok(());
                }

                tick = self.rx.recv() => match tick {
                    Some(tick) => self.handle_tick(tick).await,
                    None => {
                        debug!("evaluator dropped, worker stops");
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn handle_tick(
        &self,
        tick: Tick,
    ) {
        let tick_id = tick.id;
        let started = Instant::now();
        let outcome = match catch_panic("tick", self.run_tick(tick)).await {
            Ok(ctx) => {
                debug!(tick_id, "tick completed");
                TICKS_TOTAL_METRIC.with_label_values(&[TICK_COMPLETED]).inc();
                TickOutcome::Completed(Arc::new(ctx))
            }
            Err(e) => {
                error!(tick_id, "tick failed: {:?}", e);
                TICKS_TOTAL_METRIC.with_label_values(&[TICK_FAILED]).inc();
                TickOutcome::Failed(e.to_string())
            }
        };
        observe_stage("tick", started);

        self.queue_depth.fetch_sub(1, Ordering::AcqRel);
        QUEUE_DEPTH_METRIC.dec();
        if self.ticks.send(TickReport { tick_id, outcome }).is_err() {
            debug!(tick_id, "no tick subscribers");
        }
    }

    async fn run_tick(
        &self,
        tick: Tick,
    ) -> Result<EvaluatorContext> {
        let Tick {
            id,
            created,
            samples,
            joined_clients,
            detached_clients,
        } = tick;
        let mut operations = CallOperationsContext {
            joined_clients,
            detached_clients,
            evaluator_context: EvaluatorContext::new(
                id,
                created,
                samples.observed_calls,
                samples.observed_sfus,
            ),
        };

        let started = Instant::now();
        self.guard.acquire().await?;
        let result = catch_panic(
            "call_operations",
            self.call_processor.process(&mut operations),
        )
        .await;
        if let Err(e) = self.guard.release().await {
            warn!(tick_id = id, "failed to release exclusivity guard: {:?}", e);
        }
        result?;
        observe_stage("call_operations", started);

        let started = Instant::now();
        let mut tx = TransactionContext::load(operations.evaluator_context, &self.storages).await?;
        self.transaction_processor.process(&mut tx).await?;
        observe_stage("transaction", started);

        let mut ctx = tx.into_evaluator_context();
        catch_panic("processes", self.user_processor.process(&mut ctx)).await?;
        Ok(ctx)
    }
}

/// Turns a panic raised while polling `fut` into [`PipelineError::Panicked`]
async fn catch_panic<T>(
    stage: &'static str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(PipelineError::Panicked {
            stage,
            reason: panic_reason(payload.as_ref()),
        }
        .into()),
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(reason) = payload.downcast_ref::<&str>() {
        reason.to_string()
    } else if let Some(reason) = payload.downcast_ref::<String>() {
        reason.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn observe_stage(
    stage: &str,
    started: Instant,
) {
    TICK_DURATION_METRIC
        .with_label_values(&[stage])
        .observe(started.elapsed().as_secs_f64() * 1000.0);
}
