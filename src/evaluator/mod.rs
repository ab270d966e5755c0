//! Per-tick orchestration.
//!
//! Every flushed snapshot becomes one tick. Ticks are queued on an unbounded channel and run
//! by a single worker task, so they execute strictly in submission order and never overlap.
//! A tick applies the buffered client joins and detaches under the [`ExclusivityGuard`],
//! reconciles the snapshot inside a [`TransactionContext`] and finally hands the resulting
//! [`EvaluatorContext`] to the user middlewares and the tick subscribers.
//!
//! [`TransactionContext`]: crate::transaction::TransactionContext
mod context;
mod guard;
mod worker;

pub use context::*;
pub use guard::*;
use worker::*;


use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::debug;

use crate::metrics::QUEUE_DEPTH_METRIC;
use crate::middleware::Middleware;
use crate::middleware::MiddlewareId;
use crate::middleware::Processor;
use crate::processes::create_call_processor;
use crate::processes::DetachedClient;
use crate::reports::ReportsCollector;
use crate::snapshot::ObservedSamples;
use crate::sources::ClientSourceConfig;
use crate::storage::StorageProvider;
use crate::time::now_ms;
use crate::time::Timestamp;
use crate::transaction::create_transaction_processor;
use crate::utils::async_task::spawn_task;
use crate::EvaluatorConfig;
use crate::PipelineError;
use crate::Result;

const TICK_SUBSCRIBER_CAPACITY: usize = 128;

/// Handle of a user middleware registered with [`Evaluator::add_process`]
pub type ProcessId = MiddlewareId;

#[derive(Debug, Clone)]
pub enum TickOutcome {
    Completed(Arc<EvaluatorContext>),
    Failed(String),
}

/// Published once per tick, whatever its outcome
#[derive(Debug, Clone)]
pub struct TickReport {
    pub tick_id: u64,
    pub outcome: TickOutcome,
}

impl TickReport {
    pub fn context(&self) -> Option<&Arc<EvaluatorContext>> {
        match &self.outcome {
            TickOutcome::Completed(ctx) => Some(ctx),
            TickOutcome::Failed(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
enum ClientOperation {
    Join(ClientSourceConfig),
    Detach(DetachedClient),
}

impl ClientOperation {
    fn client_id(&self) -> &str {
        match self {
            ClientOperation::Join(config) => &config.client_id,
            ClientOperation::Detach(detached) => &detached.client_id,
        }
    }
}

struct Pending {
    next_tick_id: u64,
    client_operations: Vec<ClientOperation>,
}

pub struct Evaluator {
    config: EvaluatorConfig,
    pending: Mutex<Pending>,
    user_processor: Arc<Processor<EvaluatorContext>>,
    queue_depth: Arc<AtomicUsize>,
    ticks: broadcast::Sender<TickReport>,
    tx: mpsc::UnboundedSender<Tick>,
}

impl Evaluator {
    /// Spawns the tick worker. On `shutdown` the worker runs the ticks already queued and
    /// stops; later submissions fail with [`PipelineError::EvaluatorClosed`].
    pub fn new(
        config: EvaluatorConfig,
        guard: Arc<dyn ExclusivityGuard>,
        storages: StorageProvider,
        reports: Arc<dyn ReportsCollector>,
        shutdown: watch::Receiver<()>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (ticks, _) = broadcast::channel(TICK_SUBSCRIBER_CAPACITY);
        let user_processor = Arc::new(Processor::new("evaluator-processes"));
        let queue_depth = Arc::new(AtomicUsize::new(0));

        let worker = TickWorker {
            guard,
            storages: storages.clone(),
            call_processor: create_call_processor(storages.clone(), reports.clone()),
            transaction_processor: create_transaction_processor(&config, storages, reports),
            user_processor: user_processor.clone(),
            queue_depth: queue_depth.clone(),
            ticks: ticks.clone(),
            rx,
            shutdown,
        };
        spawn_task("evaluator", move || worker.run(), None);

        Self {
            config,
            pending: Mutex::new(Pending {
                next_tick_id: 1,
                client_operations: Vec::new(),
            }),
            user_processor,
            queue_depth,
            ticks,
            tx,
        }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Buffers a join for the next tick, replacing any operation buffered for the same client
    pub fn add_created_client_source(
        &self,
        config: ClientSourceConfig,
    ) {
        self.buffer(ClientOperation::Join(config));
    }

    /// Buffers a detach stamped with the current time for the next tick
    pub fn add_closed_client_source(
        &self,
        config: ClientSourceConfig,
    ) {
        self.buffer(ClientOperation::Detach(DetachedClient {
            client_id: config.client_id,
            call_id: config.call_id,
            detached: now_ms(),
        }));
    }

    /// Enqueues a tick over `samples` together with the buffered client operations.
    ///
    /// Returns the id of the tick; its [`TickReport`] carries the same id.
    pub fn add_observed_samples(
        &self,
        samples: ObservedSamples,
    ) -> Result<u64> {
        self.enqueue(samples, now_ms())
    }

    pub(crate) fn enqueue(
        &self,
        samples: ObservedSamples,
        created: Timestamp,
    ) -> Result<u64> {
        let mut pending = self.pending.lock();
        let tick_id = pending.next_tick_id;
        let operations = std::mem::take(&mut pending.client_operations);

        let mut tick = Tick {
            id: tick_id,
            created,
            samples,
            joined_clients: Vec::new(),
            detached_clients: Vec::new(),
        };
        for operation in operations.iter().cloned() {
            match operation {
                ClientOperation::Join(config) => tick.joined_clients.push(config),
                ClientOperation::Detach(detached) => tick.detached_clients.push(detached),
            }
        }

        self.queue_depth.fetch_add(1, Ordering::AcqRel);
        QUEUE_DEPTH_METRIC.inc();
        if self.tx.send(tick).is_err() {
            self.queue_depth.fetch_sub(1, Ordering::AcqRel);
            QUEUE_DEPTH_METRIC.dec();
            pending.client_operations = operations;
            return Err(PipelineError::EvaluatorClosed.into());
        }
        pending.next_tick_id += 1;
        debug!(tick_id, "tick enqueued");
        Ok(tick_id)
    }

    /// Ticks enqueued but not finished yet
    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Acquire)
    }

    /// Client operations waiting for the next tick
    pub fn pending_client_operations(&self) -> usize {
        self.pending.lock().client_operations.len()
    }

    /// Receives a [`TickReport`] for every tick finished after subscribing
    pub fn subscribe(&self) -> broadcast::Receiver<TickReport> {
        self.ticks.subscribe()
    }

    /// Appends a middleware run over the evaluator context of every completed transaction
    pub fn add_process(
        &self,
        process: Arc<dyn Middleware<EvaluatorContext>>,
    ) -> ProcessId {
        self.user_processor.add_middleware(process)
    }

    pub fn number_of_processes(&self) -> usize {
        self.user_processor.len()
    }

    /// Returns `false` when `id` is not registered
    pub fn remove_process(
        &self,
        id: ProcessId,
    ) -> bool {
        self.user_processor.remove_middleware(id)
    }

    fn buffer(
        &self,
        operation: ClientOperation,
    ) {
        let mut pending = self.pending.lock();
        pending
            .client_operations
            .retain(|buffered| buffered.client_id() != operation.client_id());
        pending.client_operations.push(operation);
    }
}
