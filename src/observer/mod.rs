//! Entry point of the crate.
//!
//! [`Observer`] owns the [`Sources`] and the [`Evaluator`] and forwards every source event to
//! the evaluator from one background task: client sources become buffered joins and detaches,
//! flushed snapshots become ticks.
#[cfg(test)]
mod observer_test;

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::evaluator::Evaluator;
use crate::evaluator::EvaluatorContext;
use crate::evaluator::ExclusivityGuard;
use crate::evaluator::LocalExclusivityGuard;
use crate::evaluator::ProcessId;
use crate::evaluator::TickReport;
use crate::middleware::Middleware;
use crate::reports::ReportsCollector;
use crate::sources::CallSource;
use crate::sources::CallSourceConfig;
use crate::sources::ClientSource;
use crate::sources::ClientSourceConfig;
use crate::sources::SfuSource;
use crate::sources::SfuSourceConfig;
use crate::sources::Sources;
use crate::sources::SourcesEvent;
use crate::storage::StorageProvider;
use crate::utils::async_task::spawn_task;
use crate::ObserverConfig;
use crate::Result;

pub struct Observer {
    config: ObserverConfig,
    sources: Sources,
    evaluator: Arc<Evaluator>,
    shutdown: watch::Sender<()>,
}

impl Observer {
    /// Validates `config` and starts the flush timer, the tick worker and the event pump.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(
        config: ObserverConfig,
        storages: StorageProvider,
        guard: Arc<dyn ExclusivityGuard>,
        reports: Arc<dyn ReportsCollector>,
    ) -> Result<Self> {
        let config = config.validate()?;
        let (shutdown, shutdown_rx) = watch::channel(());
        let (evaluator_shutdown, evaluator_shutdown_rx) = watch::channel(());

        let (sources, events) = Sources::new(config.sources.clone(), shutdown_rx.clone());
        let evaluator = Arc::new(Evaluator::new(
            config.evaluator.clone(),
            guard,
            storages,
            reports,
            evaluator_shutdown_rx,
        ));

        let pump = EventPump {
            evaluator: evaluator.clone(),
            events,
            shutdown: shutdown_rx,
            evaluator_shutdown,
        };
        spawn_task("observer-events", move || pump.run(), None);

        debug!(?config, "observer created");
        Ok(Self {
            config,
            sources,
            evaluator,
            shutdown,
        })
    }

    /// Observer over in-memory storage guarded within this process
    pub fn in_memory(
        config: ObserverConfig,
        reports: Arc<dyn ReportsCollector>,
    ) -> Result<Self> {
        Self::new(
            config,
            StorageProvider::in_memory(),
            Arc::new(LocalExclusivityGuard::new()),
            reports,
        )
    }

    pub fn config(&self) -> &ObserverConfig {
        &self.config
    }

    pub fn sources(&self) -> &Sources {
        &self.sources
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    pub fn create_call_source(
        &self,
        config: CallSourceConfig,
    ) -> CallSource {
        self.sources.create_call_source(config)
    }

    pub fn create_client_source(
        &self,
        config: ClientSourceConfig,
    ) -> Result<ClientSource> {
        self.sources.create_client_source(config)
    }

    pub fn create_sfu_source(
        &self,
        config: SfuSourceConfig,
    ) -> Result<SfuSource> {
        self.sources.create_sfu_source(config)
    }

    pub fn add_process(
        &self,
        process: Arc<dyn Middleware<EvaluatorContext>>,
    ) -> ProcessId {
        self.evaluator.add_process(process)
    }

    pub fn remove_process(
        &self,
        id: ProcessId,
    ) -> bool {
        self.evaluator.remove_process(id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TickReport> {
        self.evaluator.subscribe()
    }

    /// Flushes the samples accepted so far into a tick
    pub fn flush(&self) {
        self.sources.flush();
    }

    /// Closes every source and lets the ticks already produced run to completion.
    pub fn close(&self) {
        if self.sources.is_closed() {
            return;
        }
        self.sources.close();
        if self.shutdown.send(()).is_err() {
            debug!("observer event pump already stopped");
        }
        info!("observer closed");
    }

    pub fn is_closed(&self) -> bool {
        self.sources.is_closed()
    }
}

/// Moves source events into the evaluator, in the order the sources emitted them
struct EventPump {
    evaluator: Arc<Evaluator>,
    events: mpsc::UnboundedReceiver<SourcesEvent>,
    shutdown: watch::Receiver<()>,
    evaluator_shutdown: watch::Sender<()>,
}

impl EventPump {
    async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.changed() => {
                    // close() emits synchronously, so whatever it produced is queued already
                    while let Ok(event) = self.events.try_recv() {
                        self.forward(event);
                    }
                    if self.evaluator_shutdown.send(()).is_err() {
                        debug!("evaluator worker already stopped");
                    }
                    return Ok(());
                }

                event = self.events.recv() => match event {
                    Some(event) => self.forward(event),
                    None => return Ok(()),
                }
            }
        }
    }

    fn forward(
        &self,
        event: SourcesEvent,
    ) {
        match event {
            SourcesEvent::ObservedSamples(samples) => {
                if let Err(e) = self.evaluator.add_observed_samples(samples) {
                    error!("observed samples dropped: {:?}", e);
                }
            }
            SourcesEvent::AddedClientSource(config) => {
                self.evaluator.add_created_client_source(config);
            }
            SourcesEvent::RemovedClientSource(config) => {
                self.evaluator.add_closed_client_source(config);
            }
            SourcesEvent::AddedSfuSource(config) => {
                debug!(sfu_id = %config.sfu_id, "sfu source added");
            }
            SourcesEvent::RemovedSfuSource(config) => {
                debug!(sfu_id = %config.sfu_id, "sfu source removed");
            }
        }
    }
}
