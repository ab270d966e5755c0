//! Sample ingestion.
//!
//! [`Sources`] hands out one source per client or SFU. Every accepted sample is routed into
//! the current snapshot builders; a flush freezes them into an [`ObservedSamples`] pair and
//! emits it as a [`SourcesEvent`]. Appending, the flush check and the builder swap happen
//! under one lock on the caller's path, so a sample always ends up in exactly one snapshot.
mod handles;
mod timer;

pub use handles::*;

#[cfg(test)]
mod sources_test;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Weak;

use parking_lot::Mutex;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::metrics::FLUSHED_SAMPLES_METRIC;
use crate::samples::ClientSample;
use crate::samples::SfuSample;
use crate::snapshot::ObservedCallsBuilder;
use crate::snapshot::ObservedSamples;
use crate::snapshot::ObservedSfusBuilder;
use crate::time::now_ms;
use crate::time::Timestamp;
use crate::SourceError;
use crate::SourcesConfig;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSourceConfig {
    pub service_id: String,
    pub room_id: String,
    pub call_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSourceConfig {
    pub service_id: String,
    pub media_unit_id: String,
    pub room_id: String,
    pub call_id: String,
    pub client_id: String,
    pub user_id: Option<String>,
    pub marker: Option<String>,
    pub time_zone_id: Option<String>,
    pub joined: Timestamp,
}

/// Client specific part of a [`ClientSourceConfig`] created under a call source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewClientSource {
    pub media_unit_id: String,
    pub client_id: String,
    pub user_id: Option<String>,
    pub marker: Option<String>,
    pub time_zone_id: Option<String>,
    /// Defaults to the creation time
    pub joined: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SfuSourceConfig {
    pub service_id: String,
    pub media_unit_id: String,
    pub sfu_id: String,
    pub marker: Option<String>,
    pub time_zone_id: Option<String>,
    pub joined: Timestamp,
}

#[derive(Debug, Clone)]
pub enum SourcesEvent {
    ObservedSamples(ObservedSamples),
    AddedClientSource(ClientSourceConfig),
    RemovedClientSource(ClientSourceConfig),
    AddedSfuSource(SfuSourceConfig),
    RemovedSfuSource(SfuSourceConfig),
}

pub(crate) struct SourcesState {
    calls: ObservedCallsBuilder,
    sfus: ObservedSfusBuilder,
    number_of_samples: usize,
    pub(crate) deadline: Option<Instant>,
    client_sources: HashMap<String, ClientSource>,
    sfu_sources: HashMap<String, SfuSource>,
    pub(crate) closed: bool,
}

pub(crate) struct SourcesInner {
    config: SourcesConfig,
    pub(crate) state: Mutex<SourcesState>,
    events: mpsc::UnboundedSender<SourcesEvent>,
    pub(crate) timer_reset: Arc<Notify>,
}

/// Registry of client and SFU sources feeding one evaluator
#[derive(Clone)]
pub struct Sources {
    inner: Arc<SourcesInner>,
}

impl Sources {
    /// Creates the registry and the receiver of its events. When a flush interval is
    /// configured a timer task is spawned; it stops on `shutdown` or [`Sources::close`].
    pub fn new(
        config: SourcesConfig,
        shutdown: watch::Receiver<()>,
    ) -> (Self, mpsc::UnboundedReceiver<SourcesEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(SourcesInner {
            config,
            state: Mutex::new(SourcesState {
                calls: ObservedCallsBuilder::new(),
                sfus: ObservedSfusBuilder::new(),
                number_of_samples: 0,
                deadline: None,
                client_sources: HashMap::new(),
                sfu_sources: HashMap::new(),
                closed: false,
            }),
            events,
            timer_reset: Arc::new(Notify::new()),
        });

        if inner.config.flush_interval().is_some() {
            timer::spawn_flush_timer(
                Arc::downgrade(&inner),
                inner.timer_reset.clone(),
                shutdown,
            );
        }
        (Self { inner }, events_rx)
    }

    pub fn create_call_source(
        &self,
        config: CallSourceConfig,
    ) -> CallSource {
        CallSource::new(config, self.clone())
    }

    /// Creates the source of one client. A second request for the same client id returns
    /// the source already registered.
    pub fn create_client_source(
        &self,
        config: ClientSourceConfig,
    ) -> Result<ClientSource> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(SourceError::SourcesClosed.into());
        }
        if let Some(existing) = state.client_sources.get(&config.client_id) {
            warn!(
                "Attempted to add a ClientSource for client {} twice",
                config.client_id
            );
            return Ok(existing.clone());
        }

        let source = ClientSource::new(config.clone(), Arc::downgrade(&self.inner));
        state
            .client_sources
            .insert(config.client_id.clone(), source.clone());
        self.inner.arm_timer_if_idle(&mut state);
        self.inner.emit(SourcesEvent::AddedClientSource(config));
        Ok(source)
    }

    /// Creates the source of one SFU. A second request for the same SFU id returns the
    /// source already registered.
    pub fn create_sfu_source(
        &self,
        config: SfuSourceConfig,
    ) -> Result<SfuSource> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(SourceError::SourcesClosed.into());
        }
        if let Some(existing) = state.sfu_sources.get(&config.sfu_id) {
            warn!("Attempted to add a SfuSource for sfu {} twice", config.sfu_id);
            return Ok(existing.clone());
        }

        let source = SfuSource::new(config.clone(), Arc::downgrade(&self.inner));
        state.sfu_sources.insert(config.sfu_id.clone(), source.clone());
        self.inner.arm_timer_if_idle(&mut state);
        self.inner.emit(SourcesEvent::AddedSfuSource(config));
        Ok(source)
    }

    pub fn client_source(
        &self,
        client_id: &str,
    ) -> Option<ClientSource> {
        self.inner.state.lock().client_sources.get(client_id).cloned()
    }

    pub fn number_of_client_sources(&self) -> usize {
        self.inner.state.lock().client_sources.len()
    }

    pub fn number_of_sfu_sources(&self) -> usize {
        self.inner.state.lock().sfu_sources.len()
    }

    /// Samples accepted since the last flush
    pub fn pending_samples(&self) -> usize {
        self.inner.state.lock().number_of_samples
    }

    /// Freezes the current builders and emits them immediately
    pub fn flush(&self) {
        let mut state = self.inner.state.lock();
        if state.closed {
            return;
        }
        self.inner.flush_locked(&mut state);
    }

    /// Closes every source, emits the pending samples and stops the timer.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        if state.closed {
            return;
        }
        for (_, source) in state.client_sources.drain() {
            source.mark_closed();
            self.inner
                .emit(SourcesEvent::RemovedClientSource(source.config().clone()));
        }
        for (_, source) in state.sfu_sources.drain() {
            source.mark_closed();
            self.inner
                .emit(SourcesEvent::RemovedSfuSource(source.config().clone()));
        }
        self.inner.flush_locked(&mut state);
        state.closed = true;
        state.deadline = None;
        drop(state);

        self.inner.timer_reset.notify_one();
        info!("sources closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }
}

impl Drop for SourcesInner {
    fn drop(&mut self) {
        // wakes the flush timer so it notices the state is gone
        self.timer_reset.notify_one();
    }
}

impl SourcesInner {
    fn emit(
        &self,
        event: SourcesEvent,
    ) {
        if self.events.send(event).is_err() {
            debug!("sources event receiver dropped");
        }
    }

    fn arm_timer_if_idle(
        &self,
        state: &mut SourcesState,
    ) {
        if state.deadline.is_some() {
            return;
        }
        if let Some(interval) = self.config.flush_interval() {
            state.deadline = Some(Instant::now() + interval);
            self.timer_reset.notify_one();
        }
    }

    pub(crate) fn accept_client_samples(
        &self,
        config: &ClientSourceConfig,
        samples: Vec<ClientSample>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(SourceError::SourcesClosed.into());
        }
        let count = samples.len();
        state.calls.add_client_samples(config, samples);
        self.increment_samples(&mut state, count);
        Ok(())
    }

    pub(crate) fn accept_sfu_samples(
        &self,
        config: &SfuSourceConfig,
        samples: Vec<SfuSample>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(SourceError::SourcesClosed.into());
        }
        let count = samples.len();
        state.sfus.add_sfu_samples(config, samples);
        self.increment_samples(&mut state, count);
        Ok(())
    }

    fn increment_samples(
        &self,
        state: &mut SourcesState,
        count: usize,
    ) {
        state.number_of_samples += count;
        let max_samples = self.config.max_samples;
        if max_samples < 1 || state.number_of_samples < max_samples {
            return;
        }
        self.flush_locked(state);
    }

    /// Swaps in fresh builders and emits the frozen snapshot. Caller holds the state lock.
    pub(crate) fn flush_locked(
        &self,
        state: &mut SourcesState,
    ) {
        let observed_calls = std::mem::take(&mut state.calls).build();
        let observed_sfus = std::mem::take(&mut state.sfus).build();
        let number_of_samples = std::mem::take(&mut state.number_of_samples);

        state.deadline = self
            .config
            .flush_interval()
            .map(|interval| Instant::now() + interval);
        if state.deadline.is_some() {
            self.timer_reset.notify_one();
        }

        FLUSHED_SAMPLES_METRIC.inc_by(number_of_samples as u64);
        debug!(number_of_samples, "flush observed samples");
        self.emit(SourcesEvent::ObservedSamples(ObservedSamples::new(
            observed_calls,
            observed_sfus,
            number_of_samples,
        )));
    }

    pub(crate) fn remove_client_source(
        &self,
        source: &ClientSource,
    ) {
        let mut state = self.state.lock();
        let client_id = &source.config().client_id;
        if state
            .client_sources
            .get(client_id)
            .is_some_and(|registered| registered.same_source(source))
        {
            state.client_sources.remove(client_id);
        }
        drop(state);
        self.emit(SourcesEvent::RemovedClientSource(source.config().clone()));
    }

    pub(crate) fn remove_sfu_source(
        &self,
        source: &SfuSource,
    ) {
        let mut state = self.state.lock();
        let sfu_id = &source.config().sfu_id;
        if state
            .sfu_sources
            .get(sfu_id)
            .is_some_and(|registered| registered.same_source(source))
        {
            state.sfu_sources.remove(sfu_id);
        }
        drop(state);
        self.emit(SourcesEvent::RemovedSfuSource(source.config().clone()));
    }
}

pub(crate) fn upgrade(inner: &Weak<SourcesInner>) -> Result<Arc<SourcesInner>> {
    inner
        .upgrade()
        .ok_or_else(|| SourceError::SourcesClosed.into())
}

pub(crate) fn joined_or_now(joined: Option<Timestamp>) -> Timestamp {
    joined.unwrap_or_else(now_ms)
}
