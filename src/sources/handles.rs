use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;

use parking_lot::Mutex;
use tracing::debug;

use super::joined_or_now;
use super::upgrade;
use super::CallSourceConfig;
use super::ClientSourceConfig;
use super::NewClientSource;
use super::SfuSourceConfig;
use super::Sources;
use super::SourcesInner;
use crate::samples::ClientSample;
use crate::samples::SfuSample;
use crate::SourceError;
use crate::Result;

/// Handle of one client. Clones share the same closed state.
#[derive(Clone)]
pub struct ClientSource {
    config: Arc<ClientSourceConfig>,
    closed: Arc<AtomicBool>,
    inner: Weak<SourcesInner>,
}

impl ClientSource {
    pub(crate) fn new(
        config: ClientSourceConfig,
        inner: Weak<SourcesInner>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            closed: Arc::new(AtomicBool::new(false)),
            inner,
        }
    }

    pub fn config(&self) -> &ClientSourceConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Adds samples to the snapshot under construction.
    ///
    /// # Errors
    /// [`SourceError::Closed`] once the source has been closed.
    pub fn accept(
        &self,
        samples: Vec<ClientSample>,
    ) -> Result<()> {
        if self.is_closed() {
            return Err(SourceError::Closed {
                source_id: self.config.client_id.clone(),
            }
            .into());
        }
        upgrade(&self.inner)?.accept_client_samples(&self.config, samples)
    }

    /// Closes the source and announces the client as detached. Closing twice is a no-op.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        match self.inner.upgrade() {
            Some(inner) => inner.remove_client_source(self),
            None => debug!(client_id = %self.config.client_id, "sources already dropped"),
        }
    }

    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub(crate) fn same_source(
        &self,
        other: &ClientSource,
    ) -> bool {
        Arc::ptr_eq(&self.closed, &other.closed)
    }
}

/// Handle of one media server
#[derive(Clone)]
pub struct SfuSource {
    config: Arc<SfuSourceConfig>,
    closed: Arc<AtomicBool>,
    inner: Weak<SourcesInner>,
}

impl SfuSource {
    pub(crate) fn new(
        config: SfuSourceConfig,
        inner: Weak<SourcesInner>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            closed: Arc::new(AtomicBool::new(false)),
            inner,
        }
    }

    pub fn config(&self) -> &SfuSourceConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// # Errors
    /// [`SourceError::Closed`] once the source has been closed.
    pub fn accept(
        &self,
        samples: Vec<SfuSample>,
    ) -> Result<()> {
        if self.is_closed() {
            return Err(SourceError::Closed {
                source_id: self.config.sfu_id.clone(),
            }
            .into());
        }
        upgrade(&self.inner)?.accept_sfu_samples(&self.config, samples)
    }

    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(inner) = self.inner.upgrade() {
            inner.remove_sfu_source(self);
        }
    }

    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub(crate) fn same_source(
        &self,
        other: &SfuSource,
    ) -> bool {
        Arc::ptr_eq(&self.closed, &other.closed)
    }
}

/// Creates client sources that share the identity of one call
#[derive(Clone)]
pub struct CallSource {
    config: Arc<CallSourceConfig>,
    sources: Sources,
    clients: Arc<Mutex<Vec<ClientSource>>>,
}

impl CallSource {
    pub(crate) fn new(
        config: CallSourceConfig,
        sources: Sources,
    ) -> Self {
        Self {
            config: Arc::new(config),
            sources,
            clients: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn config(&self) -> &CallSourceConfig {
        &self.config
    }

    pub fn create_client_source(
        &self,
        client: NewClientSource,
    ) -> Result<ClientSource> {
        let source = self.sources.create_client_source(ClientSourceConfig {
            service_id: self.config.service_id.clone(),
            media_unit_id: client.media_unit_id,
            room_id: self.config.room_id.clone(),
            call_id: self.config.call_id.clone(),
            client_id: client.client_id,
            user_id: client.user_id,
            marker: client.marker,
            time_zone_id: client.time_zone_id,
            joined: joined_or_now(client.joined),
        })?;

        let mut clients = self.clients.lock();
        clients.retain(|c| !c.is_closed());
        if !clients.iter().any(|c| c.same_source(&source)) {
            clients.push(source.clone());
        }
        Ok(source)
    }

    /// Client sources created through this call that are still open
    pub fn client_sources(&self) -> Vec<ClientSource> {
        self.clients
            .lock()
            .iter()
            .filter(|c| !c.is_closed())
            .cloned()
            .collect()
    }

    /// Closes every client source created through this call
    pub fn close(&self) {
        let clients = std::mem::take(&mut *self.clients.lock());
        for client in clients {
            client.close();
        }
    }
}
