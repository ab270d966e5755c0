use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use nanoid::nanoid;
use tracing::debug;

use crate::evaluator::EvaluatorContext;
use crate::models::Client;
use crate::models::Entity;
use crate::models::InboundTrack;
use crate::models::OutboundTrack;
use crate::models::PeerConnection;
use crate::models::Sfu;
use crate::models::SfuInboundRtpPad;
use crate::models::SfuOutboundRtpPad;
use crate::models::SfuSctpChannel;
use crate::models::SfuTransport;
use crate::snapshot::ObservedCalls;
use crate::snapshot::ObservedSfus;
use crate::storage::ObserverStorage;
use crate::storage::StorageProvider;
use crate::time::Timestamp;
use crate::Result;

/// Transaction-local view of one entity type
#[derive(Debug, Clone)]
pub struct WorkingSet<V> {
    /// Records to write back on commit
    pub updated: HashMap<String, V>,
    /// Ids to remove on commit
    pub deleted: HashSet<String>,
    /// Ids seen in the snapshot this tick
    pub visited: HashSet<String>,
}

impl<V> Default for WorkingSet<V> {
    fn default() -> Self {
        Self {
            updated: HashMap::new(),
            deleted: HashSet::new(),
            visited: HashSet::new(),
        }
    }
}

impl<V> WorkingSet<V>
where
    V: Entity,
{
    pub fn new(updated: HashMap<String, V>) -> Self {
        Self {
            updated,
            ..Default::default()
        }
    }

    pub fn get(
        &self,
        id: &str,
    ) -> Option<&V> {
        self.updated.get(id)
    }

    pub fn get_mut(
        &mut self,
        id: &str,
    ) -> Option<&mut V> {
        self.updated.get_mut(id)
    }

    pub fn is_deleted(
        &self,
        id: &str,
    ) -> bool {
        self.deleted.contains(id)
    }

    /// Takes part in reconciliation: loaded from the snapshot or marked
    pub fn is_tracked(
        &self,
        id: &str,
    ) -> bool {
        self.updated.contains_key(id) || self.visited.contains(id) || self.deleted.contains(id)
    }

    /// Touches the record and marks it visited
    pub fn visit(
        &mut self,
        id: &str,
        now: Timestamp,
    ) {
        if let Some(record) = self.updated.get_mut(id) {
            record.touch(now);
        }
        self.visited.insert(id.to_string());
    }

    /// Storage-resident records outside this transaction that are idle or whose parent is
    /// gone. Matching ids are marked deleted and the records returned.
    pub fn sweep<F>(
        &mut self,
        entries: Vec<(String, V)>,
        now: Timestamp,
        max_idle_time_in_ms: u64,
        parent_gone: F,
    ) -> Vec<V>
    where
        F: Fn(&V) -> bool,
    {
        let mut evicted = Vec::new();
        for (id, record) in entries {
            if self.is_tracked(&id) {
                continue;
            }
            if !parent_gone(&record) && !is_idle(record.touched(), now, max_idle_time_in_ms) {
                continue;
            }
            debug!(%id, touched = ?record.touched(), "evict outdated entry");
            self.deleted.insert(id);
            evicted.push(record);
        }
        evicted
    }

    /// Returns the record for update, loading it from `storage` when it is not part of the
    /// transaction yet. Deleted or missing records yield `None`.
    pub async fn load_for_update(
        &mut self,
        storage: &Arc<dyn ObserverStorage<V>>,
        id: &str,
    ) -> Result<Option<&mut V>> {
        if self.deleted.contains(id) {
            return Ok(None);
        }
        if !self.updated.contains_key(id) {
            let Some(record) = storage.get(id).await? else {
                return Ok(None);
            };
            self.updated.insert(id.to_string(), record);
        }
        Ok(self.updated.get_mut(id))
    }
}

/// A record is idle when it was never touched or not touched within the grace period
pub fn is_idle(
    touched: Option<Timestamp>,
    now: Timestamp,
    max_idle_time_in_ms: u64,
) -> bool {
    touched.map_or(true, |touched| {
        now.saturating_sub(touched) >= max_idle_time_in_ms
    })
}

/// Working sets of every reconciled entity type for one tick
#[derive(Debug)]
pub struct TransactionContext {
    pub id: String,
    /// Reference time of the transaction, used for touching and eviction
    pub created: Timestamp,
    pub clients: WorkingSet<Client>,
    pub peer_connections: WorkingSet<PeerConnection>,
    pub inbound_tracks: WorkingSet<InboundTrack>,
    pub outbound_tracks: WorkingSet<OutboundTrack>,
    pub sfus: WorkingSet<Sfu>,
    pub sfu_transports: WorkingSet<SfuTransport>,
    pub sfu_inbound_rtp_pads: WorkingSet<SfuInboundRtpPad>,
    pub sfu_outbound_rtp_pads: WorkingSet<SfuOutboundRtpPad>,
    pub sfu_sctp_channels: WorkingSet<SfuSctpChannel>,
    pub evaluator_context: EvaluatorContext,
}

impl TransactionContext {
    /// Fetches every record the snapshot references, all entity types concurrently.
    pub async fn load(
        evaluator_context: EvaluatorContext,
        storages: &StorageProvider,
    ) -> Result<Self> {
        let calls = evaluator_context.observed_calls.clone();
        let sfus = evaluator_context.observed_sfus.clone();

        let (
            clients,
            peer_connections,
            inbound_tracks,
            outbound_tracks,
            sfu_records,
            sfu_transports,
            sfu_inbound_rtp_pads,
            sfu_outbound_rtp_pads,
            sfu_sctp_channels,
        ) = futures::try_join!(
            storages.client_storage.get_all(ids(calls.client_ids())),
            storages
                .peer_connection_storage
                .get_all(ids(calls.peer_connection_ids())),
            storages
                .inbound_track_storage
                .get_all(ids(calls.inbound_track_ids())),
            storages
                .outbound_track_storage
                .get_all(ids(calls.outbound_track_ids())),
            storages.sfu_storage.get_all(ids(sfus.sfu_ids())),
            storages
                .sfu_transport_storage
                .get_all(ids(sfus.sfu_transport_ids())),
            storages
                .sfu_inbound_rtp_pad_storage
                .get_all(ids(sfus.sfu_inbound_rtp_pad_ids())),
            storages
                .sfu_outbound_rtp_pad_storage
                .get_all(ids(sfus.sfu_outbound_rtp_pad_ids())),
            storages
                .sfu_sctp_channel_storage
                .get_all(ids(sfus.sfu_sctp_channel_ids())),
        )?;

        let id = nanoid!();
        debug!(
            transaction_id = %id,
            tick_id = evaluator_context.tick_id,
            clients = clients.len(),
            sfus = sfu_records.len(),
            "transaction loaded"
        );
        Ok(Self {
            id,
            created: evaluator_context.created,
            clients: WorkingSet::new(clients),
            peer_connections: WorkingSet::new(peer_connections),
            inbound_tracks: WorkingSet::new(inbound_tracks),
            outbound_tracks: WorkingSet::new(outbound_tracks),
            sfus: WorkingSet::new(sfu_records),
            sfu_transports: WorkingSet::new(sfu_transports),
            sfu_inbound_rtp_pads: WorkingSet::new(sfu_inbound_rtp_pads),
            sfu_outbound_rtp_pads: WorkingSet::new(sfu_outbound_rtp_pads),
            sfu_sctp_channels: WorkingSet::new(sfu_sctp_channels),
            evaluator_context,
        })
    }

    pub fn observed_calls(&self) -> Arc<ObservedCalls> {
        self.evaluator_context.observed_calls.clone()
    }

    pub fn observed_sfus(&self) -> Arc<ObservedSfus> {
        self.evaluator_context.observed_sfus.clone()
    }

    pub fn into_evaluator_context(self) -> EvaluatorContext {
        self.evaluator_context
    }
}

fn ids<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<String> {
    ids.map(str::to_string).collect()
}
