use std::collections::HashSet;

use async_trait::async_trait;
use tracing::debug;

use super::TransactionContext;
use crate::middleware::Middleware;
use crate::middleware::Next;
use crate::models::parent_in;
use crate::models::remove_id;
use crate::storage::StorageProvider;
use crate::Result;

/// Evicts peer connections and tracks that went idle or lost their parent this tick.
///
/// Calls and clients are left alone: they only end through detach.
pub struct DeleteOutdatedCallEntriesMiddleware {
    storages: StorageProvider,
    max_idle_time_in_ms: u64,
}

impl DeleteOutdatedCallEntriesMiddleware {
    pub fn new(
        storages: StorageProvider,
        max_idle_time_in_ms: u64,
    ) -> Self {
        Self {
            storages,
            max_idle_time_in_ms,
        }
    }

    async fn delete_outdated(
        &self,
        tx: &mut TransactionContext,
    ) -> Result<()> {
        let now = tx.created;
        let max_idle_time_in_ms = self.max_idle_time_in_ms;
        let ended_calls = owned(tx.evaluator_context.ended_call_ids());
        let mut gone_clients = owned(tx.evaluator_context.detached_client_ids());
        gone_clients.extend(tx.clients.deleted.iter().cloned());

        let entries = self.storages.peer_connection_storage.local_entries().await?;
        let evicted = tx.peer_connections.sweep(entries, now, max_idle_time_in_ms, |pc| {
            parent_in(pc, &gone_clients) || ended_calls.contains(&pc.call_id)
        });
        for pc in evicted {
            debug!(
                peer_connection_id = %pc.peer_connection_id,
                client_id = %pc.client_id,
                "peer connection evicted"
            );
            if let Some(client) = tx
                .clients
                .load_for_update(&self.storages.client_storage, &pc.client_id)
                .await?
            {
                remove_id(&mut client.peer_connection_ids, &pc.peer_connection_id);
            }
        }

        let mut gone_peer_connections = owned(tx.evaluator_context.closed_peer_connection_ids());
        gone_peer_connections.extend(tx.peer_connections.deleted.iter().cloned());
        let ancestor_gone = |client_id: &String, call_id: &String| {
            gone_clients.contains(client_id) || ended_calls.contains(call_id)
        };

        let entries = self.storages.inbound_track_storage.local_entries().await?;
        let evicted = tx.inbound_tracks.sweep(entries, now, max_idle_time_in_ms, |track| {
            parent_in(track, &gone_peer_connections)
                || ancestor_gone(&track.client_id, &track.call_id)
        });
        for track in evicted {
            debug!(track_id = %track.track_id, "inbound track evicted");
            if let Some(pc) = tx
                .peer_connections
                .load_for_update(&self.storages.peer_connection_storage, &track.peer_connection_id)
                .await?
            {
                remove_id(&mut pc.inbound_track_ids, &track.track_id);
            }
        }

        let entries = self.storages.outbound_track_storage.local_entries().await?;
        let evicted = tx.outbound_tracks.sweep(entries, now, max_idle_time_in_ms, |track| {
            parent_in(track, &gone_peer_connections)
                || ancestor_gone(&track.client_id, &track.call_id)
        });
        for track in evicted {
            debug!(track_id = %track.track_id, "outbound track evicted");
            if let Some(pc) = tx
                .peer_connections
                .load_for_update(&self.storages.peer_connection_storage, &track.peer_connection_id)
                .await?
            {
                remove_id(&mut pc.outbound_track_ids, &track.track_id);
            }
        }
        Ok(())
    }
}

fn owned(ids: HashSet<&str>) -> HashSet<String> {
    ids.into_iter().map(str::to_string).collect()
}

#[async_trait]
impl Middleware<TransactionContext> for DeleteOutdatedCallEntriesMiddleware {
    fn name(&self) -> &'static str {
        "delete-outdated-call-entries"
    }

    async fn handle(
        &self,
        tx: &mut TransactionContext,
        next: Next<'_, TransactionContext>,
    ) -> Result<()> {
        self.delete_outdated(tx).await?;
        next.run(tx).await
    }
}
