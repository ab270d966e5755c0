use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use tracing::warn;

use super::TransactionContext;
use super::WorkingSet;
use crate::evaluator::Removed;
use crate::metrics::record_entities;
use crate::middleware::Middleware;
use crate::middleware::Next;
use crate::models::Entity;
use crate::reports::CallEventReport;
use crate::reports::Report;
use crate::reports::ReportsCollector;
use crate::storage::ObserverStorage;
use crate::storage::StorageProvider;
use crate::time::Timestamp;
use crate::Result;

/// Writes the working sets back and records what was added and removed
pub struct CommitTransactionMiddleware {
    storages: StorageProvider,
    reports: Arc<dyn ReportsCollector>,
}

/// Outcome of committing one working set
#[derive(Debug)]
struct Committed<V> {
    /// Records that did not exist before the commit
    added: Vec<V>,
    /// Records removed by the commit as they were stored
    removed: Vec<V>,
}

impl CommitTransactionMiddleware {
    pub fn new(
        storages: StorageProvider,
        reports: Arc<dyn ReportsCollector>,
    ) -> Self {
        Self { storages, reports }
    }

    async fn commit(
        &self,
        tx: &mut TransactionContext,
    ) -> Result<()> {
        let storages = &self.storages;
        let TransactionContext {
            id,
            created,
            clients,
            peer_connections,
            inbound_tracks,
            outbound_tracks,
            sfus,
            sfu_transports,
            sfu_inbound_rtp_pads,
            sfu_outbound_rtp_pads,
            sfu_sctp_channels,
            evaluator_context,
        } = tx;
        let now = *created;
        let transaction_id = id.as_str();

        let (
            _,
            peer_connections,
            inbound_tracks,
            outbound_tracks,
            sfus,
            sfu_transports,
            sfu_inbound_rtp_pads,
            sfu_outbound_rtp_pads,
            sfu_sctp_channels,
        ) = futures::try_join!(
            commit_working_set(&storages.client_storage, clients, "client", transaction_id),
            commit_working_set(
                &storages.peer_connection_storage,
                peer_connections,
                "peer_connection",
                transaction_id
            ),
            commit_working_set(
                &storages.inbound_track_storage,
                inbound_tracks,
                "inbound_track",
                transaction_id
            ),
            commit_working_set(
                &storages.outbound_track_storage,
                outbound_tracks,
                "outbound_track",
                transaction_id
            ),
            commit_working_set(&storages.sfu_storage, sfus, "sfu", transaction_id),
            commit_working_set(
                &storages.sfu_transport_storage,
                sfu_transports,
                "sfu_transport",
                transaction_id
            ),
            commit_working_set(
                &storages.sfu_inbound_rtp_pad_storage,
                sfu_inbound_rtp_pads,
                "sfu_inbound_rtp_pad",
                transaction_id
            ),
            commit_working_set(
                &storages.sfu_outbound_rtp_pad_storage,
                sfu_outbound_rtp_pads,
                "sfu_outbound_rtp_pad",
                transaction_id
            ),
            commit_working_set(
                &storages.sfu_sctp_channel_storage,
                sfu_sctp_channels,
                "sfu_sctp_channel",
                transaction_id
            ),
        )?;

        for pc in peer_connections.added {
            self.reports.add_report(Report::CallEvent(
                CallEventReport::peer_connection_opened(&pc, pc.opened),
            ));
            evaluator_context
                .opened_peer_connection_ids
                .push(pc.peer_connection_id);
        }
        for pc in peer_connections.removed {
            self.reports.add_report(Report::CallEvent(
                CallEventReport::peer_connection_closed(&pc, now),
            ));
            evaluator_context.closed_peer_connections.push(removed(pc, now));
        }
        for track in inbound_tracks.added {
            self.reports.add_report(Report::CallEvent(CallEventReport::inbound_track_added(
                &track,
                track.added,
            )));
            evaluator_context.added_inbound_track_ids.push(track.track_id);
        }
        for track in inbound_tracks.removed {
            self.reports.add_report(Report::CallEvent(
                CallEventReport::inbound_track_removed(&track, now),
            ));
            evaluator_context.removed_inbound_tracks.push(removed(track, now));
        }
        for track in outbound_tracks.added {
            self.reports.add_report(Report::CallEvent(CallEventReport::outbound_track_added(
                &track,
                track.added,
            )));
            evaluator_context.added_outbound_track_ids.push(track.track_id);
        }
        for track in outbound_tracks.removed {
            self.reports.add_report(Report::CallEvent(
                CallEventReport::outbound_track_removed(&track, now),
            ));
            evaluator_context.removed_outbound_tracks.push(removed(track, now));
        }

        evaluator_context
            .joined_sfu_ids
            .extend(sfus.added.into_iter().map(|sfu| sfu.sfu_id));
        evaluator_context
            .detached_sfus
            .extend(sfus.removed.into_iter().map(|sfu| removed(sfu, now)));
        evaluator_context.opened_sfu_transport_ids.extend(
            sfu_transports
                .added
                .into_iter()
                .map(|transport| transport.transport_id),
        );
        evaluator_context.closed_sfu_transports.extend(
            sfu_transports
                .removed
                .into_iter()
                .map(|transport| removed(transport, now)),
        );
        evaluator_context.added_sfu_inbound_rtp_pad_ids.extend(
            sfu_inbound_rtp_pads
                .added
                .into_iter()
                .map(|pad| pad.rtp_pad_id),
        );
        evaluator_context.removed_sfu_inbound_rtp_pads.extend(
            sfu_inbound_rtp_pads
                .removed
                .into_iter()
                .map(|pad| removed(pad, now)),
        );
        evaluator_context.added_sfu_outbound_rtp_pad_ids.extend(
            sfu_outbound_rtp_pads
                .added
                .into_iter()
                .map(|pad| pad.rtp_pad_id),
        );
        evaluator_context.removed_sfu_outbound_rtp_pads.extend(
            sfu_outbound_rtp_pads
                .removed
                .into_iter()
                .map(|pad| removed(pad, now)),
        );
        evaluator_context.opened_sfu_sctp_channel_ids.extend(
            sfu_sctp_channels
                .added
                .into_iter()
                .map(|channel| channel.sfu_sctp_channel_id),
        );
        evaluator_context.closed_sfu_sctp_channels.extend(
            sfu_sctp_channels
                .removed
                .into_iter()
                .map(|channel| removed(channel, now)),
        );

        debug!(%transaction_id, "transaction committed");
        Ok(())
    }
}

#[async_trait]
impl Middleware<TransactionContext> for CommitTransactionMiddleware {
    fn name(&self) -> &'static str {
        "commit-transaction"
    }

    async fn handle(
        &self,
        tx: &mut TransactionContext,
        next: Next<'_, TransactionContext>,
    ) -> Result<()> {
        self.commit(tx).await?;
        next.run(tx).await
    }
}

fn removed<V>(
    entry: V,
    removed: Timestamp,
) -> Removed<V> {
    Removed { entry, removed }
}

/// Applies one working set. A record both updated and deleted is deleted.
async fn commit_working_set<V>(
    storage: &Arc<dyn ObserverStorage<V>>,
    set: &mut WorkingSet<V>,
    entity: &'static str,
    transaction_id: &str,
) -> Result<Committed<V>>
where
    V: Entity,
{
    for id in &set.deleted {
        if set.updated.remove(id).is_some() {
            warn!(
                "{} {} is both updated and deleted in transaction {}, deleting it",
                entity, id, transaction_id
            );
        }
    }
    let updated = std::mem::take(&mut set.updated);
    let deleted: Vec<String> = set.deleted.iter().cloned().collect();
    let candidates: Vec<V> = updated.values().cloned().collect();

    let (previous, removed) = futures::try_join!(
        async move {
            if updated.is_empty() {
                return Ok(HashMap::new());
            }
            storage.set_all(updated).await
        },
        async move {
            if deleted.is_empty() {
                return Ok(HashMap::new());
            }
            storage.remove_all(deleted).await
        },
    )?;

    let mut added: Vec<V> = candidates
        .into_iter()
        .filter(|record| !previous.contains_key(record.id()))
        .collect();
    added.sort_by(|a, b| a.id().cmp(b.id()));
    let mut removed: Vec<V> = removed.into_values().collect();
    removed.sort_by(|a, b| a.id().cmp(b.id()));

    record_entities(entity, added.len(), removed.len());
    Ok(Committed { added, removed })
}
