use std::sync::Arc;

use tracing::debug;

use crate::evaluator::EvaluatorContext;
use crate::evaluator::Removed;
use crate::reports::CallEventReport;
use crate::reports::Report;
use crate::reports::ReportsCollector;
use crate::storage::StorageProvider;
use crate::time::Timestamp;
use crate::Result;

/// Removes peer connections together with every track they own.
///
/// Records are removed from storage directly; the removals are appended to `ctx` in the
/// order they are reported.
pub(crate) async fn close_peer_connections(
    storages: &StorageProvider,
    reports: &Arc<dyn ReportsCollector>,
    peer_connection_ids: &[String],
    closed: Timestamp,
    ctx: &mut EvaluatorContext,
) -> Result<()> {
    if peer_connection_ids.is_empty() {
        return Ok(());
    }
    let mut removed = storages
        .peer_connection_storage
        .remove_all(peer_connection_ids.to_vec())
        .await?;

    let mut inbound_track_ids = Vec::new();
    let mut outbound_track_ids = Vec::new();
    for pc in removed.values() {
        inbound_track_ids.extend(pc.inbound_track_ids.iter().cloned());
        outbound_track_ids.extend(pc.outbound_track_ids.iter().cloned());
    }

    let (mut inbound_tracks, mut outbound_tracks) = futures::try_join!(
        storages.inbound_track_storage.remove_all(inbound_track_ids.clone()),
        storages
            .outbound_track_storage
            .remove_all(outbound_track_ids.clone()),
    )?;

    for peer_connection_id in peer_connection_ids {
        let Some(pc) = removed.remove(peer_connection_id) else {
            debug!(%peer_connection_id, "peer connection already removed");
            continue;
        };
        reports.add_report(Report::CallEvent(CallEventReport::peer_connection_closed(
            &pc, closed,
        )));
        ctx.closed_peer_connections.push(Removed {
            entry: pc,
            removed: closed,
        });
    }
    for track_id in &inbound_track_ids {
        if let Some(track) = inbound_tracks.remove(track_id) {
            reports.add_report(Report::CallEvent(CallEventReport::inbound_track_removed(
                &track, closed,
            )));
            ctx.removed_inbound_tracks.push(Removed {
                entry: track,
                removed: closed,
            });
        }
    }
    for track_id in &outbound_track_ids {
        if let Some(track) = outbound_tracks.remove(track_id) {
            reports.add_report(Report::CallEvent(CallEventReport::outbound_track_removed(
                &track, closed,
            )));
            ctx.removed_outbound_tracks.push(Removed {
                entry: track,
                removed: closed,
            });
        }
    }
    Ok(())
}
