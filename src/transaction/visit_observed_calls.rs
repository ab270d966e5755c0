use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::TransactionContext;
use super::WorkingSet;
use crate::middleware::Middleware;
use crate::middleware::Next;
use crate::models::push_unique;
use crate::models::Client;
use crate::models::InboundTrack;
use crate::models::OutboundTrack;
use crate::models::PeerConnection;
use crate::reports::CallEventReport;
use crate::reports::CallMetaPayload;
use crate::reports::CallMetaReport;
use crate::reports::ClientExtensionReport;
use crate::reports::ClientReportHeader;
use crate::reports::ClientStatsReport;
use crate::reports::Report;
use crate::reports::ReportsCollector;
use crate::reports::TrackReport;
use crate::samples::ClientSample;
use crate::snapshot::ObservedCalls;
use crate::snapshot::ObservedClient;
use crate::snapshot::ObservedInboundTrack;
use crate::snapshot::ObservedOutboundTrack;
use crate::snapshot::ObservedPeerConnection;
use crate::time::Timestamp;
use crate::Result;

/// Header of a report about any record carrying the client identity fields
macro_rules! client_report_header {
    ($record:expr, $timestamp:expr) => {
        ClientReportHeader {
            service_id: $record.service_id.clone(),
            media_unit_id: $record.media_unit_id.clone(),
            room_id: $record.room_id.clone(),
            call_id: $record.call_id.clone(),
            client_id: $record.client_id.clone(),
            user_id: $record.user_id.clone(),
            marker: $record.marker.clone(),
            timestamp: $timestamp,
        }
    };
}

/// Reconciles the client side of the snapshot against the working sets.
///
/// Walks call, client, peer connection and tracks. Clients must have joined through the
/// call processor; peer connections and tracks are created on first sight. Every raw sample
/// is reported once.
pub struct VisitObservedCallsMiddleware {
    reports: Arc<dyn ReportsCollector>,
    fetch_samples: bool,
}

impl VisitObservedCallsMiddleware {
    pub fn new(
        reports: Arc<dyn ReportsCollector>,
        fetch_samples: bool,
    ) -> Self {
        Self {
            reports,
            fetch_samples,
        }
    }

    fn visit(
        &self,
        tx: &mut TransactionContext,
    ) {
        let observed = tx.observed_calls();
        let now = tx.created;

        for call in observed.calls() {
            for observed_client in observed.clients_of(call) {
                let Some(client) = tx.clients.get_mut(&observed_client.client_id) else {
                    warn!(
                        "Client {} of call {} has not joined, its samples are skipped",
                        observed_client.client_id, call.call_id
                    );
                    continue;
                };
                if client.call_id != call.call_id {
                    warn!(
                        "Client {} is joined to call {} but reported samples for call {}, skipped",
                        client.client_id, client.call_id, call.call_id
                    );
                    continue;
                }

                for sample in observed_client.samples() {
                    self.report_client_sample(client, sample);
                }
                tx.clients.visit(&observed_client.client_id, now);

                self.visit_peer_connections(tx, &observed, observed_client, now);
            }
        }
    }

    fn report_client_sample(
        &self,
        client: &mut Client,
        sample: &ClientSample,
    ) {
        let timestamp = sample.timestamp;
        if let Some(os) = &sample.os {
            if client.operation_system.as_ref() != Some(os) {
                client.operation_system = Some(os.clone());
                self.report_meta(client, timestamp, CallMetaPayload::OperationSystem(os.clone()));
            }
        }
        if let Some(browser) = &sample.browser {
            if client.browser.as_ref() != Some(browser) {
                client.browser = Some(browser.clone());
                self.report_meta(client, timestamp, CallMetaPayload::Browser(browser.clone()));
            }
        }
        if let Some(engine) = &sample.engine {
            if client.engine.as_ref() != Some(engine) {
                client.engine = Some(engine.clone());
                self.report_meta(client, timestamp, CallMetaPayload::Engine(engine.clone()));
            }
        }
        if let Some(platform) = &sample.platform {
            if client.platform.as_ref() != Some(platform) {
                client.platform = Some(platform.clone());
                self.report_meta(client, timestamp, CallMetaPayload::Platform(platform.clone()));
            }
        }

        for extension in &sample.extension_stats {
            self.reports
                .add_report(Report::ClientExtension(ClientExtensionReport {
                    header: client_report_header!(client, timestamp),
                    extension: extension.clone(),
                }));
        }
        for event in &sample.custom_call_events {
            self.reports.add_report(Report::CallEvent(CallEventReport::custom(
                client, event, timestamp,
            )));
        }
    }

    fn report_meta(
        &self,
        client: &Client,
        timestamp: Timestamp,
        payload: CallMetaPayload,
    ) {
        self.reports.add_report(Report::CallMeta(CallMetaReport {
            header: client_report_header!(client, timestamp),
            payload,
        }));
    }

    fn visit_peer_connections(
        &self,
        tx: &mut TransactionContext,
        observed: &ObservedCalls,
        observed_client: &ObservedClient,
        now: Timestamp,
    ) {
        for observed_pc in observed.peer_connections_of(observed_client) {
            let pc_id = observed_pc.peer_connection_id.as_str();
            if !tx.peer_connections.updated.contains_key(pc_id) {
                let Some(client) = tx.clients.get_mut(&observed_client.client_id) else {
                    continue;
                };
                if !push_unique(&mut client.peer_connection_ids, pc_id) {
                    warn!(
                        "Peer connection {} is already listed on client {}",
                        pc_id, client.client_id
                    );
                }
                debug!(peer_connection_id = %pc_id, "new peer connection");
                tx.peer_connections
                    .updated
                    .insert(pc_id.to_string(), new_peer_connection(observed_pc));
            }
            let Some(pc) = tx.peer_connections.get_mut(pc_id) else {
                continue;
            };
            if pc.client_id != observed_client.client_id {
                warn!(
                    "Peer connection {} belongs to client {}, not {}, skipped",
                    pc_id, pc.client_id, observed_client.client_id
                );
                continue;
            }
            self.report_peer_connection(pc, observed_pc);
            tx.peer_connections.visit(pc_id, now);

            for observed_track in observed.inbound_tracks_of(observed_pc) {
                self.visit_inbound_track(tx, observed_track, now);
            }
            for observed_track in observed.outbound_tracks_of(observed_pc) {
                self.visit_outbound_track(tx, observed_track, now);
            }
        }
    }

    fn report_peer_connection(
        &self,
        pc: &mut PeerConnection,
        observed_pc: &ObservedPeerConnection,
    ) {
        if observed_pc.label.is_some() {
            pc.label = observed_pc.label.clone();
        }
        for stamped in observed_pc.transport_samples() {
            self.reports
                .add_report(Report::PeerConnectionTransport(ClientStatsReport {
                    header: client_report_header!(pc, stamped.timestamp),
                    peer_connection_id: pc.peer_connection_id.clone(),
                    label: pc.label.clone(),
                    stats: stamped.sample.clone(),
                }));
            if self.fetch_samples {
                let sample = &stamped.sample;
                match pc
                    .transports
                    .iter_mut()
                    .find(|t| t.transport_id == sample.transport_id)
                {
                    Some(existing) => *existing = sample.clone(),
                    None => pc.transports.push(sample.clone()),
                }
            }
        }
        for stamped in observed_pc.ice_candidate_pair_samples() {
            self.reports.add_report(Report::IceCandidatePair(ClientStatsReport {
                header: client_report_header!(pc, stamped.timestamp),
                peer_connection_id: pc.peer_connection_id.clone(),
                label: pc.label.clone(),
                stats: stamped.sample.clone(),
            }));
            if self.fetch_samples {
                let sample = &stamped.sample;
                match pc
                    .ice_candidate_pairs
                    .iter_mut()
                    .find(|p| p.candidate_pair_id == sample.candidate_pair_id)
                {
                    Some(existing) => *existing = sample.clone(),
                    None => pc.ice_candidate_pairs.push(sample.clone()),
                }
            }
        }
    }

    fn visit_inbound_track(
        &self,
        tx: &mut TransactionContext,
        observed_track: &ObservedInboundTrack,
        now: Timestamp,
    ) {
        let track_id = observed_track.track_id.as_str();
        if !attach_track(
            &mut tx.peer_connections,
            &tx.inbound_tracks,
            observed_track.peer_connection_id.as_str(),
            track_id,
            |pc| &mut pc.inbound_track_ids,
        ) {
            return;
        }
        let track = tx
            .inbound_tracks
            .updated
            .entry(track_id.to_string())
            .or_insert_with(|| new_inbound_track(observed_track));
        if track.kind != observed_track.kind {
            debug!(
                track_id,
                stored = track.kind.as_str(),
                observed = observed_track.kind.as_str(),
                "track kind differs from the stored one, keeping the stored kind"
            );
        }
        if observed_track.sfu_stream_id.is_some() {
            track.sfu_stream_id = observed_track.sfu_stream_id.clone();
        }
        if observed_track.sfu_sink_id.is_some() {
            track.sfu_sink_id = observed_track.sfu_sink_id.clone();
        }

        for stamped in observed_track.samples() {
            let sample = &stamped.sample;
            if !track.ssrcs.contains(&sample.ssrc) {
                track.ssrcs.push(sample.ssrc);
            }
            self.reports.add_report(Report::inbound_track(
                track.kind,
                TrackReport {
                    header: client_report_header!(track, stamped.timestamp),
                    peer_connection_id: track.peer_connection_id.clone(),
                    track_id: track.track_id.clone(),
                    stats: sample.clone(),
                },
            ));
            if self.fetch_samples {
                match track.stats.iter_mut().find(|s| s.ssrc == sample.ssrc) {
                    Some(existing) => *existing = sample.clone(),
                    None => track.stats.push(sample.clone()),
                }
            }
        }
        tx.inbound_tracks.visit(track_id, now);
    }

    fn visit_outbound_track(
        &self,
        tx: &mut TransactionContext,
        observed_track: &ObservedOutboundTrack,
        now: Timestamp,
    ) {
        let track_id = observed_track.track_id.as_str();
        if !attach_track(
            &mut tx.peer_connections,
            &tx.outbound_tracks,
            observed_track.peer_connection_id.as_str(),
            track_id,
            |pc| &mut pc.outbound_track_ids,
        ) {
            return;
        }
        let track = tx
            .outbound_tracks
            .updated
            .entry(track_id.to_string())
            .or_insert_with(|| new_outbound_track(observed_track));
        if track.kind != observed_track.kind {
            debug!(
                track_id,
                stored = track.kind.as_str(),
                observed = observed_track.kind.as_str(),
                "track kind differs from the stored one, keeping the stored kind"
            );
        }
        if observed_track.sfu_stream_id.is_some() {
            track.sfu_stream_id = observed_track.sfu_stream_id.clone();
        }

        for stamped in observed_track.samples() {
            let sample = &stamped.sample;
            if !track.ssrcs.contains(&sample.ssrc) {
                track.ssrcs.push(sample.ssrc);
            }
            self.reports.add_report(Report::outbound_track(
                track.kind,
                TrackReport {
                    header: client_report_header!(track, stamped.timestamp),
                    peer_connection_id: track.peer_connection_id.clone(),
                    track_id: track.track_id.clone(),
                    stats: sample.clone(),
                },
            ));
            if self.fetch_samples {
                match track.stats.iter_mut().find(|s| s.ssrc == sample.ssrc) {
                    Some(existing) => *existing = sample.clone(),
                    None => track.stats.push(sample.clone()),
                }
            }
        }
        tx.outbound_tracks.visit(track_id, now);
    }
}

#[async_trait]
impl Middleware<TransactionContext> for VisitObservedCallsMiddleware {
    fn name(&self) -> &'static str {
        "visit-observed-calls"
    }

    async fn handle(
        &self,
        tx: &mut TransactionContext,
        next: Next<'_, TransactionContext>,
    ) -> Result<()> {
        trace!(transaction_id = %tx.id, "visit observed calls");
        self.visit(tx);
        next.run(tx).await
    }
}

/// Lists a track on its peer connection. Returns `false` when the track can not be
/// reconciled: its peer connection is not part of the transaction or the stored track
/// belongs to another one.
fn attach_track<T, F>(
    peer_connections: &mut WorkingSet<PeerConnection>,
    tracks: &WorkingSet<T>,
    peer_connection_id: &str,
    track_id: &str,
    track_ids: F,
) -> bool
where
    T: crate::models::Entity,
    F: FnOnce(&mut PeerConnection) -> &mut Vec<String>,
{
    if let Some(track) = tracks.get(track_id) {
        if track.parent_id() != Some(peer_connection_id) {
            warn!(
                "Track {} belongs to peer connection {}, not {}, skipped",
                track_id,
                track.parent_id().unwrap_or_default(),
                peer_connection_id
            );
            return false;
        }
        return true;
    }
    let Some(pc) = peer_connections.get_mut(peer_connection_id) else {
        warn!(
            "Peer connection {} of track {} is not reconciled, track skipped",
            peer_connection_id, track_id
        );
        return false;
    };
    if !push_unique(track_ids(pc), track_id) {
        warn!(
            "Track {} is already listed on peer connection {}",
            track_id, peer_connection_id
        );
    }
    true
}

fn new_peer_connection(observed: &ObservedPeerConnection) -> PeerConnection {
    PeerConnection {
        service_id: observed.service_id.clone(),
        media_unit_id: observed.media_unit_id.clone(),
        room_id: observed.room_id.clone(),
        call_id: observed.call_id.clone(),
        client_id: observed.client_id.clone(),
        peer_connection_id: observed.peer_connection_id.clone(),
        label: observed.label.clone(),
        user_id: observed.user_id.clone(),
        marker: observed.marker.clone(),
        opened: observed.client_min_timestamp,
        ..Default::default()
    }
}

fn new_inbound_track(observed: &ObservedInboundTrack) -> InboundTrack {
    InboundTrack {
        service_id: observed.service_id.clone(),
        media_unit_id: observed.media_unit_id.clone(),
        room_id: observed.room_id.clone(),
        call_id: observed.call_id.clone(),
        client_id: observed.client_id.clone(),
        user_id: observed.user_id.clone(),
        marker: observed.marker.clone(),
        peer_connection_id: observed.peer_connection_id.clone(),
        track_id: observed.track_id.clone(),
        kind: observed.kind,
        ssrcs: Vec::new(),
        sfu_stream_id: observed.sfu_stream_id.clone(),
        sfu_sink_id: observed.sfu_sink_id.clone(),
        added: observed.min_timestamp,
        touched: None,
        stats: Vec::new(),
    }
}

fn new_outbound_track(observed: &ObservedOutboundTrack) -> OutboundTrack {
    OutboundTrack {
        service_id: observed.service_id.clone(),
        media_unit_id: observed.media_unit_id.clone(),
        room_id: observed.room_id.clone(),
        call_id: observed.call_id.clone(),
        client_id: observed.client_id.clone(),
        user_id: observed.user_id.clone(),
        marker: observed.marker.clone(),
        peer_connection_id: observed.peer_connection_id.clone(),
        track_id: observed.track_id.clone(),
        kind: observed.kind,
        ssrcs: Vec::new(),
        sfu_stream_id: observed.sfu_stream_id.clone(),
        added: observed.min_timestamp,
        touched: None,
        stats: Vec::new(),
    }
}
