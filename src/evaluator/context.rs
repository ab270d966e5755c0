use std::collections::HashSet;
use std::sync::Arc;

use crate::models::Call;
use crate::models::Client;
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
use crate::time::Timestamp;

/// A record removed from storage during a tick, stamped with the removal time
#[derive(Debug, Clone, PartialEq)]
pub struct Removed<T> {
    pub entry: T,
    pub removed: Timestamp,
}

/// Append-only record of what one tick changed.
///
/// Stages only push onto it; once the tick completes it is handed to user middlewares and
/// tick subscribers as-is.
#[derive(Debug, Clone, Default)]
pub struct EvaluatorContext {
    pub tick_id: u64,
    pub created: Timestamp,
    pub observed_calls: Arc<ObservedCalls>,
    pub observed_sfus: Arc<ObservedSfus>,

    pub joined_client_ids: Vec<String>,
    pub detached_clients: Vec<Removed<Client>>,
    pub started_call_ids: Vec<String>,
    pub ended_calls: Vec<Removed<Call>>,

    pub opened_peer_connection_ids: Vec<String>,
    pub closed_peer_connections: Vec<Removed<PeerConnection>>,
    pub added_inbound_track_ids: Vec<String>,
    pub removed_inbound_tracks: Vec<Removed<InboundTrack>>,
    pub added_outbound_track_ids: Vec<String>,
    pub removed_outbound_tracks: Vec<Removed<OutboundTrack>>,

    pub joined_sfu_ids: Vec<String>,
    pub detached_sfus: Vec<Removed<Sfu>>,
    pub opened_sfu_transport_ids: Vec<String>,
    pub closed_sfu_transports: Vec<Removed<SfuTransport>>,
    pub added_sfu_inbound_rtp_pad_ids: Vec<String>,
    pub removed_sfu_inbound_rtp_pads: Vec<Removed<SfuInboundRtpPad>>,
    pub added_sfu_outbound_rtp_pad_ids: Vec<String>,
    pub removed_sfu_outbound_rtp_pads: Vec<Removed<SfuOutboundRtpPad>>,
    pub opened_sfu_sctp_channel_ids: Vec<String>,
    pub closed_sfu_sctp_channels: Vec<Removed<SfuSctpChannel>>,
}

impl EvaluatorContext {
    pub fn new(
        tick_id: u64,
        created: Timestamp,
        observed_calls: Arc<ObservedCalls>,
        observed_sfus: Arc<ObservedSfus>,
    ) -> Self {
        Self {
            tick_id,
            created,
            observed_calls,
            observed_sfus,
            ..Default::default()
        }
    }

    pub fn detached_client_ids(&self) -> HashSet<&str> {
        self.detached_clients
            .iter()
            .map(|c| c.entry.client_id.as_str())
            .collect()
    }

    pub fn ended_call_ids(&self) -> HashSet<&str> {
        self.ended_calls
            .iter()
            .map(|c| c.entry.call_id.as_str())
            .collect()
    }

    pub fn closed_peer_connection_ids(&self) -> HashSet<&str> {
        self.closed_peer_connections
            .iter()
            .map(|pc| pc.entry.peer_connection_id.as_str())
            .collect()
    }

    /// True when the tick changed nothing
    pub fn is_unchanged(&self) -> bool {
        self.joined_client_ids.is_empty()
            && self.detached_clients.is_empty()
            && self.started_call_ids.is_empty()
            && self.ended_calls.is_empty()
            && self.opened_peer_connection_ids.is_empty()
            && self.closed_peer_connections.is_empty()
            && self.added_inbound_track_ids.is_empty()
            && self.removed_inbound_tracks.is_empty()
            && self.added_outbound_track_ids.is_empty()
            && self.removed_outbound_tracks.is_empty()
            && self.joined_sfu_ids.is_empty()
            && self.detached_sfus.is_empty()
            && self.opened_sfu_transport_ids.is_empty()
            && self.closed_sfu_transports.is_empty()
            && self.added_sfu_inbound_rtp_pad_ids.is_empty()
            && self.removed_sfu_inbound_rtp_pads.is_empty()
            && self.added_sfu_outbound_rtp_pad_ids.is_empty()
            && self.removed_sfu_outbound_rtp_pads.is_empty()
            && self.opened_sfu_sctp_channel_ids.is_empty()
            && self.closed_sfu_sctp_channels.is_empty()
    }
}
