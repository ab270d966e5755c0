use serde::Deserialize;
use serde::Serialize;

use super::impl_entity;
use super::Entity;
use super::MediaKind;
use crate::samples::Browser;
use crate::samples::Engine;
use crate::samples::IceCandidatePairSample;
use crate::samples::InboundTrackSample;
use crate::samples::OperationSystem;
use crate::samples::OutboundTrackSample;
use crate::samples::PeerConnectionTransportSample;
use crate::samples::Platform;
use crate::time::Timestamp;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub service_id: String,
    pub room_id: String,
    pub call_id: String,
    pub started: Timestamp,
    pub client_ids: Vec<String>,
}

impl Entity for Call {
    fn id(&self) -> &str {
        &self.call_id
    }

    fn parent_id(&self) -> Option<&str> {
        None
    }

    // Calls live as long as they have clients, never by idle time.
    fn touched(&self) -> Option<Timestamp> {
        None
    }

    fn touch(
        &mut self,
        _now: Timestamp,
    ) {
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub service_id: String,
    pub media_unit_id: String,
    pub room_id: String,
    pub call_id: String,
    pub client_id: String,
    pub user_id: Option<String>,
    pub marker: Option<String>,
    pub time_zone_id: Option<String>,
    pub joined: Timestamp,
    pub touched: Option<Timestamp>,
    pub peer_connection_ids: Vec<String>,
    pub operation_system: Option<OperationSystem>,
    pub browser: Option<Browser>,
    pub engine: Option<Engine>,
    pub platform: Option<Platform>,
}
impl_entity!(Client, client_id, call_id);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerConnection {
    pub service_id: String,
    pub media_unit_id: String,
    pub room_id: String,
    pub call_id: String,
    pub client_id: String,
    pub peer_connection_id: String,
    pub label: Option<String>,
    pub user_id: Option<String>,
    pub marker: Option<String>,
    pub opened: Timestamp,
    pub touched: Option<Timestamp>,
    pub inbound_track_ids: Vec<String>,
    pub outbound_track_ids: Vec<String>,
    pub transports: Vec<PeerConnectionTransportSample>,
    pub ice_candidate_pairs: Vec<IceCandidatePairSample>,
}
impl_entity!(PeerConnection, peer_connection_id, client_id);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundTrack {
    pub service_id: String,
    pub media_unit_id: String,
    pub room_id: String,
    pub call_id: String,
    pub client_id: String,
    pub user_id: Option<String>,
    pub marker: Option<String>,
    pub peer_connection_id: String,
    pub track_id: String,
    pub kind: MediaKind,
    pub ssrcs: Vec<u32>,
    pub sfu_stream_id: Option<String>,
    pub sfu_sink_id: Option<String>,
    pub added: Timestamp,
    pub touched: Option<Timestamp>,
    /// Latest stats per ssrc
    pub stats: Vec<InboundTrackSample>,
}
impl_entity!(InboundTrack, track_id, peer_connection_id);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundTrack {
    pub service_id: String,
    pub media_unit_id: String,
    pub room_id: String,
    pub call_id: String,
    pub client_id: String,
    pub user_id: Option<String>,
    pub marker: Option<String>,
    pub peer_connection_id: String,
    pub track_id: String,
    pub kind: MediaKind,
    pub ssrcs: Vec<u32>,
    pub sfu_stream_id: Option<String>,
    pub added: Timestamp,
    pub touched: Option<Timestamp>,
    /// Latest stats per ssrc
    pub stats: Vec<OutboundTrackSample>,
}
impl_entity!(OutboundTrack, track_id, peer_connection_id);
