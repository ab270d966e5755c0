use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use crate::time::Timestamp;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSystem {
    pub name: Option<String>,
    pub version: Option<String>,
    pub version_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Browser {
    pub name: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engine {
    pub name: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub vendor: Option<String>,
    pub model: Option<String>,
}

/// Application defined stats attached to a client or SFU sample
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtensionStat {
    #[serde(rename = "type")]
    pub extension_type: String,
    pub payload: Option<String>,
}

/// Application defined event reported by a client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomCallEvent {
    pub name: String,
    pub value: Option<String>,
    pub message: Option<String>,
    pub peer_connection_id: Option<String>,
    pub media_track_id: Option<String>,
    pub attachments: Option<String>,
    pub timestamp: Option<Timestamp>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerConnectionTransportSample {
    pub peer_connection_id: Option<String>,
    pub label: Option<String>,
    pub transport_id: Option<String>,
    pub data_channels_opened: Option<u32>,
    pub data_channels_closed: Option<u32>,
    pub packets_sent: Option<u64>,
    pub packets_received: Option<u64>,
    pub bytes_sent: Option<u64>,
    pub bytes_received: Option<u64>,
    pub ice_state: Option<String>,
    pub dtls_state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IceCandidatePairSample {
    pub peer_connection_id: Option<String>,
    pub candidate_pair_id: Option<String>,
    pub local_candidate_id: Option<String>,
    pub remote_candidate_id: Option<String>,
    pub state: Option<String>,
    pub nominated: Option<bool>,
    pub current_round_trip_time: Option<f64>,
    pub available_outgoing_bitrate: Option<f64>,
}

/// Stats of one received media stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboundTrackSample {
    pub track_id: Option<String>,
    pub peer_connection_id: Option<String>,
    pub sfu_stream_id: Option<String>,
    pub sfu_sink_id: Option<String>,
    pub ssrc: u32,
    pub packets_received: Option<u64>,
    pub packets_lost: Option<i64>,
    pub bytes_received: Option<u64>,
    pub jitter: Option<f64>,
    pub frames_decoded: Option<u64>,
}

/// Stats of one sent media stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutboundTrackSample {
    pub track_id: Option<String>,
    pub peer_connection_id: Option<String>,
    pub sfu_stream_id: Option<String>,
    pub ssrc: u32,
    pub packets_sent: Option<u64>,
    pub bytes_sent: Option<u64>,
    pub retransmitted_packets_sent: Option<u64>,
    pub target_bitrate: Option<f64>,
    pub frames_encoded: Option<u64>,
}

/// One periodic measurement of a client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientSample {
    pub timestamp: Timestamp,
    pub time_zone_offset_in_hours: Option<i32>,
    pub marker: Option<String>,
    pub os: Option<OperationSystem>,
    pub browser: Option<Browser>,
    pub engine: Option<Engine>,
    pub platform: Option<Platform>,
    #[serde(default)]
    pub extension_stats: Vec<ExtensionStat>,
    #[serde(default)]
    pub custom_call_events: Vec<CustomCallEvent>,
    #[serde(default)]
    pub pc_transports: Vec<PeerConnectionTransportSample>,
    #[serde(default)]
    pub ice_candidate_pairs: Vec<IceCandidatePairSample>,
    #[serde(default)]
    pub inbound_audio_tracks: Vec<InboundTrackSample>,
    #[serde(default)]
    pub inbound_video_tracks: Vec<InboundTrackSample>,
    #[serde(default)]
    pub outbound_audio_tracks: Vec<OutboundTrackSample>,
    #[serde(default)]
    pub outbound_video_tracks: Vec<OutboundTrackSample>,
    #[serde(default)]
    pub attachments: HashMap<String, String>,
}
