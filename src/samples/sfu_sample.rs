use serde::Deserialize;
use serde::Serialize;

use super::ExtensionStat;
use crate::time::Timestamp;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomSfuEvent {
    pub name: String,
    pub value: Option<String>,
    pub message: Option<String>,
    pub transport_id: Option<String>,
    pub sfu_stream_id: Option<String>,
    pub sfu_sink_id: Option<String>,
    pub attachments: Option<String>,
    pub timestamp: Option<Timestamp>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SfuTransportSample {
    pub transport_id: Option<String>,
    #[serde(default)]
    pub internal: bool,
    pub dtls_state: Option<String>,
    pub ice_state: Option<String>,
    pub sctp_state: Option<String>,
    pub rtp_packets_received: Option<u64>,
    pub rtp_packets_sent: Option<u64>,
    pub rtp_bytes_received: Option<u64>,
    pub rtp_bytes_sent: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SfuInboundRtpPadSample {
    pub transport_id: Option<String>,
    pub pad_id: Option<String>,
    pub stream_id: Option<String>,
    pub ssrc: Option<u32>,
    #[serde(default)]
    pub internal: bool,
    pub packets_received: Option<u64>,
    pub packets_lost: Option<i64>,
    pub bytes_received: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SfuOutboundRtpPadSample {
    pub transport_id: Option<String>,
    pub pad_id: Option<String>,
    pub stream_id: Option<String>,
    pub sink_id: Option<String>,
    pub ssrc: Option<u32>,
    #[serde(default)]
    pub internal: bool,
    pub packets_sent: Option<u64>,
    pub bytes_sent: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SfuSctpChannelSample {
    pub transport_id: Option<String>,
    pub channel_id: Option<String>,
    pub stream_id: Option<String>,
    pub label: Option<String>,
    pub messages_sent: Option<u64>,
    pub messages_received: Option<u64>,
    pub bytes_sent: Option<u64>,
    pub bytes_received: Option<u64>,
}

/// One periodic measurement of a media server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SfuSample {
    pub timestamp: Timestamp,
    pub time_zone_offset_in_hours: Option<i32>,
    pub marker: Option<String>,
    #[serde(default)]
    pub transports: Vec<SfuTransportSample>,
    #[serde(default)]
    pub inbound_rtp_pads: Vec<SfuInboundRtpPadSample>,
    #[serde(default)]
    pub outbound_rtp_pads: Vec<SfuOutboundRtpPadSample>,
    #[serde(default)]
    pub sctp_channels: Vec<SfuSctpChannelSample>,
    #[serde(default)]
    pub custom_sfu_events: Vec<CustomSfuEvent>,
    #[serde(default)]
    pub extension_stats: Vec<ExtensionStat>,
}
