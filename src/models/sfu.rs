use serde::Deserialize;
use serde::Serialize;

use super::impl_entity;
use super::Entity;
use crate::time::Timestamp;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sfu {
    pub service_id: String,
    pub media_unit_id: String,
    pub sfu_id: String,
    pub joined: Timestamp,
    pub time_zone_id: Option<String>,
    pub marker: Option<String>,
    pub touched: Option<Timestamp>,
    pub sfu_transport_ids: Vec<String>,
}

impl Entity for Sfu {
    fn id(&self) -> &str {
        &self.sfu_id
    }

    fn parent_id(&self) -> Option<&str> {
        None
    }

    fn touched(&self) -> Option<Timestamp> {
        self.touched
    }

    fn touch(
        &mut self,
        now: Timestamp,
    ) {
        super::advance_touched(&mut self.touched, now);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SfuTransport {
    pub service_id: String,
    pub media_unit_id: String,
    pub sfu_id: String,
    pub transport_id: String,
    pub internal: bool,
    pub opened: Timestamp,
    pub marker: Option<String>,
    pub touched: Option<Timestamp>,
    pub inbound_rtp_pad_ids: Vec<String>,
    pub outbound_rtp_pad_ids: Vec<String>,
    pub sctp_channel_ids: Vec<String>,
}
impl_entity!(SfuTransport, transport_id, sfu_id);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SfuInboundRtpPad {
    pub service_id: String,
    pub media_unit_id: String,
    pub sfu_id: String,
    pub sfu_transport_id: String,
    pub rtp_pad_id: String,
    pub stream_id: Option<String>,
    pub ssrc: Option<u32>,
    pub internal: bool,
    pub added: Timestamp,
    pub touched: Option<Timestamp>,
}
impl_entity!(SfuInboundRtpPad, rtp_pad_id, sfu_transport_id);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SfuOutboundRtpPad {
    pub service_id: String,
    pub media_unit_id: String,
    pub sfu_id: String,
    pub sfu_transport_id: String,
    pub rtp_pad_id: String,
    pub stream_id: Option<String>,
    pub sink_id: Option<String>,
    pub ssrc: Option<u32>,
    pub internal: bool,
    pub added: Timestamp,
    pub touched: Option<Timestamp>,
}
impl_entity!(SfuOutboundRtpPad, rtp_pad_id, sfu_transport_id);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SfuSctpChannel {
    pub service_id: String,
    pub media_unit_id: String,
    pub sfu_id: String,
    pub sfu_transport_id: String,
    pub sfu_sctp_channel_id: String,
    pub stream_id: Option<String>,
    pub label: Option<String>,
    pub opened: Timestamp,
    pub touched: Option<Timestamp>,
}
impl_entity!(SfuSctpChannel, sfu_sctp_channel_id, sfu_transport_id);
