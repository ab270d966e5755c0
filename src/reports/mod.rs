//! Reports produced by reconciliation.
//!
//! The pipeline only produces reports: every visited sample yields one report and every
//! lifecycle change yields a call or SFU event. Sinks are fire-and-forget.
mod call_events;
mod collectors;
mod sfu_events;

pub use call_events::*;
pub use collectors::*;
pub use sfu_events::*;


#[cfg(test)]
use mockall::automock;
use serde::Serialize;

use crate::models::MediaKind;
use crate::samples::Browser;
use crate::samples::Engine;
use crate::samples::ExtensionStat;
use crate::samples::IceCandidatePairSample;
use crate::samples::InboundTrackSample;
use crate::samples::OperationSystem;
use crate::samples::OutboundTrackSample;
use crate::samples::PeerConnectionTransportSample;
use crate::samples::Platform;
use crate::samples::SfuInboundRtpPadSample;
use crate::samples::SfuOutboundRtpPadSample;
use crate::samples::SfuSctpChannelSample;
use crate::samples::SfuTransportSample;
use crate::time::Timestamp;

#[cfg_attr(test, automock)]
pub trait ReportsCollector: Send + Sync + 'static {
    fn add_report(
        &self,
        report: Report,
    );
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Report {
    CallEvent(CallEventReport),
    CallMeta(CallMetaReport),
    ClientExtension(ClientExtensionReport),
    PeerConnectionTransport(ClientStatsReport<PeerConnectionTransportSample>),
    IceCandidatePair(ClientStatsReport<IceCandidatePairSample>),
    InboundAudioTrack(TrackReport<InboundTrackSample>),
    InboundVideoTrack(TrackReport<InboundTrackSample>),
    OutboundAudioTrack(TrackReport<OutboundTrackSample>),
    OutboundVideoTrack(TrackReport<OutboundTrackSample>),
    SfuEvent(SfuEventReport),
    SfuExtension(SfuExtensionReport),
    SfuTransport(SfuStatsReport<SfuTransportSample>),
    SfuInboundRtpPad(SfuStatsReport<SfuInboundRtpPadSample>),
    SfuOutboundRtpPad(SfuStatsReport<SfuOutboundRtpPadSample>),
    SfuSctpChannel(SfuStatsReport<SfuSctpChannelSample>),
}

impl Report {
    pub fn inbound_track(
        kind: MediaKind,
        report: TrackReport<InboundTrackSample>,
    ) -> Self {
        match kind {
            MediaKind::Audio => Report::InboundAudioTrack(report),
            MediaKind::Video => Report::InboundVideoTrack(report),
        }
    }

    pub fn outbound_track(
        kind: MediaKind,
        report: TrackReport<OutboundTrackSample>,
    ) -> Self {
        match kind {
            MediaKind::Audio => Report::OutboundAudioTrack(report),
            MediaKind::Video => Report::OutboundVideoTrack(report),
        }
    }
}

/// Identity of the client a report belongs to
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClientReportHeader {
    pub service_id: String,
    pub media_unit_id: String,
    pub room_id: String,
    pub call_id: String,
    pub client_id: String,
    pub user_id: Option<String>,
    pub marker: Option<String>,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CallMetaPayload {
    OperationSystem(OperationSystem),
    Browser(Browser),
    Engine(Engine),
    Platform(Platform),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallMetaReport {
    #[serde(flatten)]
    pub header: ClientReportHeader,
    pub payload: CallMetaPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientExtensionReport {
    #[serde(flatten)]
    pub header: ClientReportHeader,
    pub extension: ExtensionStat,
}

/// Raw stats of a peer connection scoped sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientStatsReport<S> {
    #[serde(flatten)]
    pub header: ClientReportHeader,
    pub peer_connection_id: String,
    pub label: Option<String>,
    pub stats: S,
}

/// Raw stats of a media track
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackReport<S> {
    #[serde(flatten)]
    pub header: ClientReportHeader,
    pub peer_connection_id: String,
    pub track_id: String,
    pub stats: S,
}

/// Identity of the SFU a report belongs to
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SfuReportHeader {
    pub service_id: String,
    pub media_unit_id: String,
    pub sfu_id: String,
    pub marker: Option<String>,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SfuExtensionReport {
    #[serde(flatten)]
    pub header: SfuReportHeader,
    pub extension: ExtensionStat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SfuStatsReport<S> {
    #[serde(flatten)]
    pub header: SfuReportHeader,
    pub transport_id: String,
    pub stats: S,
}
