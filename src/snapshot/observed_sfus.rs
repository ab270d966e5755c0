use std::collections::HashMap;

use tracing::warn;

use super::Stamped;
use super::TimestampRange;
use crate::models::push_unique;
use crate::samples::SfuInboundRtpPadSample;
use crate::samples::SfuOutboundRtpPadSample;
use crate::samples::SfuSample;
use crate::samples::SfuSctpChannelSample;
use crate::samples::SfuTransportSample;
use crate::sources::SfuSourceConfig;
use crate::time::Timestamp;

#[derive(Debug, Clone, PartialEq)]
pub struct ObservedSfu {
    pub service_id: String,
    pub media_unit_id: String,
    pub sfu_id: String,
    pub marker: Option<String>,
    pub time_zone_id: Option<String>,
    pub joined: Timestamp,
    pub min_timestamp: Timestamp,
    pub max_timestamp: Timestamp,
    samples: Vec<SfuSample>,
    transport_ids: Vec<String>,
}

impl ObservedSfu {
    /// SFU level part of each sample, in arrival order
    pub fn samples(&self) -> impl Iterator<Item = &SfuSample> + '_ {
        self.samples.iter()
    }

    pub fn transport_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.transport_ids.iter().map(String::as_str)
    }
}

/// Identity of the SFU and transport an observed pad or channel belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct SfuTransportScope {
    pub service_id: String,
    pub media_unit_id: String,
    pub sfu_id: String,
    pub marker: Option<String>,
    pub sfu_transport_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObservedSfuTransport {
    pub service_id: String,
    pub media_unit_id: String,
    pub sfu_id: String,
    pub marker: Option<String>,
    pub transport_id: String,
    pub internal: bool,
    pub min_timestamp: Timestamp,
    samples: Vec<Stamped<SfuTransportSample>>,
    inbound_rtp_pad_ids: Vec<String>,
    outbound_rtp_pad_ids: Vec<String>,
    sctp_channel_ids: Vec<String>,
}

impl ObservedSfuTransport {
    pub fn samples(&self) -> impl Iterator<Item = &Stamped<SfuTransportSample>> + '_ {
        self.samples.iter()
    }

    pub fn inbound_rtp_pad_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.inbound_rtp_pad_ids.iter().map(String::as_str)
    }

    pub fn outbound_rtp_pad_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.outbound_rtp_pad_ids.iter().map(String::as_str)
    }

    pub fn sctp_channel_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.sctp_channel_ids.iter().map(String::as_str)
    }
}

/// An RTP pad or SCTP channel observed on a transport, generic over its stats
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedSfuTransportChild<S> {
    pub scope: SfuTransportScope,
    pub id: String,
    pub stream_id: Option<String>,
    pub min_timestamp: Timestamp,
    samples: Vec<Stamped<S>>,
}

impl<S> ObservedSfuTransportChild<S> {
    pub fn samples(&self) -> impl Iterator<Item = &Stamped<S>> + '_ {
        self.samples.iter()
    }

    /// Most recent sample, used for fields that may change over time
    pub fn latest(&self) -> Option<&S> {
        self.samples.last().map(|s| &s.sample)
    }
}

pub type ObservedSfuInboundRtpPad = ObservedSfuTransportChild<SfuInboundRtpPadSample>;
pub type ObservedSfuOutboundRtpPad = ObservedSfuTransportChild<SfuOutboundRtpPadSample>;
pub type ObservedSfuSctpChannel = ObservedSfuTransportChild<SfuSctpChannelSample>;

/// Frozen media server side of a snapshot
#[derive(Debug, Clone, Default)]
pub struct ObservedSfus {
    sfus: HashMap<String, ObservedSfu>,
    transports: HashMap<String, ObservedSfuTransport>,
    inbound_rtp_pads: HashMap<String, ObservedSfuInboundRtpPad>,
    outbound_rtp_pads: HashMap<String, ObservedSfuOutboundRtpPad>,
    sctp_channels: HashMap<String, ObservedSfuSctpChannel>,
}

impl ObservedSfus {
    pub fn is_empty(&self) -> bool {
        self.sfus.is_empty()
    }

    pub fn sfu_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.sfus.keys().map(String::as_str)
    }

    pub fn sfu_transport_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.transports.keys().map(String::as_str)
    }

    pub fn sfu_inbound_rtp_pad_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.inbound_rtp_pads.keys().map(String::as_str)
    }

    pub fn sfu_outbound_rtp_pad_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.outbound_rtp_pads.keys().map(String::as_str)
    }

    pub fn sfu_sctp_channel_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.sctp_channels.keys().map(String::as_str)
    }

    pub fn sfus(&self) -> impl Iterator<Item = &ObservedSfu> + '_ {
        self.sfus.values()
    }

    pub fn sfu(
        &self,
        sfu_id: &str,
    ) -> Option<&ObservedSfu> {
        self.sfus.get(sfu_id)
    }

    pub fn transport(
        &self,
        transport_id: &str,
    ) -> Option<&ObservedSfuTransport> {
        self.transports.get(transport_id)
    }

    pub fn transports_of<'a>(
        &'a self,
        sfu: &'a ObservedSfu,
    ) -> impl Iterator<Item = &'a ObservedSfuTransport> + 'a {
        sfu.transport_ids().filter_map(|id| self.transports.get(id))
    }

    pub fn inbound_rtp_pads_of<'a>(
        &'a self,
        transport: &'a ObservedSfuTransport,
    ) -> impl Iterator<Item = &'a ObservedSfuInboundRtpPad> + 'a {
        transport
            .inbound_rtp_pad_ids()
            .filter_map(|id| self.inbound_rtp_pads.get(id))
    }

    pub fn outbound_rtp_pads_of<'a>(
        &'a self,
        transport: &'a ObservedSfuTransport,
    ) -> impl Iterator<Item = &'a ObservedSfuOutboundRtpPad> + 'a {
        transport
            .outbound_rtp_pad_ids()
            .filter_map(|id| self.outbound_rtp_pads.get(id))
    }

    pub fn sctp_channels_of<'a>(
        &'a self,
        transport: &'a ObservedSfuTransport,
    ) -> impl Iterator<Item = &'a ObservedSfuSctpChannel> + 'a {
        transport
            .sctp_channel_ids()
            .filter_map(|id| self.sctp_channels.get(id))
    }
}

struct SfuBuilder {
    source: SfuSourceConfig,
    range: Option<TimestampRange>,
    samples: Vec<SfuSample>,
    transport_ids: Vec<String>,
}

struct TransportBuilder {
    sfu_id: String,
    internal: bool,
    samples: Vec<Stamped<SfuTransportSample>>,
    inbound_rtp_pad_ids: Vec<String>,
    outbound_rtp_pad_ids: Vec<String>,
    sctp_channel_ids: Vec<String>,
}

struct TransportChildBuilder<S> {
    transport_id: String,
    stream_id: Option<String>,
    samples: Vec<Stamped<S>>,
}

/// Mutable accumulator behind [`ObservedSfus`]
#[derive(Default)]
pub struct ObservedSfusBuilder {
    sfus: HashMap<String, SfuBuilder>,
    transports: HashMap<String, TransportBuilder>,
    inbound_rtp_pads: HashMap<String, TransportChildBuilder<SfuInboundRtpPadSample>>,
    outbound_rtp_pads: HashMap<String, TransportChildBuilder<SfuOutboundRtpPadSample>>,
    sctp_channels: HashMap<String, TransportChildBuilder<SfuSctpChannelSample>>,
}

impl ObservedSfusBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sfus.is_empty()
    }

    /// Routes the samples of one SFU source into the nested builders.
    pub fn add_sfu_samples(
        &mut self,
        source: &SfuSourceConfig,
        samples: Vec<SfuSample>,
    ) {
        let sfu = self
            .sfus
            .entry(source.sfu_id.clone())
            .or_insert_with(|| SfuBuilder {
                source: source.clone(),
                range: None,
                samples: Vec::new(),
                transport_ids: Vec::new(),
            });

        for mut sample in samples {
            let timestamp = sample.timestamp;
            TimestampRange::extend(&mut sfu.range, timestamp);

            for transport_sample in std::mem::take(&mut sample.transports) {
                let internal = transport_sample.internal;
                let Some(transport) = transport_builder(
                    &mut self.transports,
                    sfu,
                    transport_sample.transport_id.as_deref(),
                ) else {
                    continue;
                };
                transport.internal = internal;
                transport.samples.push(Stamped {
                    timestamp,
                    sample: transport_sample,
                });
            }

            for pad in std::mem::take(&mut sample.inbound_rtp_pads) {
                let Some(transport) =
                    transport_builder(&mut self.transports, sfu, pad.transport_id.as_deref())
                else {
                    continue;
                };
                let stream_id = pad.stream_id.clone();
                if let Some(child) = child_builder(
                    &mut self.inbound_rtp_pads,
                    &mut transport.inbound_rtp_pad_ids,
                    &source.sfu_id,
                    pad.transport_id.as_deref().unwrap_or_default(),
                    pad.pad_id.as_deref(),
                ) {
                    if stream_id.is_some() {
                        child.stream_id = stream_id;
                    }
                    child.samples.push(Stamped {
                        timestamp,
                        sample: pad,
                    });
                }
            }

            for pad in std::mem::take(&mut sample.outbound_rtp_pads) {
                let Some(transport) =
                    transport_builder(&mut self.transports, sfu, pad.transport_id.as_deref())
                else {
                    continue;
                };
                let stream_id = pad.stream_id.clone();
                if let Some(child) = child_builder(
                    &mut self.outbound_rtp_pads,
                    &mut transport.outbound_rtp_pad_ids,
                    &source.sfu_id,
                    pad.transport_id.as_deref().unwrap_or_default(),
                    pad.pad_id.as_deref(),
                ) {
                    if stream_id.is_some() {
                        child.stream_id = stream_id;
                    }
                    child.samples.push(Stamped {
                        timestamp,
                        sample: pad,
                    });
                }
            }

            for channel in std::mem::take(&mut sample.sctp_channels) {
                let Some(transport) =
                    transport_builder(&mut self.transports, sfu, channel.transport_id.as_deref())
                else {
                    continue;
                };
                let stream_id = channel.stream_id.clone();
                if let Some(child) = child_builder(
                    &mut self.sctp_channels,
                    &mut transport.sctp_channel_ids,
                    &source.sfu_id,
                    channel.transport_id.as_deref().unwrap_or_default(),
                    channel.channel_id.as_deref(),
                ) {
                    if stream_id.is_some() {
                        child.stream_id = stream_id;
                    }
                    child.samples.push(Stamped {
                        timestamp,
                        sample: channel,
                    });
                }
            }

            sfu.samples.push(sample);
        }
    }

    pub fn build(self) -> ObservedSfus {
        let mut observed = ObservedSfus::default();

        for (sfu_id, sfu) in self.sfus {
            let range = sfu.range.unwrap_or(TimestampRange {
                min: sfu.source.joined,
                max: sfu.source.joined,
            });
            let source = sfu.source;
            observed.sfus.insert(
                sfu_id,
                ObservedSfu {
                    service_id: source.service_id,
                    media_unit_id: source.media_unit_id,
                    sfu_id: source.sfu_id,
                    marker: source.marker,
                    time_zone_id: source.time_zone_id,
                    joined: source.joined,
                    min_timestamp: range.min,
                    max_timestamp: range.max,
                    samples: sfu.samples,
                    transport_ids: sfu.transport_ids,
                },
            );
        }

        for (transport_id, transport) in self.transports {
            let Some(sfu) = observed.sfus.get(&transport.sfu_id) else {
                continue;
            };
            let min_timestamp = transport
                .samples
                .iter()
                .map(|s| s.timestamp)
                .min()
                .unwrap_or(sfu.min_timestamp);
            observed.transports.insert(
                transport_id.clone(),
                ObservedSfuTransport {
                    service_id: sfu.service_id.clone(),
                    media_unit_id: sfu.media_unit_id.clone(),
                    sfu_id: sfu.sfu_id.clone(),
                    marker: sfu.marker.clone(),
                    transport_id,
                    internal: transport.internal,
                    min_timestamp,
                    samples: transport.samples,
                    inbound_rtp_pad_ids: transport.inbound_rtp_pad_ids,
                    outbound_rtp_pad_ids: transport.outbound_rtp_pad_ids,
                    sctp_channel_ids: transport.sctp_channel_ids,
                },
            );
        }

        observed.inbound_rtp_pads = freeze_children(self.inbound_rtp_pads, &observed.transports);
        observed.outbound_rtp_pads =
            freeze_children(self.outbound_rtp_pads, &observed.transports);
        observed.sctp_channels = freeze_children(self.sctp_channels, &observed.transports);
        observed
    }
}

fn transport_builder<'a>(
    transports: &'a mut HashMap<String, TransportBuilder>,
    sfu: &mut SfuBuilder,
    transport_id: Option<&str>,
) -> Option<&'a mut TransportBuilder> {
    let Some(transport_id) = transport_id else {
        warn!(
            sfu_id = %sfu.source.sfu_id,
            "sfu sample without transport id, skipped"
        );
        return None;
    };
    let sfu_id = sfu.source.sfu_id.as_str();
    let transport = transports
        .entry(transport_id.to_string())
        .or_insert_with(|| TransportBuilder {
            sfu_id: sfu_id.to_string(),
            internal: false,
            samples: Vec::new(),
            inbound_rtp_pad_ids: Vec::new(),
            outbound_rtp_pad_ids: Vec::new(),
            sctp_channel_ids: Vec::new(),
        });
    if transport.sfu_id != sfu_id {
        warn!(
            "transport {} is reported by sfu {} but belongs to sfu {}, skipped",
            transport_id, sfu_id, transport.sfu_id
        );
        return None;
    }
    push_unique(&mut sfu.transport_ids, transport_id);
    Some(transport)
}

fn child_builder<'a, S>(
    children: &'a mut HashMap<String, TransportChildBuilder<S>>,
    child_ids: &mut Vec<String>,
    sfu_id: &str,
    transport_id: &str,
    child_id: Option<&str>,
) -> Option<&'a mut TransportChildBuilder<S>> {
    let Some(child_id) = child_id else {
        warn!(
            sfu_id,
            transport_id, "sfu pad or channel sample without id, skipped"
        );
        return None;
    };
    let child = children
        .entry(child_id.to_string())
        .or_insert_with(|| TransportChildBuilder {
            transport_id: transport_id.to_string(),
            stream_id: None,
            samples: Vec::new(),
        });
    if child.transport_id != transport_id {
        warn!(
            "{} is reported on transport {} but belongs to {}, skipped",
            child_id, transport_id, child.transport_id
        );
        return None;
    }
    push_unique(child_ids, child_id);
    Some(child)
}

fn freeze_children<S>(
    children: HashMap<String, TransportChildBuilder<S>>,
    transports: &HashMap<String, ObservedSfuTransport>,
) -> HashMap<String, ObservedSfuTransportChild<S>> {
    children
        .into_iter()
        .filter_map(|(id, child)| {
            let transport = transports.get(&child.transport_id)?;
            let min_timestamp = child
                .samples
                .iter()
                .map(|s| s.timestamp)
                .min()
                .unwrap_or(transport.min_timestamp);
            Some((
                id.clone(),
                ObservedSfuTransportChild {
                    scope: SfuTransportScope {
                        service_id: transport.service_id.clone(),
                        media_unit_id: transport.media_unit_id.clone(),
                        sfu_id: transport.sfu_id.clone(),
                        marker: transport.marker.clone(),
                        sfu_transport_id: child.transport_id,
                    },
                    id,
                    stream_id: child.stream_id,
                    min_timestamp,
                    samples: child.samples,
                },
            ))
        })
        .collect()
}
