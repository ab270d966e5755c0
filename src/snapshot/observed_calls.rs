use std::collections::HashMap;

use tracing::warn;

use super::Stamped;
use super::TimestampRange;
use crate::models::push_unique;
use crate::models::MediaKind;
use crate::samples::ClientSample;
use crate::samples::IceCandidatePairSample;
use crate::samples::InboundTrackSample;
use crate::samples::OutboundTrackSample;
use crate::samples::PeerConnectionTransportSample;
use crate::sources::ClientSourceConfig;
use crate::time::Timestamp;

#[derive(Debug, Clone, PartialEq)]
pub struct ObservedCall {
    pub service_id: String,
    pub room_id: String,
    pub call_id: String,
    client_ids: Vec<String>,
}

impl ObservedCall {
    pub fn client_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.client_ids.iter().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObservedClient {
    pub service_id: String,
    pub media_unit_id: String,
    pub room_id: String,
    pub call_id: String,
    pub client_id: String,
    pub user_id: Option<String>,
    pub marker: Option<String>,
    pub time_zone_id: Option<String>,
    pub joined: Timestamp,
    pub min_timestamp: Timestamp,
    pub max_timestamp: Timestamp,
    samples: Vec<ClientSample>,
    peer_connection_ids: Vec<String>,
}

impl ObservedClient {
    /// Client level part of each sample, in arrival order. Peer connection and track
    /// fragments are carried by the respective observed entities.
    pub fn samples(&self) -> impl Iterator<Item = &ClientSample> + '_ {
        self.samples.iter()
    }

    pub fn peer_connection_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.peer_connection_ids.iter().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObservedPeerConnection {
    pub service_id: String,
    pub media_unit_id: String,
    pub room_id: String,
    pub call_id: String,
    pub client_id: String,
    pub user_id: Option<String>,
    pub marker: Option<String>,
    pub peer_connection_id: String,
    pub label: Option<String>,
    /// Earliest sample timestamp of the owning client
    pub client_min_timestamp: Timestamp,
    transport_samples: Vec<Stamped<PeerConnectionTransportSample>>,
    ice_candidate_pair_samples: Vec<Stamped<IceCandidatePairSample>>,
    inbound_track_ids: Vec<String>,
    outbound_track_ids: Vec<String>,
}

impl ObservedPeerConnection {
    pub fn transport_samples(
        &self
    ) -> impl Iterator<Item = &Stamped<PeerConnectionTransportSample>> + '_ {
        self.transport_samples.iter()
    }

    pub fn ice_candidate_pair_samples(
        &self
    ) -> impl Iterator<Item = &Stamped<IceCandidatePairSample>> + '_ {
        self.ice_candidate_pair_samples.iter()
    }

    pub fn inbound_track_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.inbound_track_ids.iter().map(String::as_str)
    }

    pub fn outbound_track_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.outbound_track_ids.iter().map(String::as_str)
    }
}

/// A media track observed on a peer connection, generic over inbound and outbound stats
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedTrack<S> {
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
    pub sfu_stream_id: Option<String>,
    pub sfu_sink_id: Option<String>,
    pub min_timestamp: Timestamp,
    samples: Vec<Stamped<S>>,
}

impl<S> ObservedTrack<S> {
    pub fn samples(&self) -> impl Iterator<Item = &Stamped<S>> + '_ {
        self.samples.iter()
    }
}

pub type ObservedInboundTrack = ObservedTrack<InboundTrackSample>;
pub type ObservedOutboundTrack = ObservedTrack<OutboundTrackSample>;

/// Frozen client side of a snapshot
#[derive(Debug, Clone, Default)]
pub struct ObservedCalls {
    calls: HashMap<String, ObservedCall>,
    clients: HashMap<String, ObservedClient>,
    peer_connections: HashMap<String, ObservedPeerConnection>,
    inbound_tracks: HashMap<String, ObservedInboundTrack>,
    outbound_tracks: HashMap<String, ObservedOutboundTrack>,
}

impl ObservedCalls {
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn call_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.calls.keys().map(String::as_str)
    }

    pub fn client_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.clients.keys().map(String::as_str)
    }

    pub fn peer_connection_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.peer_connections.keys().map(String::as_str)
    }

    pub fn inbound_track_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.inbound_tracks.keys().map(String::as_str)
    }

    pub fn outbound_track_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.outbound_tracks.keys().map(String::as_str)
    }

    pub fn calls(&self) -> impl Iterator<Item = &ObservedCall> + '_ {
        self.calls.values()
    }

    pub fn call(
        &self,
        call_id: &str,
    ) -> Option<&ObservedCall> {
        self.calls.get(call_id)
    }

    pub fn client(
        &self,
        client_id: &str,
    ) -> Option<&ObservedClient> {
        self.clients.get(client_id)
    }

    pub fn peer_connection(
        &self,
        peer_connection_id: &str,
    ) -> Option<&ObservedPeerConnection> {
        self.peer_connections.get(peer_connection_id)
    }

    pub fn inbound_track(
        &self,
        track_id: &str,
    ) -> Option<&ObservedInboundTrack> {
        self.inbound_tracks.get(track_id)
    }

    pub fn outbound_track(
        &self,
        track_id: &str,
    ) -> Option<&ObservedOutboundTrack> {
        self.outbound_tracks.get(track_id)
    }

    pub fn clients_of<'a>(
        &'a self,
        call: &'a ObservedCall,
    ) -> impl Iterator<Item = &'a ObservedClient> + 'a {
        call.client_ids().filter_map(|id| self.clients.get(id))
    }

    pub fn peer_connections_of<'a>(
        &'a self,
        client: &'a ObservedClient,
    ) -> impl Iterator<Item = &'a ObservedPeerConnection> + 'a {
        client
            .peer_connection_ids()
            .filter_map(|id| self.peer_connections.get(id))
    }

    pub fn inbound_tracks_of<'a>(
        &'a self,
        pc: &'a ObservedPeerConnection,
    ) -> impl Iterator<Item = &'a ObservedInboundTrack> + 'a {
        pc.inbound_track_ids()
            .filter_map(|id| self.inbound_tracks.get(id))
    }

    pub fn outbound_tracks_of<'a>(
        &'a self,
        pc: &'a ObservedPeerConnection,
    ) -> impl Iterator<Item = &'a ObservedOutboundTrack> + 'a {
        pc.outbound_track_ids()
            .filter_map(|id| self.outbound_tracks.get(id))
    }
}

struct CallBuilder {
    service_id: String,
    room_id: String,
    client_ids: Vec<String>,
}

struct ClientBuilder {
    source: ClientSourceConfig,
    range: Option<TimestampRange>,
    samples: Vec<ClientSample>,
    peer_connection_ids: Vec<String>,
}

struct PeerConnectionBuilder {
    client_id: String,
    label: Option<String>,
    transport_samples: Vec<Stamped<PeerConnectionTransportSample>>,
    ice_candidate_pair_samples: Vec<Stamped<IceCandidatePairSample>>,
    inbound_track_ids: Vec<String>,
    outbound_track_ids: Vec<String>,
}

impl PeerConnectionBuilder {
    fn new(client_id: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            label: None,
            transport_samples: Vec::new(),
            ice_candidate_pair_samples: Vec::new(),
            inbound_track_ids: Vec::new(),
            outbound_track_ids: Vec::new(),
        }
    }
}

struct TrackBuilder<S> {
    peer_connection_id: String,
    kind: MediaKind,
    sfu_stream_id: Option<String>,
    sfu_sink_id: Option<String>,
    samples: Vec<Stamped<S>>,
}

impl<S> TrackBuilder<S> {
    fn new(
        peer_connection_id: &str,
        kind: MediaKind,
    ) -> Self {
        Self {
            peer_connection_id: peer_connection_id.to_string(),
            kind,
            sfu_stream_id: None,
            sfu_sink_id: None,
            samples: Vec::new(),
        }
    }
}

/// Mutable accumulator behind [`ObservedCalls`]
#[derive(Default)]
pub struct ObservedCallsBuilder {
    calls: HashMap<String, CallBuilder>,
    clients: HashMap<String, ClientBuilder>,
    peer_connections: HashMap<String, PeerConnectionBuilder>,
    inbound_tracks: HashMap<String, TrackBuilder<InboundTrackSample>>,
    outbound_tracks: HashMap<String, TrackBuilder<OutboundTrackSample>>,
}

impl ObservedCallsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Routes the samples of one client source into the nested builders.
    pub fn add_client_samples(
        &mut self,
        source: &ClientSourceConfig,
        samples: Vec<ClientSample>,
    ) {
        let call = self
            .calls
            .entry(source.call_id.clone())
            .or_insert_with(|| CallBuilder {
                service_id: source.service_id.clone(),
                room_id: source.room_id.clone(),
                client_ids: Vec::new(),
            });
        push_unique(&mut call.client_ids, &source.client_id);

        let client = self
            .clients
            .entry(source.client_id.clone())
            .or_insert_with(|| ClientBuilder {
                source: source.clone(),
                range: None,
                samples: Vec::new(),
                peer_connection_ids: Vec::new(),
            });

        for mut sample in samples {
            let timestamp = sample.timestamp;
            TimestampRange::extend(&mut client.range, timestamp);

            for transport in std::mem::take(&mut sample.pc_transports) {
                let Some(pc) = peer_connection_builder(
                    &mut self.peer_connections,
                    client,
                    transport.peer_connection_id.as_deref(),
                ) else {
                    continue;
                };
                if transport.label.is_some() {
                    pc.label = transport.label.clone();
                }
                pc.transport_samples.push(Stamped {
                    timestamp,
                    sample: transport,
                });
            }

            for pair in std::mem::take(&mut sample.ice_candidate_pairs) {
                let Some(pc) = peer_connection_builder(
                    &mut self.peer_connections,
                    client,
                    pair.peer_connection_id.as_deref(),
                ) else {
                    continue;
                };
                pc.ice_candidate_pair_samples.push(Stamped {
                    timestamp,
                    sample: pair,
                });
            }

            let inbound = std::mem::take(&mut sample.inbound_audio_tracks)
                .into_iter()
                .map(|s| (MediaKind::Audio, s))
                .chain(
                    std::mem::take(&mut sample.inbound_video_tracks)
                        .into_iter()
                        .map(|s| (MediaKind::Video, s)),
                );
            for (kind, track_sample) in inbound {
                let (Some(track_id), Some(pc_id)) = (
                    track_sample.track_id.clone(),
                    track_sample.peer_connection_id.clone(),
                ) else {
                    warn!(
                        client_id = %client.source.client_id,
                        "inbound track sample without track or peer connection id, skipped"
                    );
                    continue;
                };
                let Some(pc) =
                    peer_connection_builder(&mut self.peer_connections, client, Some(&pc_id))
                else {
                    continue;
                };
                let Some(track) = track_builder(
                    &mut self.inbound_tracks,
                    &mut pc.inbound_track_ids,
                    &pc_id,
                    &track_id,
                    kind,
                ) else {
                    continue;
                };
                if track_sample.sfu_stream_id.is_some() {
                    track.sfu_stream_id = track_sample.sfu_stream_id.clone();
                }
                if track_sample.sfu_sink_id.is_some() {
                    track.sfu_sink_id = track_sample.sfu_sink_id.clone();
                }
                track.samples.push(Stamped {
                    timestamp,
                    sample: track_sample,
                });
            }

            let outbound = std::mem::take(&mut sample.outbound_audio_tracks)
                .into_iter()
                .map(|s| (MediaKind::Audio, s))
                .chain(
                    std::mem::take(&mut sample.outbound_video_tracks)
                        .into_iter()
                        .map(|s| (MediaKind::Video, s)),
                );
            for (kind, track_sample) in outbound {
                let (Some(track_id), Some(pc_id)) = (
                    track_sample.track_id.clone(),
                    track_sample.peer_connection_id.clone(),
                ) else {
                    warn!(
                        client_id = %client.source.client_id,
                        "outbound track sample without track or peer connection id, skipped"
                    );
                    continue;
                };
                let Some(pc) =
                    peer_connection_builder(&mut self.peer_connections, client, Some(&pc_id))
                else {
                    continue;
                };
                let Some(track) = track_builder(
                    &mut self.outbound_tracks,
                    &mut pc.outbound_track_ids,
                    &pc_id,
                    &track_id,
                    kind,
                ) else {
                    continue;
                };
                if track_sample.sfu_stream_id.is_some() {
                    track.sfu_stream_id = track_sample.sfu_stream_id.clone();
                }
                track.samples.push(Stamped {
                    timestamp,
                    sample: track_sample,
                });
            }

            client.samples.push(sample);
        }
    }

    /// Freezes the accumulated samples. Parents are built before their children so each
    /// child copies its parent's identity by value.
    pub fn build(self) -> ObservedCalls {
        let mut observed = ObservedCalls::default();

        for (call_id, call) in self.calls {
            observed.calls.insert(
                call_id.clone(),
                ObservedCall {
                    service_id: call.service_id,
                    room_id: call.room_id,
                    call_id,
                    client_ids: call.client_ids,
                },
            );
        }

        for (client_id, client) in self.clients {
            let range = client.range.unwrap_or(TimestampRange {
                min: client.source.joined,
                max: client.source.joined,
            });
            let source = client.source;
            observed.clients.insert(
                client_id,
                ObservedClient {
                    service_id: source.service_id,
                    media_unit_id: source.media_unit_id,
                    room_id: source.room_id,
                    call_id: source.call_id,
                    client_id: source.client_id,
                    user_id: source.user_id,
                    marker: source.marker,
                    time_zone_id: source.time_zone_id,
                    joined: source.joined,
                    min_timestamp: range.min,
                    max_timestamp: range.max,
                    samples: client.samples,
                    peer_connection_ids: client.peer_connection_ids,
                },
            );
        }

        for (pc_id, pc) in self.peer_connections {
            let Some(client) = observed.clients.get(&pc.client_id) else {
                continue;
            };
            observed.peer_connections.insert(
                pc_id.clone(),
                ObservedPeerConnection {
                    service_id: client.service_id.clone(),
                    media_unit_id: client.media_unit_id.clone(),
                    room_id: client.room_id.clone(),
                    call_id: client.call_id.clone(),
                    client_id: client.client_id.clone(),
                    user_id: client.user_id.clone(),
                    marker: client.marker.clone(),
                    peer_connection_id: pc_id,
                    label: pc.label,
                    client_min_timestamp: client.min_timestamp,
                    transport_samples: pc.transport_samples,
                    ice_candidate_pair_samples: pc.ice_candidate_pair_samples,
                    inbound_track_ids: pc.inbound_track_ids,
                    outbound_track_ids: pc.outbound_track_ids,
                },
            );
        }

        observed.inbound_tracks = freeze_tracks(self.inbound_tracks, &observed.peer_connections);
        observed.outbound_tracks =
            freeze_tracks(self.outbound_tracks, &observed.peer_connections);
        observed
    }
}

fn peer_connection_builder<'a>(
    peer_connections: &'a mut HashMap<String, PeerConnectionBuilder>,
    client: &mut ClientBuilder,
    peer_connection_id: Option<&str>,
) -> Option<&'a mut PeerConnectionBuilder> {
    let Some(pc_id) = peer_connection_id else {
        warn!(
            client_id = %client.source.client_id,
            "peer connection sample without peer connection id, skipped"
        );
        return None;
    };
    let client_id = client.source.client_id.as_str();
    let pc = peer_connections
        .entry(pc_id.to_string())
        .or_insert_with(|| PeerConnectionBuilder::new(client_id));
    if pc.client_id != client_id {
        warn!(
            "peer connection {} is reported by client {} but belongs to client {}, skipped",
            pc_id, client_id, pc.client_id
        );
        return None;
    }
    push_unique(&mut client.peer_connection_ids, pc_id);
    Some(pc)
}

fn track_builder<'a, S>(
    tracks: &'a mut HashMap<String, TrackBuilder<S>>,
    track_ids: &mut Vec<String>,
    peer_connection_id: &str,
    track_id: &str,
    kind: MediaKind,
) -> Option<&'a mut TrackBuilder<S>> {
    let track = tracks
        .entry(track_id.to_string())
        .or_insert_with(|| TrackBuilder::new(peer_connection_id, kind));
    if track.peer_connection_id != peer_connection_id {
        warn!(
            "track {} is reported on peer connection {} but belongs to {}, skipped",
            track_id, peer_connection_id, track.peer_connection_id
        );
        return None;
    }
    push_unique(track_ids, track_id);
    Some(track)
}

fn freeze_tracks<S>(
    tracks: HashMap<String, TrackBuilder<S>>,
    peer_connections: &HashMap<String, ObservedPeerConnection>,
) -> HashMap<String, ObservedTrack<S>> {
    tracks
        .into_iter()
        .filter_map(|(track_id, track)| {
            let pc = peer_connections.get(&track.peer_connection_id)?;
            let min_timestamp = track
                .samples
                .iter()
                .map(|s| s.timestamp)
                .min()
                .unwrap_or(pc.client_min_timestamp);
            Some((
                track_id.clone(),
                ObservedTrack {
                    service_id: pc.service_id.clone(),
                    media_unit_id: pc.media_unit_id.clone(),
                    room_id: pc.room_id.clone(),
                    call_id: pc.call_id.clone(),
                    client_id: pc.client_id.clone(),
                    user_id: pc.user_id.clone(),
                    marker: pc.marker.clone(),
                    peer_connection_id: track.peer_connection_id,
                    track_id,
                    kind: track.kind,
                    sfu_stream_id: track.sfu_stream_id,
                    sfu_sink_id: track.sfu_sink_id,
                    min_timestamp,
                    samples: track.samples,
                },
            ))
        })
        .collect()
}
