use std::fmt;

use serde::Serialize;

use crate::models::Call;
use crate::models::Client;
use crate::models::InboundTrack;
use crate::models::OutboundTrack;
use crate::models::PeerConnection;
use crate::samples::CustomCallEvent;
use crate::time::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallEventType {
    CallStarted,
    CallEnded,
    ClientJoined,
    ClientLeft,
    PeerConnectionOpened,
    PeerConnectionClosed,
    MediaTrackAdded,
    MediaTrackRemoved,
}

impl CallEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallEventType::CallStarted => "CALL_STARTED",
            CallEventType::CallEnded => "CALL_ENDED",
            CallEventType::ClientJoined => "CLIENT_JOINED",
            CallEventType::ClientLeft => "CLIENT_LEFT",
            CallEventType::PeerConnectionOpened => "PEER_CONNECTION_OPENED",
            CallEventType::PeerConnectionClosed => "PEER_CONNECTION_CLOSED",
            CallEventType::MediaTrackAdded => "MEDIA_TRACK_ADDED",
            CallEventType::MediaTrackRemoved => "MEDIA_TRACK_REMOVED",
        }
    }
}

impl fmt::Display for CallEventType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CallEventReport {
    /// Either a [`CallEventType`] name or an application defined event name
    pub name: String,
    pub service_id: String,
    pub media_unit_id: Option<String>,
    pub room_id: String,
    pub call_id: String,
    pub client_id: Option<String>,
    pub user_id: Option<String>,
    pub peer_connection_id: Option<String>,
    pub media_track_id: Option<String>,
    pub sfu_stream_id: Option<String>,
    pub sfu_sink_id: Option<String>,
    pub value: Option<String>,
    pub message: Option<String>,
    pub attachments: Option<String>,
    pub marker: Option<String>,
    pub timestamp: Timestamp,
}

impl CallEventReport {
    pub fn call_started(
        call: &Call,
        timestamp: Timestamp,
    ) -> Self {
        Self::for_call(CallEventType::CallStarted, call, timestamp)
    }

    pub fn call_ended(
        call: &Call,
        timestamp: Timestamp,
    ) -> Self {
        Self::for_call(CallEventType::CallEnded, call, timestamp)
    }

    pub fn client_joined(
        client: &Client,
        timestamp: Timestamp,
    ) -> Self {
        Self::for_client(CallEventType::ClientJoined, client, timestamp)
    }

    pub fn client_left(
        client: &Client,
        timestamp: Timestamp,
    ) -> Self {
        Self::for_client(CallEventType::ClientLeft, client, timestamp)
    }

    pub fn peer_connection_opened(
        pc: &PeerConnection,
        timestamp: Timestamp,
    ) -> Self {
        Self::for_peer_connection(CallEventType::PeerConnectionOpened, pc, timestamp)
    }

    pub fn peer_connection_closed(
        pc: &PeerConnection,
        timestamp: Timestamp,
    ) -> Self {
        Self::for_peer_connection(CallEventType::PeerConnectionClosed, pc, timestamp)
    }

    pub fn inbound_track_added(
        track: &InboundTrack,
        timestamp: Timestamp,
    ) -> Self {
        Self::for_inbound_track(CallEventType::MediaTrackAdded, track, timestamp)
    }

    pub fn inbound_track_removed(
        track: &InboundTrack,
        timestamp: Timestamp,
    ) -> Self {
        Self::for_inbound_track(CallEventType::MediaTrackRemoved, track, timestamp)
    }

    pub fn outbound_track_added(
        track: &OutboundTrack,
        timestamp: Timestamp,
    ) -> Self {
        Self::for_outbound_track(CallEventType::MediaTrackAdded, track, timestamp)
    }

    pub fn outbound_track_removed(
        track: &OutboundTrack,
        timestamp: Timestamp,
    ) -> Self {
        Self::for_outbound_track(CallEventType::MediaTrackRemoved, track, timestamp)
    }

    /// Application defined event carried in a client sample
    pub fn custom(
        client: &Client,
        event: &CustomCallEvent,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            name: event.name.clone(),
            peer_connection_id: event.peer_connection_id.clone(),
            media_track_id: event.media_track_id.clone(),
            value: event.value.clone(),
            message: event.message.clone(),
            attachments: event.attachments.clone(),
            timestamp: event.timestamp.unwrap_or(timestamp),
            ..Self::for_client_name(event.name.clone(), client, timestamp)
        }
    }

    fn for_call(
        event_type: CallEventType,
        call: &Call,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            name: event_type.as_str().to_string(),
            service_id: call.service_id.clone(),
            room_id: call.room_id.clone(),
            call_id: call.call_id.clone(),
            timestamp,
            ..Default::default()
        }
    }

    fn for_client(
        event_type: CallEventType,
        client: &Client,
        timestamp: Timestamp,
    ) -> Self {
        Self::for_client_name(event_type.as_str().to_string(), client, timestamp)
    }

    fn for_client_name(
        name: String,
        client: &Client,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            name,
            service_id: client.service_id.clone(),
            media_unit_id: Some(client.media_unit_id.clone()),
            room_id: client.room_id.clone(),
            call_id: client.call_id.clone(),
            client_id: Some(client.client_id.clone()),
            user_id: client.user_id.clone(),
            marker: client.marker.clone(),
            timestamp,
            ..Default::default()
        }
    }

    fn for_peer_connection(
        event_type: CallEventType,
        pc: &PeerConnection,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            name: event_type.as_str().to_string(),
            service_id: pc.service_id.clone(),
            media_unit_id: Some(pc.media_unit_id.clone()),
            room_id: pc.room_id.clone(),
            call_id: pc.call_id.clone(),
            client_id: Some(pc.client_id.clone()),
            user_id: pc.user_id.clone(),
            peer_connection_id: Some(pc.peer_connection_id.clone()),
            marker: pc.marker.clone(),
            timestamp,
            ..Default::default()
        }
    }

    fn for_inbound_track(
        event_type: CallEventType,
        track: &InboundTrack,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            name: event_type.as_str().to_string(),
            service_id: track.service_id.clone(),
            media_unit_id: Some(track.media_unit_id.clone()),
            room_id: track.room_id.clone(),
            call_id: track.call_id.clone(),
            client_id: Some(track.client_id.clone()),
            user_id: track.user_id.clone(),
            peer_connection_id: Some(track.peer_connection_id.clone()),
            media_track_id: Some(track.track_id.clone()),
            sfu_stream_id: track.sfu_stream_id.clone(),
            sfu_sink_id: track.sfu_sink_id.clone(),
            attachments: Some(format!(
                "{{\"kind\":\"{}\",\"direction\":\"inbound\"}}",
                track.kind.as_str()
            )),
            marker: track.marker.clone(),
            timestamp,
            ..Default::default()
        }
    }

    fn for_outbound_track(
        event_type: CallEventType,
        track: &OutboundTrack,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            name: event_type.as_str().to_string(),
            service_id: track.service_id.clone(),
            media_unit_id: Some(track.media_unit_id.clone()),
            room_id: track.room_id.clone(),
            call_id: track.call_id.clone(),
            client_id: Some(track.client_id.clone()),
            user_id: track.user_id.clone(),
            peer_connection_id: Some(track.peer_connection_id.clone()),
            media_track_id: Some(track.track_id.clone()),
            sfu_stream_id: track.sfu_stream_id.clone(),
            attachments: Some(format!(
                "{{\"kind\":\"{}\",\"direction\":\"outbound\"}}",
                track.kind.as_str()
            )),
            marker: track.marker.clone(),
            timestamp,
            ..Default::default()
        }
    }
}
