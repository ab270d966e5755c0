use std::sync::Arc;

use super::MemoryStorage;
use super::ObserverStorage;
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

/// One collection per entity type
#[derive(Clone)]
pub struct StorageProvider {
    pub call_storage: Arc<dyn ObserverStorage<Call>>,
    pub client_storage: Arc<dyn ObserverStorage<Client>>,
    pub peer_connection_storage: Arc<dyn ObserverStorage<PeerConnection>>,
    pub inbound_track_storage: Arc<dyn ObserverStorage<InboundTrack>>,
    pub outbound_track_storage: Arc<dyn ObserverStorage<OutboundTrack>>,
    pub sfu_storage: Arc<dyn ObserverStorage<Sfu>>,
    pub sfu_transport_storage: Arc<dyn ObserverStorage<SfuTransport>>,
    pub sfu_inbound_rtp_pad_storage: Arc<dyn ObserverStorage<SfuInboundRtpPad>>,
    pub sfu_outbound_rtp_pad_storage: Arc<dyn ObserverStorage<SfuOutboundRtpPad>>,
    pub sfu_sctp_channel_storage: Arc<dyn ObserverStorage<SfuSctpChannel>>,
}

impl StorageProvider {
    pub fn in_memory() -> Self {
        Self {
            call_storage: Arc::new(MemoryStorage::new("observer-calls")),
            client_storage: Arc::new(MemoryStorage::new("observer-clients")),
            peer_connection_storage: Arc::new(MemoryStorage::new("observer-peer-connections")),
            inbound_track_storage: Arc::new(MemoryStorage::new("observer-inbound-tracks")),
            outbound_track_storage: Arc::new(MemoryStorage::new("observer-outbound-tracks")),
            sfu_storage: Arc::new(MemoryStorage::new("observer-sfus")),
            sfu_transport_storage: Arc::new(MemoryStorage::new("observer-sfu-transports")),
            sfu_inbound_rtp_pad_storage: Arc::new(MemoryStorage::new(
                "observer-sfu-inbound-rtp-pads",
            )),
            sfu_outbound_rtp_pad_storage: Arc::new(MemoryStorage::new(
                "observer-sfu-outbound-rtp-pads",
            )),
            sfu_sctp_channel_storage: Arc::new(MemoryStorage::new("observer-sfu-sctp-channels")),
        }
    }
}
