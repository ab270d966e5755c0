use std::sync::Arc;

use crate::evaluator::EvaluatorContext;
use crate::processes::create_call_processor;
use crate::processes::CallOperationsContext;
use crate::reports::Report;
use crate::reports::ReportsBuffer;
use crate::reports::ReportsCollector;
use crate::samples::ClientSample;
use crate::samples::InboundTrackSample;
use crate::samples::OutboundTrackSample;
use crate::samples::PeerConnectionTransportSample;
use crate::samples::SfuInboundRtpPadSample;
use crate::samples::SfuSample;
use crate::samples::SfuTransportSample;
use crate::snapshot::ObservedCalls;
use crate::snapshot::ObservedCallsBuilder;
use crate::snapshot::ObservedSfus;
use crate::snapshot::ObservedSfusBuilder;
use crate::sources::ClientSourceConfig;
use crate::sources::SfuSourceConfig;
use crate::storage::StorageProvider;
use crate::time::Timestamp;
use crate::transaction::create_transaction_processor;
use crate::transaction::TransactionContext;
use crate::EvaluatorConfig;

pub(crate) fn client_config(
    call_id: &str,
    client_id: &str,
    joined: Timestamp,
) -> ClientSourceConfig {
    ClientSourceConfig {
        service_id: "svc".to_string(),
        media_unit_id: "mu".to_string(),
        room_id: "room".to_string(),
        call_id: call_id.to_string(),
        client_id: client_id.to_string(),
        user_id: Some(format!("user-{client_id}")),
        marker: None,
        time_zone_id: None,
        joined,
    }
}

pub(crate) fn sfu_config(
    sfu_id: &str,
    joined: Timestamp,
) -> SfuSourceConfig {
    SfuSourceConfig {
        service_id: "svc".to_string(),
        media_unit_id: "sfu-mu".to_string(),
        sfu_id: sfu_id.to_string(),
        marker: None,
        time_zone_id: None,
        joined,
    }
}

/// Client sample reporting one peer connection transport
pub(crate) fn pc_sample(
    timestamp: Timestamp,
    peer_connection_id: &str,
) -> ClientSample {
    ClientSample {
        timestamp,
        pc_transports: vec![PeerConnectionTransportSample {
            peer_connection_id: Some(peer_connection_id.to_string()),
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// Client sample reporting one inbound audio and one outbound video track on a peer connection
pub(crate) fn tracks_sample(
    timestamp: Timestamp,
    peer_connection_id: &str,
    inbound_track_id: &str,
    outbound_track_id: &str,
) -> ClientSample {
    ClientSample {
        inbound_audio_tracks: vec![InboundTrackSample {
            track_id: Some(inbound_track_id.to_string()),
            peer_connection_id: Some(peer_connection_id.to_string()),
            ssrc: 1,
            ..Default::default()
        }],
        outbound_video_tracks: vec![OutboundTrackSample {
            track_id: Some(outbound_track_id.to_string()),
            peer_connection_id: Some(peer_connection_id.to_string()),
            ssrc: 2,
            ..Default::default()
        }],
        ..pc_sample(timestamp, peer_connection_id)
    }
}

/// SFU sample reporting one transport with one inbound RTP pad
pub(crate) fn sfu_sample(
    timestamp: Timestamp,
    transport_id: &str,
    pad_id: &str,
) -> SfuSample {
    SfuSample {
        timestamp,
        transports: vec![SfuTransportSample {
            transport_id: Some(transport_id.to_string()),
            ..Default::default()
        }],
        inbound_rtp_pads: vec![SfuInboundRtpPadSample {
            transport_id: Some(transport_id.to_string()),
            pad_id: Some(pad_id.to_string()),
            ssrc: Some(7),
            ..Default::default()
        }],
        ..Default::default()
    }
}

pub(crate) fn observed_calls(
    entries: Vec<(ClientSourceConfig, Vec<ClientSample>)>
) -> Arc<ObservedCalls> {
    let mut builder = ObservedCallsBuilder::new();
    for (config, samples) in entries {
        builder.add_client_samples(&config, samples);
    }
    Arc::new(builder.build())
}

pub(crate) fn observed_sfus(entries: Vec<(SfuSourceConfig, Vec<SfuSample>)>) -> Arc<ObservedSfus> {
    let mut builder = ObservedSfusBuilder::new();
    for (config, samples) in entries {
        builder.add_sfu_samples(&config, samples);
    }
    Arc::new(builder.build())
}

/// Names of the call event reports, in emission order
pub(crate) fn call_event_names(reports: &[Report]) -> Vec<String> {
    reports
        .iter()
        .filter_map(|report| match report {
            Report::CallEvent(event) => Some(event.name.clone()),
            _ => None,
        })
        .collect()
}

/// Names of the SFU event reports, in emission order
pub(crate) fn sfu_event_names(reports: &[Report]) -> Vec<String> {
    reports
        .iter()
        .filter_map(|report| match report {
            Report::SfuEvent(event) => Some(event.name.clone()),
            _ => None,
        })
        .collect()
}

/// Evaluator context of a tick over the given snapshot pair
pub(crate) fn tick_context(
    tick_id: u64,
    created: Timestamp,
    calls: Arc<ObservedCalls>,
    sfus: Arc<ObservedSfus>,
) -> EvaluatorContext {
    EvaluatorContext::new(tick_id, created, calls, sfus)
}

/// Stores clients and their calls the way the call processor does
pub(crate) async fn join_clients(
    storages: &StorageProvider,
    configs: Vec<ClientSourceConfig>,
) {
    let processor = create_call_processor(storages.clone(), Arc::new(ReportsBuffer::new()));
    let mut ctx = CallOperationsContext {
        joined_clients: configs,
        ..Default::default()
    };
    processor.process(&mut ctx).await.expect("join clients");
}

/// Loads and runs the full transaction chain over `ctx`
pub(crate) async fn run_transaction(
    config: &EvaluatorConfig,
    storages: &StorageProvider,
    reports: Arc<dyn ReportsCollector>,
    ctx: EvaluatorContext,
) -> TransactionContext {
    let processor = create_transaction_processor(config, storages.clone(), reports);
    let mut tx = TransactionContext::load(ctx, storages)
        .await
        .expect("load transaction");
    processor.process(&mut tx).await.expect("run transaction");
    tx
}
