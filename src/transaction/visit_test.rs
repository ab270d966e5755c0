use std::sync::Arc;

use tracing_test::traced_test;

use super::*;
use crate::middleware::Processor;
use crate::models::InboundTrack;
use crate::models::MediaKind;
use crate::models::Sfu;
use crate::models::SfuTransport;
use crate::reports::CallMetaPayload;
use crate::reports::Report;
use crate::reports::ReportsBuffer;
use crate::samples::Browser;
use crate::samples::ClientSample;
use crate::samples::CustomCallEvent;
use crate::samples::CustomSfuEvent;
use crate::samples::SfuSample;
use crate::snapshot::ObservedCalls;
use crate::snapshot::ObservedSfus;
use crate::storage::StorageProvider;
use crate::test_utils::call_event_names;
use crate::test_utils::client_config;
use crate::test_utils::join_clients;
use crate::test_utils::observed_calls;
use crate::test_utils::observed_sfus;
use crate::test_utils::sfu_config;
use crate::test_utils::sfu_event_names;
use crate::test_utils::sfu_sample;
use crate::test_utils::tick_context;
use crate::test_utils::tracks_sample;

const NOW: u64 = 1_000_000;

async fn visit_calls(
    storages: &StorageProvider,
    calls: Arc<ObservedCalls>,
    fetch_samples: bool,
) -> (TransactionContext, Vec<Report>) {
    let reports = Arc::new(ReportsBuffer::new());
    let processor = Processor::new("test");
    processor.add_middleware(Arc::new(VisitObservedCallsMiddleware::new(
        reports.clone(),
        fetch_samples,
    )));
    let mut tx = TransactionContext::load(
        tick_context(1, NOW, calls, Arc::new(ObservedSfus::default())),
        storages,
    )
    .await
    .unwrap();
    processor.process(&mut tx).await.unwrap();
    (tx, reports.take())
}

async fn visit_sfus(
    storages: &StorageProvider,
    sfus: Arc<ObservedSfus>,
) -> (TransactionContext, Vec<Report>) {
    let reports = Arc::new(ReportsBuffer::new());
    let processor = Processor::new("test");
    processor.add_middleware(Arc::new(VisitObservedSfusMiddleware::new(reports.clone())));
    let mut tx = TransactionContext::load(
        tick_context(1, NOW, observed_calls(vec![]), sfus),
        storages,
    )
    .await
    .unwrap();
    processor.process(&mut tx).await.unwrap();
    (tx, reports.take())
}

#[tokio::test]
#[traced_test]
async fn test_samples_of_unjoined_client_are_skipped() {
    let storages = StorageProvider::in_memory();
    let calls = observed_calls(vec![(
        client_config("call1", "stranger", 1),
        vec![tracks_sample(10, "pc1", "in1", "out1")],
    )]);

    let (tx, reports) = visit_calls(&storages, calls, false).await;

    assert!(reports.is_empty());
    assert!(tx.peer_connections.updated.is_empty());
    assert!(tx.inbound_tracks.updated.is_empty());
    assert!(logs_contain("Client stranger of call call1 has not joined"));
}

#[tokio::test]
async fn test_new_peer_connection_and_tracks_are_created_and_listed() {
    let storages = StorageProvider::in_memory();
    join_clients(&storages, vec![client_config("call1", "c1", 1)]).await;
    let calls = observed_calls(vec![(
        client_config("call1", "c1", 1),
        vec![tracks_sample(10, "pc1", "in1", "out1")],
    )]);

    let (tx, reports) = visit_calls(&storages, calls, false).await;

    let client = tx.clients.get("c1").unwrap();
    assert_eq!(client.peer_connection_ids, vec!["pc1"]);
    assert_eq!(client.touched, Some(NOW));

    let pc = tx.peer_connections.get("pc1").unwrap();
    assert_eq!(pc.inbound_track_ids, vec!["in1"]);
    assert_eq!(pc.outbound_track_ids, vec!["out1"]);
    assert_eq!(pc.opened, 10);
    assert_eq!(pc.touched, Some(NOW));

    let inbound = tx.inbound_tracks.get("in1").unwrap();
    assert_eq!(inbound.kind, MediaKind::Audio);
    assert_eq!(inbound.ssrcs, vec![1]);
    assert_eq!(inbound.added, 10);
    assert!(inbound.stats.is_empty());
    assert_eq!(tx.outbound_tracks.get("out1").unwrap().kind, MediaKind::Video);

    assert!(tx.peer_connections.visited.contains("pc1"));
    assert!(tx.inbound_tracks.visited.contains("in1"));
    assert!(tx.outbound_tracks.visited.contains("out1"));

    assert!(matches!(reports[0], Report::PeerConnectionTransport(_)));
    assert_eq!(
        reports
            .iter()
            .filter(|r| matches!(r, Report::InboundAudioTrack(_)))
            .count(),
        1
    );
    assert_eq!(
        reports
            .iter()
            .filter(|r| matches!(r, Report::OutboundVideoTrack(_)))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_call_meta_is_reported_on_change_only() {
    let storages = StorageProvider::in_memory();
    join_clients(&storages, vec![client_config("call1", "c1", 1)]).await;
    let with_browser = |timestamp: u64, version: &str| ClientSample {
        timestamp,
        browser: Some(Browser {
            name: Some("firefox".to_string()),
            version: Some(version.to_string()),
        }),
        ..Default::default()
    };
    let calls = observed_calls(vec![(
        client_config("call1", "c1", 1),
        vec![
            with_browser(10, "120"),
            with_browser(20, "120"),
            with_browser(30, "121"),
        ],
    )]);

    let (tx, reports) = visit_calls(&storages, calls, false).await;

    let versions: Vec<_> = reports
        .iter()
        .filter_map(|r| match r {
            Report::CallMeta(meta) => match &meta.payload {
                CallMetaPayload::Browser(browser) => browser.version.clone(),
                _ => None,
            },
            _ => None,
        })
        .collect();
    assert_eq!(versions, vec!["120", "121"]);
    let client = tx.clients.get("c1").unwrap();
    assert_eq!(
        client.browser.as_ref().and_then(|b| b.version.as_deref()),
        Some("121")
    );
}

#[tokio::test]
async fn test_custom_call_events_are_reported() {
    let storages = StorageProvider::in_memory();
    join_clients(&storages, vec![client_config("call1", "c1", 1)]).await;
    let calls = observed_calls(vec![(
        client_config("call1", "c1", 1),
        vec![ClientSample {
            timestamp: 10,
            custom_call_events: vec![CustomCallEvent {
                name: "MUTED".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }],
    )]);

    let (_tx, reports) = visit_calls(&storages, calls, false).await;

    assert_eq!(call_event_names(&reports), vec!["MUTED"]);
}

#[tokio::test]
async fn test_fetch_samples_keeps_latest_stats_per_ssrc() {
    let storages = StorageProvider::in_memory();
    join_clients(&storages, vec![client_config("call1", "c1", 1)]).await;
    let calls = observed_calls(vec![(
        client_config("call1", "c1", 1),
        vec![
            tracks_sample(10, "pc1", "in1", "out1"),
            tracks_sample(20, "pc1", "in1", "out1"),
        ],
    )]);

    let (tx, reports) = visit_calls(&storages, calls, true).await;

    assert_eq!(tx.inbound_tracks.get("in1").unwrap().stats.len(), 1);
    assert_eq!(tx.outbound_tracks.get("out1").unwrap().stats.len(), 1);
    assert_eq!(tx.peer_connections.get("pc1").unwrap().transports.len(), 1);
    // one report per raw sample regardless of materialization
    assert_eq!(
        reports
            .iter()
            .filter(|r| matches!(r, Report::InboundAudioTrack(_)))
            .count(),
        2
    );
}

#[tokio::test]
async fn test_existing_track_keeps_its_kind() {
    let storages = StorageProvider::in_memory();
    join_clients(&storages, vec![client_config("call1", "c1", 1)]).await;
    let calls = observed_calls(vec![(
        client_config("call1", "c1", 1),
        vec![tracks_sample(10, "pc1", "in1", "out1")],
    )]);
    let (tx, _) = visit_calls(&storages, calls.clone(), false).await;
    let mut stored: InboundTrack = tx.inbound_tracks.get("in1").unwrap().clone();
    stored.kind = MediaKind::Video;
    storages
        .inbound_track_storage
        .set("in1".to_string(), stored)
        .await
        .unwrap();
    storages
        .peer_connection_storage
        .set(
            "pc1".to_string(),
            tx.peer_connections.get("pc1").unwrap().clone(),
        )
        .await
        .unwrap();

    let (tx, reports) = visit_calls(&storages, calls, false).await;

    assert_eq!(tx.inbound_tracks.get("in1").unwrap().kind, MediaKind::Video);
    assert!(reports
        .iter()
        .any(|r| matches!(r, Report::InboundVideoTrack(_))));
    assert_eq!(tx.peer_connections.get("pc1").unwrap().inbound_track_ids, vec!["in1"]);
}

#[tokio::test]
#[traced_test]
async fn test_track_reported_under_another_peer_connection_is_skipped() {
    let storages = StorageProvider::in_memory();
    join_clients(&storages, vec![client_config("call1", "c1", 1)]).await;
    let first = observed_calls(vec![(
        client_config("call1", "c1", 1),
        vec![tracks_sample(10, "pc1", "in1", "out1")],
    )]);
    let (tx, _) = visit_calls(&storages, first, false).await;
    storages
        .inbound_track_storage
        .set(
            "in1".to_string(),
            tx.inbound_tracks.get("in1").unwrap().clone(),
        )
        .await
        .unwrap();

    let moved = observed_calls(vec![(
        client_config("call1", "c1", 1),
        vec![tracks_sample(20, "pc2", "in1", "out2")],
    )]);
    let (tx, reports) = visit_calls(&storages, moved, false).await;

    assert!(logs_contain("Track in1 belongs to peer connection pc1, not pc2"));
    assert!(!tx.inbound_tracks.visited.contains("in1"));
    assert_eq!(tx.inbound_tracks.get("in1").unwrap().peer_connection_id, "pc1");
    let pc2 = tx.peer_connections.get("pc2").unwrap();
    assert!(pc2.inbound_track_ids.is_empty());
    assert_eq!(pc2.outbound_track_ids, vec!["out2"]);
    assert!(!reports
        .iter()
        .any(|r| matches!(r, Report::InboundAudioTrack(_))));
}

#[tokio::test]
#[traced_test]
async fn test_transport_already_listed_on_sfu_is_not_duplicated() {
    let storages = StorageProvider::in_memory();
    storages
        .sfu_storage
        .set(
            "sfu1".to_string(),
            Sfu {
                sfu_id: "sfu1".to_string(),
                sfu_transport_ids: vec!["t1".to_string()],
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let sfus = observed_sfus(vec![(sfu_config("sfu1", 5), vec![sfu_sample(10, "t1", "pad1")])]);

    let (tx, _) = visit_sfus(&storages, sfus).await;

    assert_eq!(tx.sfus.get("sfu1").unwrap().sfu_transport_ids, vec!["t1"]);
    assert!(tx.sfu_transports.get("t1").is_some());
    assert!(logs_contain("Transport t1 is already listed on sfu sfu1"));
}

#[tokio::test]
#[traced_test]
async fn test_pad_already_listed_on_transport_is_not_duplicated() {
    let storages = StorageProvider::in_memory();
    storages
        .sfu_storage
        .set(
            "sfu1".to_string(),
            Sfu {
                sfu_id: "sfu1".to_string(),
                sfu_transport_ids: vec!["t1".to_string()],
                ..Default::default()
            },
        )
        .await
        .unwrap();
    storages
        .sfu_transport_storage
        .set(
            "t1".to_string(),
            SfuTransport {
                sfu_id: "sfu1".to_string(),
                transport_id: "t1".to_string(),
                inbound_rtp_pad_ids: vec!["pad1".to_string()],
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let sfus = observed_sfus(vec![(sfu_config("sfu1", 5), vec![sfu_sample(10, "t1", "pad1")])]);

    let (tx, _) = visit_sfus(&storages, sfus).await;

    assert_eq!(
        tx.sfu_transports.get("t1").unwrap().inbound_rtp_pad_ids,
        vec!["pad1"]
    );
    assert!(tx.sfu_inbound_rtp_pads.get("pad1").is_some());
    assert!(logs_contain("Rtp pad pad1 is already listed on transport t1"));
}

#[tokio::test]
async fn test_new_sfu_joins_with_transport_and_pad() {
    let storages = StorageProvider::in_memory();
    let sfus = observed_sfus(vec![(
        sfu_config("sfu1", 5),
        vec![SfuSample {
            custom_sfu_events: vec![CustomSfuEvent {
                name: "RESTARTED".to_string(),
                ..Default::default()
            }],
            ..sfu_sample(10, "t1", "pad1")
        }],
    )]);

    let (tx, reports) = visit_sfus(&storages, sfus).await;

    assert_eq!(sfu_event_names(&reports), vec!["SFU_JOINED", "RESTARTED"]);
    let sfu = tx.sfus.get("sfu1").unwrap();
    assert_eq!(sfu.joined, 5);
    assert_eq!(sfu.sfu_transport_ids, vec!["t1"]);
    assert_eq!(sfu.touched, Some(NOW));
    let transport = tx.sfu_transports.get("t1").unwrap();
    assert_eq!(transport.inbound_rtp_pad_ids, vec!["pad1"]);
    let pad = tx.sfu_inbound_rtp_pads.get("pad1").unwrap();
    assert_eq!(pad.ssrc, Some(7));
    assert_eq!(pad.sfu_transport_id, "t1");
    assert!(reports.iter().any(|r| matches!(r, Report::SfuTransport(_))));
    assert!(reports.iter().any(|r| matches!(r, Report::SfuInboundRtpPad(_))));
}

#[tokio::test]
async fn test_known_sfu_does_not_rejoin() {
    let storages = StorageProvider::in_memory();
    let sfus = observed_sfus(vec![(sfu_config("sfu1", 5), vec![sfu_sample(10, "t1", "pad1")])]);
    let (tx, _) = visit_sfus(&storages, sfus.clone()).await;
    storages
        .sfu_storage
        .set("sfu1".to_string(), tx.sfus.get("sfu1").unwrap().clone())
        .await
        .unwrap();

    let (_tx, reports) = visit_sfus(&storages, sfus).await;

    assert!(sfu_event_names(&reports).is_empty());
}
