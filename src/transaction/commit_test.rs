use std::sync::Arc;

use tracing_test::traced_test;

use super::*;
use crate::middleware::Processor;
use crate::models::PeerConnection;
use crate::reports::ReportsBuffer;
use crate::snapshot::ObservedSfus;
use crate::storage::StorageProvider;
use crate::test_utils::call_event_names;
use crate::test_utils::client_config;
use crate::test_utils::join_clients;
use crate::test_utils::observed_calls;
use crate::test_utils::observed_sfus;
use crate::test_utils::run_transaction;
use crate::test_utils::sfu_config;
use crate::test_utils::sfu_sample;
use crate::test_utils::tick_context;
use crate::test_utils::tracks_sample;
use crate::EvaluatorConfig;

const NOW: u64 = 1_000_000;
const MAX_IDLE: u64 = 60_000;

fn config() -> EvaluatorConfig {
    EvaluatorConfig {
        fetch_samples: false,
        max_idle_time_in_ms: MAX_IDLE,
    }
}

#[tokio::test]
async fn test_commit_reports_added_then_removed_entries() {
    let storages = StorageProvider::in_memory();
    let reports = Arc::new(ReportsBuffer::new());
    join_clients(&storages, vec![client_config("call1", "c1", 1)]).await;
    let calls = observed_calls(vec![(
        client_config("call1", "c1", 1),
        vec![tracks_sample(NOW, "pc1", "in1", "out1")],
    )]);

    // first sight
    let tx = run_transaction(
        &config(),
        &storages,
        reports.clone(),
        tick_context(1, NOW, calls.clone(), Arc::new(ObservedSfus::default())),
    )
    .await;
    let ctx = tx.into_evaluator_context();
    assert_eq!(ctx.opened_peer_connection_ids, vec!["pc1"]);
    assert_eq!(ctx.added_inbound_track_ids, vec!["in1"]);
    assert_eq!(ctx.added_outbound_track_ids, vec!["out1"]);
    assert_eq!(
        call_event_names(&reports.take()),
        vec![
            "PEER_CONNECTION_OPENED",
            "MEDIA_TRACK_ADDED",
            "MEDIA_TRACK_ADDED"
        ]
    );
    let client = storages.client_storage.get("c1").await.unwrap().unwrap();
    assert_eq!(client.peer_connection_ids, vec!["pc1"]);
    let pc = storages.peer_connection_storage.get("pc1").await.unwrap().unwrap();
    assert_eq!(pc.touched, Some(NOW));

    // seen again: nothing new
    let tx = run_transaction(
        &config(),
        &storages,
        reports.clone(),
        tick_context(2, NOW + 1_000, calls, Arc::new(ObservedSfus::default())),
    )
    .await;
    let ctx = tx.into_evaluator_context();
    assert!(ctx.is_unchanged());
    assert!(call_event_names(&reports.take()).is_empty());

    // silent past the grace period
    let later = NOW + 1_000 + MAX_IDLE;
    let tx = run_transaction(
        &config(),
        &storages,
        reports.clone(),
        tick_context(
            3,
            later,
            observed_calls(vec![]),
            Arc::new(ObservedSfus::default()),
        ),
    )
    .await;
    let ctx = tx.into_evaluator_context();
    assert_eq!(ctx.closed_peer_connections.len(), 1);
    assert_eq!(ctx.closed_peer_connections[0].removed, later);
    assert_eq!(ctx.removed_inbound_tracks.len(), 1);
    assert_eq!(ctx.removed_outbound_tracks.len(), 1);
    assert_eq!(
        call_event_names(&reports.take()),
        vec![
            "PEER_CONNECTION_CLOSED",
            "MEDIA_TRACK_REMOVED",
            "MEDIA_TRACK_REMOVED"
        ]
    );
    assert!(storages.peer_connection_storage.get("pc1").await.unwrap().is_none());
    assert!(storages.inbound_track_storage.get("in1").await.unwrap().is_none());
    assert!(storages.outbound_track_storage.get("out1").await.unwrap().is_none());
    let client = storages.client_storage.get("c1").await.unwrap().unwrap();
    assert!(client.peer_connection_ids.is_empty());
}

#[tokio::test]
#[traced_test]
async fn test_delete_wins_over_update() {
    let storages = StorageProvider::in_memory();
    storages
        .peer_connection_storage
        .set(
            "pc1".to_string(),
            PeerConnection {
                peer_connection_id: "pc1".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let mut tx = TransactionContext::load(
        tick_context(1, NOW, observed_calls(vec![]), Arc::new(ObservedSfus::default())),
        &storages,
    )
    .await
    .unwrap();
    tx.peer_connections.updated.insert(
        "pc1".to_string(),
        PeerConnection {
            peer_connection_id: "pc1".to_string(),
            label: Some("updated".to_string()),
            ..Default::default()
        },
    );
    tx.peer_connections.deleted.insert("pc1".to_string());

    let processor = Processor::new("test");
    processor.add_middleware(Arc::new(CommitTransactionMiddleware::new(
        storages.clone(),
        Arc::new(ReportsBuffer::new()),
    )));
    processor.process(&mut tx).await.unwrap();

    assert!(storages.peer_connection_storage.get("pc1").await.unwrap().is_none());
    let ctx = tx.into_evaluator_context();
    assert!(ctx.opened_peer_connection_ids.is_empty());
    assert_eq!(ctx.closed_peer_connections.len(), 1);
    assert_eq!(ctx.closed_peer_connections[0].entry.label, None);
    assert!(logs_contain("peer_connection pc1 is both updated and deleted"));
}

#[tokio::test]
async fn test_commit_records_sfu_deltas() {
    let storages = StorageProvider::in_memory();
    let sfus = observed_sfus(vec![(sfu_config("sfu1", 5), vec![sfu_sample(NOW, "t1", "pad1")])]);

    let tx = run_transaction(
        &config(),
        &storages,
        Arc::new(ReportsBuffer::new()),
        tick_context(1, NOW, observed_calls(vec![]), sfus),
    )
    .await;
    let ctx = tx.into_evaluator_context();

    assert_eq!(ctx.joined_sfu_ids, vec!["sfu1"]);
    assert_eq!(ctx.opened_sfu_transport_ids, vec!["t1"]);
    assert_eq!(ctx.added_sfu_inbound_rtp_pad_ids, vec!["pad1"]);
    let sfu = storages.sfu_storage.get("sfu1").await.unwrap().unwrap();
    assert_eq!(sfu.sfu_transport_ids, vec!["t1"]);

    let tx = run_transaction(
        &config(),
        &storages,
        Arc::new(ReportsBuffer::new()),
        tick_context(
            2,
            NOW + MAX_IDLE,
            observed_calls(vec![]),
            Arc::new(ObservedSfus::default()),
        ),
    )
    .await;
    let ctx = tx.into_evaluator_context();
    assert_eq!(ctx.detached_sfus.len(), 1);
    assert_eq!(ctx.closed_sfu_transports.len(), 1);
    assert_eq!(ctx.removed_sfu_inbound_rtp_pads.len(), 1);
    assert_eq!(storages.sfu_storage.size().await.unwrap(), 0);
}
