use std::collections::HashMap;
use std::sync::Arc;

use tracing_test::traced_test;

use super::*;
use crate::models::Call;
use crate::models::Client;
use crate::models::InboundTrack;
use crate::models::MediaKind;
use crate::models::OutboundTrack;
use crate::models::PeerConnection;
use crate::reports::ReportsBuffer;
use crate::storage::MockObserverStorage;
use crate::test_utils::call_event_names;
use crate::test_utils::client_config;

fn setup() -> (StorageProvider, Arc<ReportsBuffer>, Processor<CallOperationsContext>) {
    let storages = StorageProvider::in_memory();
    let reports = Arc::new(ReportsBuffer::new());
    let processor = create_call_processor(storages.clone(), reports.clone());
    (storages, reports, processor)
}

fn joins(configs: Vec<ClientSourceConfig>) -> CallOperationsContext {
    CallOperationsContext {
        joined_clients: configs,
        ..Default::default()
    }
}

fn detaches(clients: Vec<(&str, &str, Timestamp)>) -> CallOperationsContext {
    CallOperationsContext {
        detached_clients: clients
            .into_iter()
            .map(|(call_id, client_id, detached)| DetachedClient {
                client_id: client_id.to_string(),
                call_id: call_id.to_string(),
                detached,
            })
            .collect(),
        ..Default::default()
    }
}

async fn store_peer_connection(
    storages: &StorageProvider,
    client_id: &str,
    pc_id: &str,
) {
    let mut client = storages.client_storage.get(client_id).await.unwrap().unwrap();
    client.peer_connection_ids.push(pc_id.to_string());
    storages
        .client_storage
        .set(client_id.to_string(), client.clone())
        .await
        .unwrap();

    let pc = PeerConnection {
        call_id: client.call_id.clone(),
        client_id: client_id.to_string(),
        peer_connection_id: pc_id.to_string(),
        inbound_track_ids: vec![format!("{pc_id}-in")],
        outbound_track_ids: vec![format!("{pc_id}-out")],
        ..Default::default()
    };
    storages
        .peer_connection_storage
        .set(pc_id.to_string(), pc)
        .await
        .unwrap();
    storages
        .inbound_track_storage
        .set(
            format!("{pc_id}-in"),
            InboundTrack {
                service_id: "svc".to_string(),
                media_unit_id: "mu".to_string(),
                room_id: "room".to_string(),
                call_id: client.call_id.clone(),
                client_id: client_id.to_string(),
                user_id: None,
                marker: None,
                peer_connection_id: pc_id.to_string(),
                track_id: format!("{pc_id}-in"),
                kind: MediaKind::Audio,
                ssrcs: vec![1],
                sfu_stream_id: None,
                sfu_sink_id: None,
                added: 1,
                touched: Some(1),
                stats: Vec::new(),
            },
        )
        .await
        .unwrap();
    storages
        .outbound_track_storage
        .set(
            format!("{pc_id}-out"),
            OutboundTrack {
                service_id: "svc".to_string(),
                media_unit_id: "mu".to_string(),
                room_id: "room".to_string(),
                call_id: client.call_id.clone(),
                client_id: client_id.to_string(),
                user_id: None,
                marker: None,
                peer_connection_id: pc_id.to_string(),
                track_id: format!("{pc_id}-out"),
                kind: MediaKind::Video,
                ssrcs: vec![2],
                sfu_stream_id: None,
                added: 1,
                touched: Some(1),
                stats: Vec::new(),
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_join_creates_call_shared_by_clients() {
    let (storages, reports, processor) = setup();
    let mut ctx = joins(vec![
        client_config("call1", "c1", 10),
        client_config("call1", "c2", 20),
    ]);

    processor.process(&mut ctx).await.unwrap();

    let call = storages.call_storage.get("call1").await.unwrap().unwrap();
    assert_eq!(call.client_ids, vec!["c1", "c2"]);
    assert_eq!(call.started, 10);
    assert!(storages.client_storage.get("c1").await.unwrap().is_some());
    assert!(storages.client_storage.get("c2").await.unwrap().is_some());

    assert_eq!(
        call_event_names(&reports.take()),
        vec!["CALL_STARTED", "CLIENT_JOINED", "CLIENT_JOINED"]
    );
    assert_eq!(ctx.evaluator_context.started_call_ids, vec!["call1"]);
    assert_eq!(ctx.evaluator_context.joined_client_ids, vec!["c1", "c2"]);
}

#[tokio::test]
async fn test_join_into_existing_call_does_not_restart_it() {
    let (storages, reports, processor) = setup();
    processor
        .process(&mut joins(vec![client_config("call1", "c1", 10)]))
        .await
        .unwrap();
    reports.take();

    let mut ctx = joins(vec![client_config("call1", "c2", 20)]);
    processor.process(&mut ctx).await.unwrap();

    let call = storages.call_storage.get("call1").await.unwrap().unwrap();
    assert_eq!(call.client_ids, vec!["c1", "c2"]);
    assert_eq!(call.started, 10);
    assert_eq!(call_event_names(&reports.take()), vec!["CLIENT_JOINED"]);
    assert!(ctx.evaluator_context.started_call_ids.is_empty());
}

#[tokio::test]
#[traced_test]
async fn test_join_same_client_twice_is_skipped() {
    let (_storages, reports, processor) = setup();
    processor
        .process(&mut joins(vec![client_config("call1", "c1", 10)]))
        .await
        .unwrap();
    reports.take();

    let mut ctx = joins(vec![client_config("call1", "c1", 10)]);
    processor.process(&mut ctx).await.unwrap();

    assert!(reports.is_empty());
    assert!(ctx.evaluator_context.joined_client_ids.is_empty());
    assert!(logs_contain("Client c1 has already joined call call1"));
}

#[tokio::test]
async fn test_join_merges_call_inserted_concurrently() {
    let concurrent = Call {
        service_id: "svc".to_string(),
        room_id: "room".to_string(),
        call_id: "call1".to_string(),
        started: 5,
        client_ids: vec!["other".to_string()],
    };

    let mut call_storage = MockObserverStorage::<Call>::new();
    call_storage
        .expect_get_all()
        .returning(|_| Ok(HashMap::new()));
    let existing = concurrent.clone();
    call_storage
        .expect_insert_all()
        .times(1)
        .returning(move |_| Ok(HashMap::from([("call1".to_string(), existing.clone())])));
    call_storage
        .expect_set_all()
        .withf(|calls| {
            calls
                .get("call1")
                .is_some_and(|call| call.client_ids == vec!["other", "c1"] && call.started == 5)
        })
        .times(1)
        .returning(|_| Ok(HashMap::new()));

    let storages = StorageProvider {
        call_storage: Arc::new(call_storage),
        ..StorageProvider::in_memory()
    };
    let reports = Arc::new(ReportsBuffer::new());
    let processor = create_call_processor(storages, reports.clone());

    let mut ctx = joins(vec![client_config("call1", "c1", 10)]);
    processor.process(&mut ctx).await.unwrap();

    assert_eq!(call_event_names(&reports.take()), vec!["CLIENT_JOINED"]);
    assert!(ctx.evaluator_context.started_call_ids.is_empty());
}

#[tokio::test]
async fn test_detach_last_client_cascades_and_ends_call() {
    let (storages, reports, processor) = setup();
    processor
        .process(&mut joins(vec![client_config("call1", "c1", 10)]))
        .await
        .unwrap();
    store_peer_connection(&storages, "c1", "pc1").await;
    reports.take();

    let mut ctx = detaches(vec![("call1", "c1", 500)]);
    processor.process(&mut ctx).await.unwrap();

    assert!(storages.client_storage.get("c1").await.unwrap().is_none());
    assert!(storages.peer_connection_storage.get("pc1").await.unwrap().is_none());
    assert!(storages.inbound_track_storage.get("pc1-in").await.unwrap().is_none());
    assert!(storages.outbound_track_storage.get("pc1-out").await.unwrap().is_none());
    assert!(storages.call_storage.get("call1").await.unwrap().is_none());

    assert_eq!(
        call_event_names(&reports.take()),
        vec![
            "PEER_CONNECTION_CLOSED",
            "MEDIA_TRACK_REMOVED",
            "MEDIA_TRACK_REMOVED",
            "CLIENT_LEFT",
            "CALL_ENDED"
        ]
    );

    let evaluator_context = &ctx.evaluator_context;
    assert_eq!(evaluator_context.detached_clients.len(), 1);
    assert_eq!(evaluator_context.detached_clients[0].removed, 500);
    assert_eq!(evaluator_context.closed_peer_connections.len(), 1);
    assert_eq!(evaluator_context.removed_inbound_tracks.len(), 1);
    assert_eq!(evaluator_context.removed_outbound_tracks.len(), 1);
    assert_eq!(evaluator_context.ended_calls.len(), 1);
    assert_eq!(evaluator_context.ended_calls[0].removed, 500);
}

#[tokio::test]
async fn test_detach_one_of_two_clients_keeps_call() {
    let (storages, reports, processor) = setup();
    processor
        .process(&mut joins(vec![
            client_config("call1", "c1", 10),
            client_config("call1", "c2", 10),
        ]))
        .await
        .unwrap();
    reports.take();

    let mut ctx = detaches(vec![("call1", "c1", 100)]);
    processor.process(&mut ctx).await.unwrap();

    let call = storages.call_storage.get("call1").await.unwrap().unwrap();
    assert_eq!(call.client_ids, vec!["c2"]);
    assert_eq!(call_event_names(&reports.take()), vec!["CLIENT_LEFT"]);
    assert!(ctx.evaluator_context.ended_calls.is_empty());
}

#[tokio::test]
async fn test_detach_both_clients_ends_call_at_latest_detach() {
    let (_storages, reports, processor) = setup();
    processor
        .process(&mut joins(vec![
            client_config("call1", "c1", 10),
            client_config("call1", "c2", 10),
        ]))
        .await
        .unwrap();
    reports.take();

    let mut ctx = detaches(vec![("call1", "c1", 300), ("call1", "c2", 200)]);
    processor.process(&mut ctx).await.unwrap();

    assert_eq!(
        call_event_names(&reports.take()),
        vec!["CLIENT_LEFT", "CLIENT_LEFT", "CALL_ENDED"]
    );
    assert_eq!(ctx.evaluator_context.ended_calls[0].removed, 300);
}

#[tokio::test]
async fn test_detach_absent_client_is_noop() {
    let (storages, reports, processor) = setup();
    let mut ctx = detaches(vec![("call1", "ghost", 100)]);

    processor.process(&mut ctx).await.unwrap();

    assert!(reports.is_empty());
    assert!(ctx.evaluator_context.detached_clients.is_empty());
    assert_eq!(storages.call_storage.size().await.unwrap(), 0);
}

#[tokio::test]
async fn test_join_and_detach_in_same_tick() {
    let (storages, _reports, processor) = setup();
    processor
        .process(&mut joins(vec![client_config("call1", "c1", 10)]))
        .await
        .unwrap();

    let mut ctx = detaches(vec![("call1", "c1", 100)]);
    ctx.joined_clients.push(client_config("call2", "c2", 100));
    processor.process(&mut ctx).await.unwrap();

    assert!(storages.call_storage.get("call1").await.unwrap().is_none());
    let client: Client = storages.client_storage.get("c2").await.unwrap().unwrap();
    assert_eq!(client.call_id, "call2");
    assert_eq!(ctx.evaluator_context.joined_client_ids, vec!["c2"]);
    assert_eq!(ctx.evaluator_context.detached_clients.len(), 1);
}
