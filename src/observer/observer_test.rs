use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use super::*;
use crate::evaluator::TickOutcome;
use crate::reports::ReportsBuffer;
use crate::sources::NewClientSource;
use crate::test_utils::call_event_names;
use crate::test_utils::pc_sample;
use crate::test_utils::sfu_config;
use crate::test_utils::sfu_sample;
use crate::time::now_ms;
use crate::Error;
use crate::SourceError;
use crate::SourcesConfig;

fn observer() -> (Observer, Arc<ReportsBuffer>) {
    let reports = Arc::new(ReportsBuffer::new());
    let config = ObserverConfig {
        sources: SourcesConfig {
            max_samples: 1_000,
            max_time_in_ms: 0,
        },
        ..Default::default()
    };
    let observer = Observer::in_memory(config, reports.clone()).expect("valid config");
    (observer, reports)
}

async fn next_context(ticks: &mut broadcast::Receiver<TickReport>) -> Arc<EvaluatorContext> {
    let report = tokio::time::timeout(Duration::from_secs(5), ticks.recv())
        .await
        .expect("tick report in time")
        .expect("tick channel open");
    match report.outcome {
        TickOutcome::Completed(ctx) => ctx,
        TickOutcome::Failed(e) => panic!("tick {} failed: {}", report.tick_id, e),
    }
}

fn call_source(observer: &Observer) -> CallSource {
    observer.create_call_source(CallSourceConfig {
        service_id: "svc".to_string(),
        room_id: "room".to_string(),
        call_id: "call1".to_string(),
    })
}

fn new_client(client_id: &str) -> NewClientSource {
    NewClientSource {
        media_unit_id: "mu".to_string(),
        client_id: client_id.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_client_samples_become_ticks() {
    let (observer, reports) = observer();
    let mut ticks = observer.subscribe();
    let client = call_source(&observer)
        .create_client_source(new_client("c1"))
        .unwrap();

    client.accept(vec![pc_sample(now_ms(), "pc1")]).unwrap();
    observer.flush();
    let ctx = next_context(&mut ticks).await;
    assert_eq!(ctx.joined_client_ids, vec!["c1"]);
    assert_eq!(ctx.started_call_ids, vec!["call1"]);
    assert_eq!(ctx.opened_peer_connection_ids, vec!["pc1"]);
    assert_eq!(
        call_event_names(&reports.take()),
        vec!["CALL_STARTED", "CLIENT_JOINED", "PEER_CONNECTION_OPENED"]
    );

    client.close();
    observer.flush();
    let ctx = next_context(&mut ticks).await;
    assert_eq!(ctx.detached_clients.len(), 1);
    assert_eq!(ctx.closed_peer_connections.len(), 1);
    assert_eq!(ctx.ended_calls.len(), 1);
}

#[tokio::test]
async fn test_sfu_samples_join_the_sfu() {
    let (observer, _reports) = observer();
    let mut ticks = observer.subscribe();
    let sfu = observer.create_sfu_source(sfu_config("sfu1", now_ms())).unwrap();

    sfu.accept(vec![sfu_sample(now_ms(), "t1", "pad1")]).unwrap();
    observer.flush();
    let ctx = next_context(&mut ticks).await;
    assert_eq!(ctx.joined_sfu_ids, vec!["sfu1"]);
    assert_eq!(ctx.opened_sfu_transport_ids, vec!["t1"]);
    assert_eq!(ctx.added_sfu_inbound_rtp_pad_ids, vec!["pad1"]);
}

#[tokio::test]
async fn test_close_detaches_clients_in_a_final_tick() {
    let (observer, _reports) = observer();
    let mut ticks = observer.subscribe();
    let client = call_source(&observer)
        .create_client_source(new_client("c1"))
        .unwrap();
    client.accept(vec![pc_sample(now_ms(), "pc1")]).unwrap();
    observer.flush();
    next_context(&mut ticks).await;

    observer.close();
    observer.close();
    assert!(observer.is_closed());
    assert!(client.is_closed());

    let ctx = next_context(&mut ticks).await;
    assert_eq!(ctx.detached_clients.len(), 1);
    assert_eq!(ctx.ended_calls.len(), 1);

    let result = call_source(&observer).create_client_source(new_client("c2"));
    assert!(matches!(
        result,
        Err(Error::Source(SourceError::SourcesClosed))
    ));
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let config = ObserverConfig {
        sources: SourcesConfig {
            max_samples: 0,
            max_time_in_ms: 0,
        },
        ..Default::default()
    };
    let result = Observer::in_memory(config, Arc::new(ReportsBuffer::new()));
    assert!(matches!(result, Err(Error::Config(_))));
}
