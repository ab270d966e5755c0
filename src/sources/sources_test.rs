use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing_test::traced_test;

use super::*;
use crate::samples::ClientSample;
use crate::samples::SfuSample;
use crate::Error;

fn sources_with(
    max_samples: usize,
    max_time_in_ms: u64,
) -> (Sources, mpsc::UnboundedReceiver<SourcesEvent>, watch::Sender<()>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let (sources, events) = Sources::new(
        SourcesConfig {
            max_samples,
            max_time_in_ms,
        },
        shutdown_rx,
    );
    (sources, events, shutdown_tx)
}

fn call_source(sources: &Sources) -> CallSource {
    sources.create_call_source(CallSourceConfig {
        service_id: "svc".to_string(),
        room_id: "room".to_string(),
        call_id: "call1".to_string(),
    })
}

fn new_client(client_id: &str) -> NewClientSource {
    NewClientSource {
        media_unit_id: "mu".to_string(),
        client_id: client_id.to_string(),
        joined: Some(1),
        ..Default::default()
    }
}

fn samples(n: usize) -> Vec<ClientSample> {
    (0..n)
        .map(|i| ClientSample {
            timestamp: i as u64,
            ..Default::default()
        })
        .collect()
}

fn next_observed(events: &mut mpsc::UnboundedReceiver<SourcesEvent>) -> Option<ObservedSamples> {
    while let Ok(event) = events.try_recv() {
        if let SourcesEvent::ObservedSamples(observed) = event {
            return Some(observed);
        }
    }
    None
}

#[tokio::test]
async fn test_flush_when_max_samples_reached() {
    let (sources, mut events, _shutdown) = sources_with(3, 0);
    let client = call_source(&sources)
        .create_client_source(new_client("c1"))
        .unwrap();

    client.accept(samples(2)).unwrap();
    assert!(next_observed(&mut events).is_none());
    assert_eq!(sources.pending_samples(), 2);

    client.accept(samples(1)).unwrap();
    let observed = next_observed(&mut events).expect("flushed");
    assert_eq!(observed.number_of_samples, 3);
    assert_eq!(observed.observed_calls.client("c1").unwrap().samples().count(), 3);
    assert_eq!(sources.pending_samples(), 0);
}

#[tokio::test]
async fn test_every_sample_lands_in_exactly_one_snapshot() {
    let (sources, mut events, _shutdown) = sources_with(4, 0);
    let call = call_source(&sources);
    let c1 = call.create_client_source(new_client("c1")).unwrap();
    let c2 = call.create_client_source(new_client("c2")).unwrap();

    for _ in 0..5 {
        c1.accept(samples(1)).unwrap();
        c2.accept(samples(1)).unwrap();
    }
    sources.flush();

    let mut total = 0;
    while let Some(observed) = next_observed(&mut events) {
        let in_snapshot: usize = ["c1", "c2"]
            .iter()
            .filter_map(|id| observed.observed_calls.client(id))
            .map(|c| c.samples().count())
            .sum();
        assert_eq!(in_snapshot, observed.number_of_samples);
        total += in_snapshot;
    }
    assert_eq!(total, 10);
}

#[tokio::test(start_paused = true)]
async fn test_timer_flushes_and_rearms() {
    let (sources, mut events, _shutdown) = sources_with(0, 100);
    let client = call_source(&sources)
        .create_client_source(new_client("c1"))
        .unwrap();
    client.accept(samples(1)).unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    let first = next_observed(&mut events).expect("timer flush");
    assert_eq!(first.number_of_samples, 1);

    // Empty snapshots keep flowing so idle entities can be swept
    tokio::time::sleep(Duration::from_millis(100)).await;
    let second = next_observed(&mut events).expect("rearmed timer flush");
    assert_eq!(second.number_of_samples, 0);
    assert!(second.observed_calls.is_empty());
}

#[tokio::test]
async fn test_accept_after_close_fails() {
    let (sources, mut events, _shutdown) = sources_with(10, 0);
    let client = call_source(&sources)
        .create_client_source(new_client("c1"))
        .unwrap();
    client.close();
    client.close();

    let result = client.accept(samples(1));
    assert!(matches!(result, Err(Error::Source(SourceError::Closed { .. }))));
    assert_eq!(sources.number_of_client_sources(), 0);

    let mut removed = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SourcesEvent::RemovedClientSource(_)) {
            removed += 1;
        }
    }
    assert_eq!(removed, 1);
}

#[tokio::test]
#[traced_test]
async fn test_duplicate_client_source_returns_existing() {
    let (sources, _events, _shutdown) = sources_with(10, 0);
    let call = call_source(&sources);
    let first = call.create_client_source(new_client("c1")).unwrap();
    let second = call.create_client_source(new_client("c1")).unwrap();

    assert!(first.same_source(&second));
    assert_eq!(sources.number_of_client_sources(), 1);
    assert_eq!(call.client_sources().len(), 1);
    assert!(logs_contain("Attempted to add a ClientSource for client c1 twice"));
}

#[tokio::test]
async fn test_call_source_close_closes_clients() {
    let (sources, mut events, _shutdown) = sources_with(10, 0);
    let call = call_source(&sources);
    let c1 = call.create_client_source(new_client("c1")).unwrap();
    let c2 = call.create_client_source(new_client("c2")).unwrap();

    call.close();
    assert!(c1.is_closed());
    assert!(c2.is_closed());

    let mut added = 0;
    let mut removed = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            SourcesEvent::AddedClientSource(_) => added += 1,
            SourcesEvent::RemovedClientSource(_) => removed += 1,
            _ => {}
        }
    }
    assert_eq!((added, removed), (2, 2));
}

#[tokio::test]
async fn test_sources_close_flushes_and_rejects() {
    let (sources, mut events, _shutdown) = sources_with(10, 0);
    let client = call_source(&sources)
        .create_client_source(new_client("c1"))
        .unwrap();
    let sfu = sources
        .create_sfu_source(SfuSourceConfig {
            service_id: "svc".to_string(),
            media_unit_id: "mu".to_string(),
            sfu_id: "sfu1".to_string(),
            marker: None,
            time_zone_id: None,
            joined: 1,
        })
        .unwrap();
    client.accept(samples(2)).unwrap();
    sfu.accept(vec![SfuSample::default()]).unwrap();

    sources.close();
    assert!(sources.is_closed());
    assert!(client.is_closed());
    assert!(sfu.is_closed());

    let observed = next_observed(&mut events).expect("final flush");
    assert_eq!(observed.number_of_samples, 3);
    assert!(observed.observed_sfus.sfu("sfu1").is_some());

    assert!(sources.create_client_source(client.config().clone()).is_err());
}

#[tokio::test]
async fn test_dropping_sources_stops_the_idle_flush_timer() {
    let (sources, mut events, _shutdown) = sources_with(0, 1_000);
    drop(sources);

    let closed = tokio::time::timeout(Duration::from_secs(3), async {
        while events.recv().await.is_some() {}
    })
    .await;
    assert!(closed.is_ok(), "events channel stays open after the sources are dropped");
}

#[tokio::test]
async fn test_dropping_sources_stops_an_armed_flush_timer() {
    let (sources, mut events, _shutdown) = sources_with(0, 60_000);
    let client = call_source(&sources)
        .create_client_source(new_client("c1"))
        .unwrap();
    client.accept(samples(1)).unwrap();
    drop(client);
    drop(sources);

    let closed = tokio::time::timeout(Duration::from_secs(3), async {
        while events.recv().await.is_some() {}
    })
    .await;
    assert!(closed.is_ok(), "events channel stays open after the sources are dropped");
}
