use std::sync::Arc;
use std::time::Duration;

use prometheus::Registry;
use rtc_observer::metrics::gather_text;
use rtc_observer::metrics::register_custom_metrics;
use rtc_observer::reports::ChannelReportsCollector;
use rtc_observer::reports::Report;
use rtc_observer::samples::ClientSample;
use rtc_observer::samples::InboundTrackSample;
use rtc_observer::samples::OutboundTrackSample;
use rtc_observer::samples::PeerConnectionTransportSample;
use rtc_observer::sources::CallSourceConfig;
use rtc_observer::sources::NewClientSource;
use rtc_observer::time::now_ms;
use rtc_observer::Error;
use rtc_observer::Observer;
use rtc_observer::ObserverConfig;
use rtc_observer::Result;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing_subscriber::EnvFilter;

const ROUNDS: usize = 10;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ObserverConfig::new()?;
    let registry = Registry::new_custom(Some("observer".to_string()), None)
        .map_err(|e| Error::Fatal(format!("metrics registry: {e}")))?;
    if config.monitoring.metrics_enabled {
        register_custom_metrics(&registry)
            .map_err(|e| Error::Fatal(format!("register metrics: {e}")))?;
    }

    let (collector, reports) = ChannelReportsCollector::new();
    let log_reports = tokio::spawn(log_reports(reports));

    let observer = Observer::in_memory(config, Arc::new(collector))?;
    let call = observer.create_call_source(CallSourceConfig {
        service_id: "demo-service".to_string(),
        room_id: "demo-room".to_string(),
        call_id: "demo-call".to_string(),
    });
    let alice = call.create_client_source(new_client("alice"))?;
    let bob = call.create_client_source(new_client("bob"))?;

    let mut interval = tokio::time::interval(Duration::from_millis(250));
    for round in 0..ROUNDS {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C detected.");
                break;
            }
            _ = interval.tick() => {}
        }
        alice.accept(vec![client_sample("alice")])?;
        if round < ROUNDS / 2 {
            bob.accept(vec![client_sample("bob")])?;
        } else if !bob.is_closed() {
            info!("bob leaves the call");
            bob.close();
        }
    }

    observer.close();
    // let the final tick finish before the reports channel closes
    tokio::time::sleep(Duration::from_millis(500)).await;
    drop(observer);
    if let Err(e) = log_reports.await {
        error!("report logger stopped: {:?}", e);
    }

    match gather_text(&registry) {
        Ok(text) => println!("{text}"),
        Err(e) => error!("failed to gather metrics: {:?}", e),
    }
    println!("Exiting program.");
    Ok(())
}

fn new_client(client_id: &str) -> NewClientSource {
    NewClientSource {
        media_unit_id: "demo-media-unit".to_string(),
        client_id: client_id.to_string(),
        user_id: Some(format!("user-{client_id}")),
        ..Default::default()
    }
}

fn client_sample(client_id: &str) -> ClientSample {
    let peer_connection_id = format!("{client_id}-pc");
    ClientSample {
        timestamp: now_ms(),
        pc_transports: vec![PeerConnectionTransportSample {
            peer_connection_id: Some(peer_connection_id.clone()),
            ..Default::default()
        }],
        inbound_audio_tracks: vec![InboundTrackSample {
            peer_connection_id: Some(peer_connection_id.clone()),
            track_id: Some(format!("{client_id}-in-audio")),
            ssrc: 1,
            ..Default::default()
        }],
        outbound_video_tracks: vec![OutboundTrackSample {
            peer_connection_id: Some(peer_connection_id),
            track_id: Some(format!("{client_id}-out-video")),
            ssrc: 2,
            ..Default::default()
        }],
        ..Default::default()
    }
}

async fn log_reports(mut reports: mpsc::UnboundedReceiver<Report>) {
    let mut received = 0usize;
    while let Some(report) = reports.recv().await {
        received += 1;
        match &report {
            Report::CallEvent(event) => info!(name = %event.name, "call event"),
            Report::SfuEvent(event) => info!(name = %event.name, "sfu event"),
            other => debug!(report = ?other, "report"),
        }
    }
    info!(received, "reports stream closed");
}
