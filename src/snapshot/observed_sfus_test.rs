use super::*;
use crate::samples::SfuInboundRtpPadSample;
use crate::samples::SfuOutboundRtpPadSample;
use crate::samples::SfuSample;
use crate::samples::SfuSctpChannelSample;
use crate::samples::SfuTransportSample;
use crate::sources::SfuSourceConfig;

fn source() -> SfuSourceConfig {
    SfuSourceConfig {
        service_id: "svc".to_string(),
        media_unit_id: "sfu-unit".to_string(),
        sfu_id: "sfu1".to_string(),
        marker: None,
        time_zone_id: None,
        joined: 5,
    }
}

fn sample(timestamp: u64) -> SfuSample {
    SfuSample {
        timestamp,
        transports: vec![SfuTransportSample {
            transport_id: Some("t1".to_string()),
            internal: true,
            ..Default::default()
        }],
        inbound_rtp_pads: vec![SfuInboundRtpPadSample {
            transport_id: Some("t1".to_string()),
            pad_id: Some("in-pad".to_string()),
            stream_id: Some("stream1".to_string()),
            ..Default::default()
        }],
        outbound_rtp_pads: vec![SfuOutboundRtpPadSample {
            transport_id: Some("t2".to_string()),
            pad_id: Some("out-pad".to_string()),
            sink_id: Some("sink1".to_string()),
            ..Default::default()
        }],
        sctp_channels: vec![SfuSctpChannelSample {
            transport_id: Some("t1".to_string()),
            channel_id: None,
            ..Default::default()
        }],
        ..Default::default()
    }
}

#[test]
fn test_build_routes_sfu_samples() {
    let mut builder = ObservedSfusBuilder::new();
    builder.add_sfu_samples(&source(), vec![sample(10), sample(20)]);

    let observed = builder.build();
    assert_eq!(observed.sfu_ids().collect::<Vec<_>>(), vec!["sfu1"]);

    let mut transport_ids: Vec<_> = observed.sfu_transport_ids().collect();
    transport_ids.sort();
    assert_eq!(transport_ids, vec!["t1", "t2"]);

    let t1 = observed.transport("t1").unwrap();
    assert!(t1.internal);
    assert_eq!(t1.samples().count(), 2);
    assert_eq!(observed.inbound_rtp_pads_of(t1).count(), 1);

    // A pad may reference a transport that has no transport sample yet
    let t2 = observed.transport("t2").unwrap();
    assert!(!t2.internal);
    let out_pad = observed.outbound_rtp_pads_of(t2).next().unwrap();
    assert_eq!(out_pad.scope.sfu_id, "sfu1");
    assert_eq!(out_pad.scope.sfu_transport_id, "t2");
    assert_eq!(out_pad.latest().and_then(|s| s.sink_id.as_deref()), Some("sink1"));

    // Channels without id are skipped
    assert_eq!(observed.sfu_sctp_channel_ids().count(), 0);

    let sfu = observed.sfu("sfu1").unwrap();
    assert_eq!(sfu.min_timestamp, 10);
    assert_eq!(sfu.max_timestamp, 20);
    assert_eq!(observed.transports_of(sfu).count(), 2);
}
