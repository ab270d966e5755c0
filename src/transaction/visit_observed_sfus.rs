use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::TransactionContext;
use crate::middleware::Middleware;
use crate::middleware::Next;
use crate::models::push_unique;
use crate::models::Sfu;
use crate::models::SfuInboundRtpPad;
use crate::models::SfuOutboundRtpPad;
use crate::models::SfuSctpChannel;
use crate::models::SfuTransport;
use crate::reports::Report;
use crate::reports::ReportsCollector;
use crate::reports::SfuEventReport;
use crate::reports::SfuExtensionReport;
use crate::reports::SfuReportHeader;
use crate::reports::SfuStatsReport;
use crate::snapshot::ObservedSfu;
use crate::snapshot::ObservedSfuInboundRtpPad;
use crate::snapshot::ObservedSfuOutboundRtpPad;
use crate::snapshot::ObservedSfuSctpChannel;
use crate::snapshot::ObservedSfuTransport;
use crate::snapshot::ObservedSfus;
use crate::time::Timestamp;
use crate::Result;

/// Reconciles the media server side of the snapshot. SFUs join implicitly with their
/// first sample.
pub struct VisitObservedSfusMiddleware {
    reports: Arc<dyn ReportsCollector>,
}

impl VisitObservedSfusMiddleware {
    pub fn new(reports: Arc<dyn ReportsCollector>) -> Self {
        Self { reports }
    }

    fn visit(
        &self,
        tx: &mut TransactionContext,
    ) {
        let observed = tx.observed_sfus();
        let now = tx.created;

        for observed_sfu in observed.sfus() {
            let sfu_id = observed_sfu.sfu_id.as_str();
            let sfu = tx
                .sfus
                .updated
                .entry(sfu_id.to_string())
                .or_insert_with(|| {
                    let sfu = new_sfu(observed_sfu);
                    debug!(sfu_id = %sfu.sfu_id, "sfu joined");
                    self.reports
                        .add_report(Report::SfuEvent(SfuEventReport::sfu_joined(&sfu, sfu.joined)));
                    sfu
                });

            for sample in observed_sfu.samples() {
                for event in &sample.custom_sfu_events {
                    self.reports.add_report(Report::SfuEvent(SfuEventReport::custom(
                        sfu,
                        event,
                        sample.timestamp,
                    )));
                }
                for extension in &sample.extension_stats {
                    self.reports.add_report(Report::SfuExtension(SfuExtensionReport {
                        header: sfu_header(sfu, sample.timestamp),
                        extension: extension.clone(),
                    }));
                }
            }
            tx.sfus.visit(sfu_id, now);

            self.visit_transports(tx, &observed, observed_sfu, now);
        }
    }

    fn visit_transports(
        &self,
        tx: &mut TransactionContext,
        observed: &ObservedSfus,
        observed_sfu: &ObservedSfu,
        now: Timestamp,
    ) {
        for observed_transport in observed.transports_of(observed_sfu) {
            let transport_id = observed_transport.transport_id.as_str();
            if !tx.sfu_transports.updated.contains_key(transport_id) {
                if let Some(sfu) = tx.sfus.get_mut(&observed_sfu.sfu_id) {
                    if !push_unique(&mut sfu.sfu_transport_ids, transport_id) {
                        warn!(
                            "Transport {} is already listed on sfu {}",
                            transport_id, sfu.sfu_id
                        );
                    }
                }
                tx.sfu_transports.updated.insert(
                    transport_id.to_string(),
                    new_transport(observed_transport),
                );
            }
            let Some(transport) = tx.sfu_transports.get_mut(transport_id) else {
                continue;
            };
            transport.internal = observed_transport.internal;
            for stamped in observed_transport.samples() {
                self.reports.add_report(Report::SfuTransport(SfuStatsReport {
                    header: scope_header(observed_transport, stamped.timestamp),
                    transport_id: transport_id.to_string(),
                    stats: stamped.sample.clone(),
                }));
            }
            tx.sfu_transports.visit(transport_id, now);

            for pad in observed.inbound_rtp_pads_of(observed_transport) {
                self.visit_inbound_rtp_pad(tx, pad, now);
            }
            for pad in observed.outbound_rtp_pads_of(observed_transport) {
                self.visit_outbound_rtp_pad(tx, pad, now);
            }
            for channel in observed.sctp_channels_of(observed_transport) {
                self.visit_sctp_channel(tx, channel, now);
            }
        }
    }

    fn visit_inbound_rtp_pad(
        &self,
        tx: &mut TransactionContext,
        observed_pad: &ObservedSfuInboundRtpPad,
        now: Timestamp,
    ) {
        let pad_id = observed_pad.id.as_str();
        let transport_id = observed_pad.scope.sfu_transport_id.as_str();
        if !tx.sfu_inbound_rtp_pads.updated.contains_key(pad_id) {
            if let Some(transport) = tx.sfu_transports.get_mut(transport_id) {
                if !push_unique(&mut transport.inbound_rtp_pad_ids, pad_id) {
                    warn!(
                        "Rtp pad {} is already listed on transport {}",
                        pad_id, transport_id
                    );
                }
            }
        }
        let pad = tx
            .sfu_inbound_rtp_pads
            .updated
            .entry(pad_id.to_string())
            .or_insert_with(|| SfuInboundRtpPad {
                service_id: observed_pad.scope.service_id.clone(),
                media_unit_id: observed_pad.scope.media_unit_id.clone(),
                sfu_id: observed_pad.scope.sfu_id.clone(),
                sfu_transport_id: transport_id.to_string(),
                rtp_pad_id: pad_id.to_string(),
                added: observed_pad.min_timestamp,
                ..Default::default()
            });
        if let Some(latest) = observed_pad.latest() {
            pad.internal = latest.internal;
            if latest.ssrc.is_some() {
                pad.ssrc = latest.ssrc;
            }
        }
        if observed_pad.stream_id.is_some() {
            pad.stream_id = observed_pad.stream_id.clone();
        }
        for stamped in observed_pad.samples() {
            self.reports.add_report(Report::SfuInboundRtpPad(SfuStatsReport {
                header: scope_header(&observed_pad.scope, stamped.timestamp),
                transport_id: transport_id.to_string(),
                stats: stamped.sample.clone(),
            }));
        }
        tx.sfu_inbound_rtp_pads.visit(pad_id, now);
    }

    fn visit_outbound_rtp_pad(
        &self,
        tx: &mut TransactionContext,
        observed_pad: &ObservedSfuOutboundRtpPad,
        now: Timestamp,
    ) {
        let pad_id = observed_pad.id.as_str();
        let transport_id = observed_pad.scope.sfu_transport_id.as_str();
        if !tx.sfu_outbound_rtp_pads.updated.contains_key(pad_id) {
            if let Some(transport) = tx.sfu_transports.get_mut(transport_id) {
                if !push_unique(&mut transport.outbound_rtp_pad_ids, pad_id) {
                    warn!(
                        "Rtp pad {} is already listed on transport {}",
                        pad_id, transport_id
                    );
                }
            }
        }
        let pad = tx
            .sfu_outbound_rtp_pads
            .updated
            .entry(pad_id.to_string())
            .or_insert_with(|| SfuOutboundRtpPad {
                service_id: observed_pad.scope.service_id.clone(),
                media_unit_id: observed_pad.scope.media_unit_id.clone(),
                sfu_id: observed_pad.scope.sfu_id.clone(),
                sfu_transport_id: transport_id.to_string(),
                rtp_pad_id: pad_id.to_string(),
                added: observed_pad.min_timestamp,
                ..Default::default()
            });
        if let Some(latest) = observed_pad.latest() {
            pad.internal = latest.internal;
            if latest.ssrc.is_some() {
                pad.ssrc = latest.ssrc;
            }
            if latest.sink_id.is_some() {
                pad.sink_id = latest.sink_id.clone();
            }
        }
        if observed_pad.stream_id.is_some() {
            pad.stream_id = observed_pad.stream_id.clone();
        }
        for stamped in observed_pad.samples() {
            self.reports.add_report(Report::SfuOutboundRtpPad(SfuStatsReport {
                header: scope_header(&observed_pad.scope, stamped.timestamp),
                transport_id: transport_id.to_string(),
                stats: stamped.sample.clone(),
            }));
        }
        tx.sfu_outbound_rtp_pads.visit(pad_id, now);
    }

    fn visit_sctp_channel(
        &self,
        tx: &mut TransactionContext,
        observed_channel: &ObservedSfuSctpChannel,
        now: Timestamp,
    ) {
        let channel_id = observed_channel.id.as_str();
        let transport_id = observed_channel.scope.sfu_transport_id.as_str();
        if !tx.sfu_sctp_channels.updated.contains_key(channel_id) {
            if let Some(transport) = tx.sfu_transports.get_mut(transport_id) {
                if !push_unique(&mut transport.sctp_channel_ids, channel_id) {
                    warn!(
                        "Sctp channel {} is already listed on transport {}",
                        channel_id, transport_id
                    );
                }
            }
        }
        let channel = tx
            .sfu_sctp_channels
            .updated
            .entry(channel_id.to_string())
            .or_insert_with(|| SfuSctpChannel {
                service_id: observed_channel.scope.service_id.clone(),
                media_unit_id: observed_channel.scope.media_unit_id.clone(),
                sfu_id: observed_channel.scope.sfu_id.clone(),
                sfu_transport_id: transport_id.to_string(),
                sfu_sctp_channel_id: channel_id.to_string(),
                opened: observed_channel.min_timestamp,
                ..Default::default()
            });
        if let Some(label) = observed_channel.latest().and_then(|s| s.label.clone()) {
            channel.label = Some(label);
        }
        if observed_channel.stream_id.is_some() {
            channel.stream_id = observed_channel.stream_id.clone();
        }
        for stamped in observed_channel.samples() {
            self.reports.add_report(Report::SfuSctpChannel(SfuStatsReport {
                header: scope_header(&observed_channel.scope, stamped.timestamp),
                transport_id: transport_id.to_string(),
                stats: stamped.sample.clone(),
            }));
        }
        tx.sfu_sctp_channels.visit(channel_id, now);
    }
}

#[async_trait]
impl Middleware<TransactionContext> for VisitObservedSfusMiddleware {
    fn name(&self) -> &'static str {
        "visit-observed-sfus"
    }

    async fn handle(
        &self,
        tx: &mut TransactionContext,
        next: Next<'_, TransactionContext>,
    ) -> Result<()> {
        trace!(transaction_id = %tx.id, "visit observed sfus");
        self.visit(tx);
        next.run(tx).await
    }
}

fn sfu_header(
    sfu: &Sfu,
    timestamp: Timestamp,
) -> SfuReportHeader {
    SfuReportHeader {
        service_id: sfu.service_id.clone(),
        media_unit_id: sfu.media_unit_id.clone(),
        sfu_id: sfu.sfu_id.clone(),
        marker: sfu.marker.clone(),
        timestamp,
    }
}

/// Header built from the identity an observed transport or its children carry
fn scope_header<S>(
    scope: &S,
    timestamp: Timestamp,
) -> SfuReportHeader
where
    S: SfuScope,
{
    SfuReportHeader {
        service_id: scope.service_id().to_string(),
        media_unit_id: scope.media_unit_id().to_string(),
        sfu_id: scope.sfu_id().to_string(),
        marker: scope.marker().cloned(),
        timestamp,
    }
}

trait SfuScope {
    fn service_id(&self) -> &str;
    fn media_unit_id(&self) -> &str;
    fn sfu_id(&self) -> &str;
    fn marker(&self) -> Option<&String>;
}

macro_rules! impl_sfu_scope {
    ($ty:ty) => {
        impl SfuScope for $ty {
            fn service_id(&self) -> &str {
                &self.service_id
            }

            fn media_unit_id(&self) -> &str {
                &self.media_unit_id
            }

            fn sfu_id(&self) -> &str {
                &self.sfu_id
            }

            fn marker(&self) -> Option<&String> {
                self.marker.as_ref()
            }
        }
    };
}
impl_sfu_scope!(ObservedSfuTransport);
impl_sfu_scope!(crate::snapshot::SfuTransportScope);

fn new_sfu(observed: &ObservedSfu) -> Sfu {
    Sfu {
        service_id: observed.service_id.clone(),
        media_unit_id: observed.media_unit_id.clone(),
        sfu_id: observed.sfu_id.clone(),
        joined: observed.joined,
        time_zone_id: observed.time_zone_id.clone(),
        marker: observed.marker.clone(),
        ..Default::default()
    }
}

fn new_transport(observed: &ObservedSfuTransport) -> SfuTransport {
    SfuTransport {
        service_id: observed.service_id.clone(),
        media_unit_id: observed.media_unit_id.clone(),
        sfu_id: observed.sfu_id.clone(),
        transport_id: observed.transport_id.clone(),
        internal: observed.internal,
        opened: observed.min_timestamp,
        marker: observed.marker.clone(),
        ..Default::default()
    }
}
