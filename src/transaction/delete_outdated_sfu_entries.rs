use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use tracing::info;

use super::TransactionContext;
use crate::middleware::Middleware;
use crate::middleware::Next;
use crate::models::parent_in;
use crate::models::remove_id;
use crate::reports::Report;
use crate::reports::ReportsCollector;
use crate::reports::SfuEventReport;
use crate::storage::StorageProvider;
use crate::Result;

/// Evicts idle SFUs, then transports, then pads and channels. Children of an evicted
/// parent go with it regardless of their own idle time.
pub struct DeleteOutdatedSfuEntriesMiddleware {
    storages: StorageProvider,
    reports: Arc<dyn ReportsCollector>,
    max_idle_time_in_ms: u64,
}

impl DeleteOutdatedSfuEntriesMiddleware {
    pub fn new(
        storages: StorageProvider,
        reports: Arc<dyn ReportsCollector>,
        max_idle_time_in_ms: u64,
    ) -> Self {
        Self {
            storages,
            reports,
            max_idle_time_in_ms,
        }
    }

    async fn delete_outdated(
        &self,
        tx: &mut TransactionContext,
    ) -> Result<()> {
        let now = tx.created;
        let max_idle_time_in_ms = self.max_idle_time_in_ms;

        let entries = self.storages.sfu_storage.local_entries().await?;
        let evicted = tx
            .sfus
            .sweep(entries, now, max_idle_time_in_ms, |_| false);
        for sfu in &evicted {
            info!(sfu_id = %sfu.sfu_id, "sfu left");
            self.reports
                .add_report(Report::SfuEvent(SfuEventReport::sfu_left(sfu, now)));
        }

        let gone_sfus: HashSet<String> = tx.sfus.deleted.clone();
        let entries = self.storages.sfu_transport_storage.local_entries().await?;
        let evicted = tx
            .sfu_transports
            .sweep(entries, now, max_idle_time_in_ms, |transport| {
                parent_in(transport, &gone_sfus)
            });
        for transport in evicted {
            debug!(transport_id = %transport.transport_id, "sfu transport evicted");
            if let Some(sfu) = tx
                .sfus
                .load_for_update(&self.storages.sfu_storage, &transport.sfu_id)
                .await?
            {
                remove_id(&mut sfu.sfu_transport_ids, &transport.transport_id);
            }
        }

        let gone_transports: HashSet<String> = tx.sfu_transports.deleted.clone();

        let entries = self.storages.sfu_inbound_rtp_pad_storage.local_entries().await?;
        let evicted = tx
            .sfu_inbound_rtp_pads
            .sweep(entries, now, max_idle_time_in_ms, |pad| {
                parent_in(pad, &gone_transports) || gone_sfus.contains(&pad.sfu_id)
            });
        for pad in evicted {
            if let Some(transport) = tx
                .sfu_transports
                .load_for_update(&self.storages.sfu_transport_storage, &pad.sfu_transport_id)
                .await?
            {
                remove_id(&mut transport.inbound_rtp_pad_ids, &pad.rtp_pad_id);
            }
        }

        let entries = self.storages.sfu_outbound_rtp_pad_storage.local_entries().await?;
        let evicted = tx
            .sfu_outbound_rtp_pads
            .sweep(entries, now, max_idle_time_in_ms, |pad| {
                parent_in(pad, &gone_transports) || gone_sfus.contains(&pad.sfu_id)
            });
        for pad in evicted {
            if let Some(transport) = tx
                .sfu_transports
                .load_for_update(&self.storages.sfu_transport_storage, &pad.sfu_transport_id)
                .await?
            {
                remove_id(&mut transport.outbound_rtp_pad_ids, &pad.rtp_pad_id);
            }
        }

        let entries = self.storages.sfu_sctp_channel_storage.local_entries().await?;
        let evicted = tx
            .sfu_sctp_channels
            .sweep(entries, now, max_idle_time_in_ms, |channel| {
                parent_in(channel, &gone_transports) || gone_sfus.contains(&channel.sfu_id)
            });
        for channel in evicted {
            if let Some(transport) = tx
                .sfu_transports
                .load_for_update(&self.storages.sfu_transport_storage, &channel.sfu_transport_id)
                .await?
            {
                remove_id(&mut transport.sctp_channel_ids, &channel.sfu_sctp_channel_id);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Middleware<TransactionContext> for DeleteOutdatedSfuEntriesMiddleware {
    fn name(&self) -> &'static str {
        "delete-outdated-sfu-entries"
    }

    async fn handle(
        &self,
        tx: &mut TransactionContext,
        next: Next<'_, TransactionContext>,
    ) -> Result<()> {
        self.delete_outdated(tx).await?;
        next.run(tx).await
    }
}
