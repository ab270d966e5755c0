use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use tracing::warn;

use super::close_peer_connections;
use super::CallOperationsContext;
use crate::evaluator::Removed;
use crate::middleware::Middleware;
use crate::middleware::Next;
use crate::models::Call;
use crate::reports::CallEventReport;
use crate::reports::Report;
use crate::reports::ReportsCollector;
use crate::storage::StorageProvider;
use crate::time::Timestamp;
use crate::Result;

/// Removes detached clients with everything they own and ends calls left without clients
pub struct DetachClientsMiddleware {
    storages: StorageProvider,
    reports: Arc<dyn ReportsCollector>,
}

struct CallDetachment {
    client_ids: HashSet<String>,
    ended: Timestamp,
}

impl DetachClientsMiddleware {
    pub fn new(
        storages: StorageProvider,
        reports: Arc<dyn ReportsCollector>,
    ) -> Self {
        Self { storages, reports }
    }

    async fn detach_clients(
        &self,
        ctx: &mut CallOperationsContext,
    ) -> Result<()> {
        let client_ids = ctx
            .detached_clients
            .iter()
            .map(|detached| detached.client_id.clone())
            .collect();
        let mut removed_clients = self.storages.client_storage.remove_all(client_ids).await?;

        let mut call_order: Vec<String> = Vec::new();
        let mut detachments: HashMap<String, CallDetachment> = HashMap::new();

        for detached in &ctx.detached_clients {
            let Some(client) = removed_clients.remove(&detached.client_id) else {
                debug!(client_id = %detached.client_id, "client is not stored, nothing to detach");
                continue;
            };
            close_peer_connections(
                &self.storages,
                &self.reports,
                &client.peer_connection_ids,
                detached.detached,
                &mut ctx.evaluator_context,
            )
            .await?;

            self.reports.add_report(Report::CallEvent(CallEventReport::client_left(
                &client,
                detached.detached,
            )));

            let detachment = detachments
                .entry(client.call_id.clone())
                .or_insert_with(|| {
                    call_order.push(client.call_id.clone());
                    CallDetachment {
                        client_ids: HashSet::new(),
                        ended: detached.detached,
                    }
                });
            detachment.client_ids.insert(client.client_id.clone());
            detachment.ended = detachment.ended.max(detached.detached);

            ctx.evaluator_context.detached_clients.push(Removed {
                entry: client,
                removed: detached.detached,
            });
        }

        if call_order.is_empty() {
            return Ok(());
        }
        let calls = self
            .storages
            .call_storage
            .get_all(call_order.clone())
            .await?;

        let mut updated_calls: HashMap<String, Call> = HashMap::new();
        let mut ended_calls: Vec<(String, Timestamp)> = Vec::new();
        for call_id in call_order {
            let Some(detachment) = detachments.get(&call_id) else {
                continue;
            };
            let Some(mut call) = calls.get(&call_id).cloned() else {
                warn!("Call {} of detached clients is not stored", call_id);
                continue;
            };
            call.client_ids
                .retain(|client_id| !detachment.client_ids.contains(client_id));
            if call.client_ids.is_empty() {
                ended_calls.push((call_id, detachment.ended));
            } else {
                updated_calls.insert(call_id, call);
            }
        }

        if !updated_calls.is_empty() {
            self.storages.call_storage.set_all(updated_calls).await?;
        }
        if ended_calls.is_empty() {
            return Ok(());
        }

        let mut removed_calls = self
            .storages
            .call_storage
            .remove_all(ended_calls.iter().map(|(id, _)| id.clone()).collect())
            .await?;
        for (call_id, ended) in ended_calls {
            let Some(call) = removed_calls.remove(&call_id) else {
                continue;
            };
            self.reports
                .add_report(Report::CallEvent(CallEventReport::call_ended(&call, ended)));
            ctx.evaluator_context.ended_calls.push(Removed {
                entry: call,
                removed: ended,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Middleware<CallOperationsContext> for DetachClientsMiddleware {
    fn name(&self) -> &'static str {
        "detach-clients"
    }

    async fn handle(
        &self,
        ctx: &mut CallOperationsContext,
        next: Next<'_, CallOperationsContext>,
    ) -> Result<()> {
        if !ctx.detached_clients.is_empty() {
            self.detach_clients(ctx).await?;
        }
        next.run(ctx).await
    }
}
