use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use tracing::warn;

use super::CallOperationsContext;
use crate::middleware::Middleware;
use crate::middleware::Next;
use crate::models::push_unique;
use crate::models::Call;
use crate::models::Client;
use crate::reports::CallEventReport;
use crate::reports::Report;
use crate::reports::ReportsCollector;
use crate::sources::ClientSourceConfig;
use crate::storage::StorageProvider;
use crate::Result;

/// Creates client records and the calls they belong to
pub struct JoinClientsMiddleware {
    storages: StorageProvider,
    reports: Arc<dyn ReportsCollector>,
}

impl JoinClientsMiddleware {
    pub fn new(
        storages: StorageProvider,
        reports: Arc<dyn ReportsCollector>,
    ) -> Self {
        Self { storages, reports }
    }

    async fn join_clients(
        &self,
        ctx: &mut CallOperationsContext,
    ) -> Result<()> {
        let mut call_ids: Vec<String> = Vec::new();
        for config in &ctx.joined_clients {
            push_unique(&mut call_ids, &config.call_id);
        }
        let existing_calls = self.storages.call_storage.get_all(call_ids).await?;

        let mut updated_calls: HashMap<String, Call> = HashMap::new();
        let mut new_calls: HashMap<String, Call> = HashMap::new();
        let mut new_call_ids: Vec<String> = Vec::new();
        let mut new_clients: Vec<Client> = Vec::new();

        for config in &ctx.joined_clients {
            let call = if let Some(existing) = existing_calls.get(&config.call_id) {
                updated_calls
                    .entry(config.call_id.clone())
                    .or_insert_with(|| existing.clone())
            } else {
                new_calls.entry(config.call_id.clone()).or_insert_with(|| {
                    new_call_ids.push(config.call_id.clone());
                    Call {
                        service_id: config.service_id.clone(),
                        room_id: config.room_id.clone(),
                        call_id: config.call_id.clone(),
                        started: config.joined,
                        client_ids: Vec::new(),
                    }
                })
            };

            if !push_unique(&mut call.client_ids, &config.client_id) {
                warn!(
                    "Client {} has already joined call {}",
                    config.client_id, config.call_id
                );
                continue;
            }
            new_clients.push(new_client(config));
        }

        if !new_calls.is_empty() {
            let raced = self
                .storages
                .call_storage
                .insert_all(new_calls.clone())
                .await?;
            for (call_id, existing) in raced {
                debug!(%call_id, "call was created concurrently, merging clients");
                let Some(inserted) = new_calls.remove(&call_id) else {
                    continue;
                };
                let mut merged = existing;
                for client_id in &inserted.client_ids {
                    push_unique(&mut merged.client_ids, client_id);
                }
                updated_calls.insert(call_id, merged);
            }
        }

        if !updated_calls.is_empty() {
            self.storages.call_storage.set_all(updated_calls).await?;
        }

        if !new_clients.is_empty() {
            let records = new_clients
                .iter()
                .map(|client| (client.client_id.clone(), client.clone()))
                .collect();
            self.storages.client_storage.set_all(records).await?;
        }

        let evaluator_context = &mut ctx.evaluator_context;
        for call_id in new_call_ids {
            let Some(call) = new_calls.get(&call_id) else {
                continue;
            };
            self.reports.add_report(Report::CallEvent(CallEventReport::call_started(
                call,
                call.started,
            )));
            evaluator_context.started_call_ids.push(call_id);
        }
        for client in new_clients {
            self.reports.add_report(Report::CallEvent(CallEventReport::client_joined(
                &client,
                client.joined,
            )));
            evaluator_context.joined_client_ids.push(client.client_id);
        }
        Ok(())
    }
}

#[async_trait]
impl Middleware<CallOperationsContext> for JoinClientsMiddleware {
    fn name(&self) -> &'static str {
        "join-clients"
    }

    async fn handle(
        &self,
        ctx: &mut CallOperationsContext,
        next: Next<'_, CallOperationsContext>,
    ) -> Result<()> {
        if !ctx.joined_clients.is_empty() {
            self.join_clients(ctx).await?;
        }
        next.run(ctx).await
    }
}

fn new_client(config: &ClientSourceConfig) -> Client {
    Client {
        service_id: config.service_id.clone(),
        media_unit_id: config.media_unit_id.clone(),
        room_id: config.room_id.clone(),
        call_id: config.call_id.clone(),
        client_id: config.client_id.clone(),
        user_id: config.user_id.clone(),
        marker: config.marker.clone(),
        time_zone_id: config.time_zone_id.clone(),
        joined: config.joined,
        ..Default::default()
    }
}
