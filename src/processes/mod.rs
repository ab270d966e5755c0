//! Client lifecycle processes run at the start of every tick.
//!
//! Joins and detaches buffered since the previous tick are applied to storage before the
//! snapshot is reconciled, so a client that joined just before its first samples arrived is
//! already known when its samples are visited.
mod close_peer_connection;
mod detach_client;
mod join_client;

pub(crate) use close_peer_connection::*;
pub use detach_client::*;
pub use join_client::*;

#[cfg(test)]
mod processes_test;

use std::sync::Arc;

use crate::evaluator::EvaluatorContext;
use crate::middleware::Processor;
use crate::reports::ReportsCollector;
use crate::sources::ClientSourceConfig;
use crate::storage::StorageProvider;
use crate::time::Timestamp;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedClient {
    pub client_id: String,
    pub call_id: String,
    pub detached: Timestamp,
}

/// Client operations drained from the evaluator buffer for one tick
#[derive(Debug, Default)]
pub struct CallOperationsContext {
    pub joined_clients: Vec<ClientSourceConfig>,
    pub detached_clients: Vec<DetachedClient>,
    pub evaluator_context: EvaluatorContext,
}

impl CallOperationsContext {
    pub fn new(evaluator_context: EvaluatorContext) -> Self {
        Self {
            evaluator_context,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.joined_clients.is_empty() && self.detached_clients.is_empty()
    }
}

/// Joins first, detaches second
pub fn create_call_processor(
    storages: StorageProvider,
    reports: Arc<dyn ReportsCollector>,
) -> Processor<CallOperationsContext> {
    let processor = Processor::new("call-operations");
    processor.add_middleware(Arc::new(JoinClientsMiddleware::new(
        storages.clone(),
        reports.clone(),
    )));
    processor.add_middleware(Arc::new(DetachClientsMiddleware::new(storages, reports)));
    processor
}
