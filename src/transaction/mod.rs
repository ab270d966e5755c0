//! Transaction-scoped reconciliation of one snapshot.
//!
//! A [`TransactionContext`] loads every record the snapshot references into per-type
//! working sets. The visit middlewares mutate those sets, the GC middlewares mark idle
//! records for deletion and the commit middleware writes the outcome back to storage and
//! appends the resulting deltas to the evaluator context. Nothing touches storage between
//! load and commit except the parent lookups done by eviction.
mod commit_transaction;
mod context;
mod delete_outdated_call_entries;
mod delete_outdated_sfu_entries;
mod visit_observed_calls;
mod visit_observed_sfus;

pub use commit_transaction::*;
pub use context::*;
pub use delete_outdated_call_entries::*;
pub use delete_outdated_sfu_entries::*;
pub use visit_observed_calls::*;
pub use visit_observed_sfus::*;

#[cfg(test)]
mod visit_test;
#[cfg(test)]
mod commit_test;

use std::sync::Arc;

use crate::middleware::Processor;
use crate::reports::ReportsCollector;
use crate::storage::StorageProvider;
use crate::EvaluatorConfig;

/// Visit calls, visit SFUs, evict idle call entries, evict idle SFU entries, commit
pub fn create_transaction_processor(
    config: &EvaluatorConfig,
    storages: StorageProvider,
    reports: Arc<dyn ReportsCollector>,
) -> Processor<TransactionContext> {
    let processor = Processor::new("transaction");
    processor.add_middleware(Arc::new(VisitObservedCallsMiddleware::new(
        reports.clone(),
        config.fetch_samples,
    )));
    processor.add_middleware(Arc::new(VisitObservedSfusMiddleware::new(reports.clone())));
    processor.add_middleware(Arc::new(DeleteOutdatedCallEntriesMiddleware::new(
        storages.clone(),
        config.max_idle_time_in_ms,
    )));
    processor.add_middleware(Arc::new(DeleteOutdatedSfuEntriesMiddleware::new(
        storages.clone(),
        reports.clone(),
        config.max_idle_time_in_ms,
    )));
    processor.add_middleware(Arc::new(CommitTransactionMiddleware::new(storages, reports)));
    processor
}
