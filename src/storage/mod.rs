//! Storage contract consumed by the reconciliation pipeline.
//!
//! Each entity type lives in its own key→record collection. The pipeline is storage-agnostic:
//! it only reads and writes through [`ObserverStorage`], and everything it mutates is first
//! loaded into a transaction-local working set. [`MemoryStorage`] is the in-process
//! implementation used by the demo binary and the tests.
mod memory_storage;
mod storage_provider;

pub use memory_storage::*;
pub use storage_provider::*;


use std::collections::HashMap;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::Result;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObserverStorage<V>: Send + Sync + 'static
where
    V: Clone + Send + Sync + 'static,
{
    /// Name of the collection, used in logs and errors
    fn id(&self) -> String;

    async fn size(&self) -> Result<usize>;

    async fn clear(&self) -> Result<()>;

    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<V>>;

    /// Returns the records found for `keys`; missing keys are absent from the result.
    async fn get_all(
        &self,
        keys: Vec<String>,
    ) -> Result<HashMap<String, V>>;

    /// Writes `value` and returns the record it replaced.
    async fn set(
        &self,
        key: String,
        value: V,
    ) -> Result<Option<V>>;

    /// Writes every entry and returns the records they replaced.
    async fn set_all(
        &self,
        entries: HashMap<String, V>,
    ) -> Result<HashMap<String, V>>;

    /// Writes `value` only if `key` is free. Returns the record already stored otherwise.
    async fn insert(
        &self,
        key: String,
        value: V,
    ) -> Result<Option<V>>;

    /// Writes entries whose key is free and returns the records already stored for the others.
    async fn insert_all(
        &self,
        entries: HashMap<String, V>,
    ) -> Result<HashMap<String, V>>;

    async fn remove(
        &self,
        key: &str,
    ) -> Result<Option<V>>;

    /// Removes every key and returns the records that were actually removed.
    async fn remove_all(
        &self,
        keys: Vec<String>,
    ) -> Result<HashMap<String, V>>;

    /// Entries resident in this process. For a distributed backend this is the local partition.
    async fn local_entries(&self) -> Result<Vec<(String, V)>>;
}
