use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::trace;

use super::ObserverStorage;
use crate::Result;

/// In-memory collection backed by a concurrent map
#[derive(Debug)]
pub struct MemoryStorage<V> {
    id: String,
    entries: DashMap<String, V>,
}

impl<V> MemoryStorage<V> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entries: DashMap::new(),
        }
    }
}

#[async_trait]
impl<V> ObserverStorage<V> for MemoryStorage<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn size(&self) -> Result<usize> {
        Ok(self.entries.len())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }

    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<V>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn get_all(
        &self,
        keys: Vec<String>,
    ) -> Result<HashMap<String, V>> {
        let found = keys
            .into_iter()
            .filter_map(|key| {
                let value = self.entries.get(&key).map(|v| v.value().clone())?;
                Some((key, value))
            })
            .collect();
        Ok(found)
    }

    async fn set(
        &self,
        key: String,
        value: V,
    ) -> Result<Option<V>> {
        Ok(self.entries.insert(key, value))
    }

    async fn set_all(
        &self,
        entries: HashMap<String, V>,
    ) -> Result<HashMap<String, V>> {
        trace!(storage = %self.id, len = entries.len(), "set_all");
        let mut old = HashMap::new();
        for (key, value) in entries {
            if let Some(prev) = self.entries.insert(key.clone(), value) {
                old.insert(key, prev);
            }
        }
        Ok(old)
    }

    async fn insert(
        &self,
        key: String,
        value: V,
    ) -> Result<Option<V>> {
        match self.entries.entry(key) {
            Entry::Occupied(existing) => Ok(Some(existing.get().clone())),
            Entry::Vacant(vacant) => {
                vacant.insert(value);
                Ok(None)
            }
        }
    }

    async fn insert_all(
        &self,
        entries: HashMap<String, V>,
    ) -> Result<HashMap<String, V>> {
        let mut existing = HashMap::new();
        for (key, value) in entries {
            match self.entries.entry(key) {
                Entry::Occupied(occupied) => {
                    existing.insert(occupied.key().clone(), occupied.get().clone());
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(value);
                }
            }
        }
        Ok(existing)
    }

    async fn remove(
        &self,
        key: &str,
    ) -> Result<Option<V>> {
        Ok(self.entries.remove(key).map(|(_, v)| v))
    }

    async fn remove_all(
        &self,
        keys: Vec<String>,
    ) -> Result<HashMap<String, V>> {
        trace!(storage = %self.id, len = keys.len(), "remove_all");
        let removed = keys
            .into_iter()
            .filter_map(|key| self.entries.remove(&key))
            .collect();
        Ok(removed)
    }

    async fn local_entries(&self) -> Result<Vec<(String, V)>> {
        Ok(self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect())
    }
}
