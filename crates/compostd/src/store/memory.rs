//! In-memory store with keys-only index projections.
//!
//! Index queries return just the primary key and the index key, the same
//! sparse shape a keys-only secondary index hands back, so callers exercise
//! the re-fetch path.

use async_trait::async_trait;
use compost_shared::CompostError;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{AttributeValue, Item, KvStore};

#[derive(Default)]
struct Table {
    primary_key: String,
    /// index name -> index key attribute
    indexes: HashMap<String, String>,
    items: Vec<Item>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Table>>,
    failing_tables: Mutex<HashSet<String>>,
    gets: AtomicUsize,
    queries: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, table: &str, primary_key: &str) -> Self {
        self.tables.lock().unwrap().insert(
            table.to_string(),
            Table {
                primary_key: primary_key.to_string(),
                ..Default::default()
            },
        );
        self
    }

    pub fn with_index(self, table: &str, index: &str, key_name: &str) -> Self {
        if let Some(t) = self.tables.lock().unwrap().get_mut(table) {
            t.indexes.insert(index.to_string(), key_name.to_string());
        }
        self
    }

    /// Insert or replace by primary key. Unknown tables are ignored.
    pub fn put(&self, table: &str, item: Item) {
        let mut tables = self.tables.lock().unwrap();
        let Some(t) = tables.get_mut(table) else {
            return;
        };
        let key = item.get(&t.primary_key).cloned();
        t.items.retain(|existing| existing.get(&t.primary_key) != key.as_ref());
        t.items.push(item);
    }

    /// Remove a single attribute from a stored item
    pub fn strip_attribute(&self, table: &str, key_value: &str, attribute: &str) {
        let mut tables = self.tables.lock().unwrap();
        if let Some(t) = tables.get_mut(table) {
            let pk = t.primary_key.clone();
            for item in t.items.iter_mut() {
                if item.get(&pk).and_then(AttributeValue::as_str) == Some(key_value) {
                    item.remove(attribute);
                }
            }
        }
    }

    /// Every operation on `table` fails from now on
    pub fn fail_table(&self, table: &str) {
        self.failing_tables.lock().unwrap().insert(table.to_string());
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn check_failing(&self, table: &str) -> Result<(), CompostError> {
        if self.failing_tables.lock().unwrap().contains(table) {
            return Err(CompostError::Store(format!(
                "ProvisionedThroughputExceededException on {}",
                table
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn query_index(
        &self,
        table: &str,
        index: &str,
        key_name: &str,
        key_value: &str,
    ) -> Result<Vec<Item>, CompostError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.check_failing(table)?;

        let tables = self.tables.lock().unwrap();
        let t = tables
            .get(table)
            .ok_or_else(|| CompostError::Store(format!("ResourceNotFoundException: {}", table)))?;
        match t.indexes.get(index) {
            Some(k) if k == key_name => {}
            _ => {
                return Err(CompostError::Store(format!(
                    "ValidationException: no index {} on {} keyed by {}",
                    index, table, key_name
                )))
            }
        }

        Ok(t.items
            .iter()
            .filter(|item| item.get(key_name).and_then(AttributeValue::as_str) == Some(key_value))
            .map(|item| {
                item.iter()
                    .filter(|(name, _)| **name == t.primary_key || name.as_str() == key_name)
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect()
            })
            .collect())
    }

    async fn get_item(
        &self,
        table: &str,
        key_name: &str,
        key_value: &str,
    ) -> Result<Option<Item>, CompostError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check_failing(table)?;

        let tables = self.tables.lock().unwrap();
        let t = tables
            .get(table)
            .ok_or_else(|| CompostError::Store(format!("ResourceNotFoundException: {}", table)))?;
        if t.primary_key != key_name {
            return Err(CompostError::Store(format!(
                "ValidationException: {} is not the key of {}",
                key_name, table
            )));
        }

        Ok(t.items
            .iter()
            .find(|item| item.get(key_name).and_then(AttributeValue::as_str) == Some(key_value))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        let store = MemoryStore::new()
            .with_table("results", "result_id")
            .with_index("results", "check_id-index", "check_id");
        store.put(
            "results",
            Item::from([
                ("result_id".to_string(), AttributeValue::s("r1")),
                ("check_id".to_string(), AttributeValue::s("c1")),
                ("passing".to_string(), AttributeValue::Bool(true)),
            ]),
        );
        store
    }

    #[tokio::test]
    async fn test_index_hits_are_sparse() {
        let store = store();
        let hits = store
            .query_index("results", "check_id-index", "check_id", "c1")
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].contains_key("result_id"));
        assert!(!hits[0].contains_key("passing"));

        let full = store.get_item("results", "result_id", "r1").await.unwrap().unwrap();
        assert_eq!(full["passing"].as_bool(), Some(true));
    }

    #[tokio::test]
    async fn test_unknown_index_and_failures() {
        let store = store();
        assert!(store
            .query_index("results", "nope", "check_id", "c1")
            .await
            .is_err());

        store.fail_table("results");
        assert!(store.get_item("results", "result_id", "r1").await.is_err());
    }
}
