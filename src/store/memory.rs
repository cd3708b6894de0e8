//! In-process [`DocumentStore`] used by tests and `--memory` dry runs.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{Document, DocumentStore, UpsertOutcome};
use crate::error::StoreError;

#[derive(Debug, Clone)]
struct Stored {
    scope: Option<String>,
    body: Value,
}

#[derive(Debug, Default)]
struct Inner {
    collections: HashMap<String, BTreeMap<String, Stored>>,
    writes: HashMap<String, u64>,
}

impl Inner {
    fn bump(&mut self, collection: &str) {
        *self.writes.entry(collection.to_string()).or_default() += 1;
    }
}

/// Map-backed store with the same semantics as the Postgres backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_inserts: AtomicBool,
    unavailable: AtomicBool,
}

impl MemoryStore {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `insert_many` fail while everything else keeps working.
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Make every operation fail.
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    /// Number of successful write operations against a collection.
    pub async fn write_count(&self, collection: &str) -> u64 {
        let inner = self.inner.lock().await;
        inner.writes.get(collection).copied().unwrap_or(0)
    }

    /// Number of documents currently held by a collection.
    pub async fn len(&self, collection: &str) -> usize {
        let inner = self.inner.lock().await;
        inner.collections.get(collection).map_or(0, BTreeMap::len)
    }

    pub async fn keys(&self, collection: &str) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner
            .collections
            .get(collection)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store marked down".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn delete_scope(
        &self,
        collection: &str,
        scope: Option<&str>,
    ) -> Result<u64, StoreError> {
        // ---
        self.check()?;
        let mut inner = self.inner.lock().await;
        let Some(docs) = inner.collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = docs.len();
        match scope {
            None => docs.clear(),
            Some(scope) => docs.retain(|_, d| d.scope.as_deref() != Some(scope)),
        }
        let deleted = (before - docs.len()) as u64;
        inner.bump(collection);
        Ok(deleted)
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<u64, StoreError> {
        // ---
        self.check()?;
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("insert rejected".into()));
        }
        let mut inner = self.inner.lock().await;
        let target = inner.collections.entry(collection.to_string()).or_default();

        let mut seen = BTreeSet::new();
        for doc in &docs {
            if target.contains_key(&doc.key) || !seen.insert(doc.key.as_str()) {
                return Err(StoreError::Unavailable(format!(
                    "duplicate key '{}' in {collection}",
                    doc.key
                )));
            }
        }

        let count = docs.len() as u64;
        for doc in docs {
            target.insert(
                doc.key,
                Stored {
                    scope: doc.scope,
                    body: doc.body,
                },
            );
        }
        inner.bump(collection);
        Ok(count)
    }

    async fn upsert(&self, collection: &str, doc: Document) -> Result<UpsertOutcome, StoreError> {
        // ---
        self.check()?;
        let mut inner = self.inner.lock().await;
        let previous = inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(
                doc.key,
                Stored {
                    scope: doc.scope,
                    body: doc.body,
                },
            );
        inner.bump(collection);
        Ok(match previous {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Inserted,
        })
    }

    async fn insert_if_absent(&self, collection: &str, doc: Document) -> Result<bool, StoreError> {
        // ---
        self.check()?;
        let mut inner = self.inner.lock().await;
        let target = inner.collections.entry(collection.to_string()).or_default();
        if target.contains_key(&doc.key) {
            return Ok(false);
        }
        target.insert(
            doc.key,
            Stored {
                scope: doc.scope,
                body: doc.body,
            },
        );
        inner.bump(collection);
        Ok(true)
    }

    async fn append_bucket(&self, collection: &str, doc: Document) -> Result<bool, StoreError> {
        // ---
        self.check()?;
        let mut inner = self.inner.lock().await;
        let target = inner.collections.entry(collection.to_string()).or_default();

        let Some(existing) = target.get_mut(&doc.key) else {
            target.insert(
                doc.key,
                Stored {
                    scope: doc.scope,
                    body: doc.body,
                },
            );
            inner.bump(collection);
            return Ok(true);
        };

        if existing.body.get("content_hash") == doc.body.get("content_hash") {
            return Ok(false);
        }

        let incoming = doc
            .body
            .get("measurements")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let added = doc.body.get("count").and_then(Value::as_u64).unwrap_or(0);

        let body = existing
            .body
            .as_object_mut()
            .ok_or_else(|| StoreError::Unavailable(format!("bucket {} is not an object", doc.key)))?;
        match body.get_mut("measurements").and_then(Value::as_array_mut) {
            Some(list) => list.extend(incoming),
            None => {
                body.insert("measurements".into(), Value::Array(incoming));
            }
        }
        let count = body.get("count").and_then(Value::as_u64).unwrap_or(0) + added;
        body.insert("count".into(), Value::from(count));
        if let Some(hash) = doc.body.get("content_hash") {
            body.insert("content_hash".into(), hash.clone());
        }
        inner.bump(collection);
        Ok(true)
    }

    async fn find_one(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        self.check()?;
        let inner = self.inner.lock().await;
        Ok(inner
            .collections
            .get(collection)
            .and_then(|docs| docs.get(key))
            .map(|d| d.body.clone()))
    }

    async fn find_scope(
        &self,
        collection: &str,
        scope: Option<&str>,
    ) -> Result<Vec<Value>, StoreError> {
        // ---
        self.check()?;
        let inner = self.inner.lock().await;
        Ok(inner
            .collections
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|d| scope.is_none() || d.scope.as_deref() == scope)
                    .map(|d| d.body.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn distinct_scopes(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        // ---
        self.check()?;
        let inner = self.inner.lock().await;
        let scopes: BTreeSet<String> = inner
            .collections
            .get(collection)
            .map(|docs| docs.values().filter_map(|d| d.scope.clone()).collect())
            .unwrap_or_default();
        Ok(scopes.into_iter().collect())
    }
}
