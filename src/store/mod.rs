//! Document store gateway.
//!
//! The pipelines persist schemaless documents grouped into named collections.
//! Each document has a natural business key (unique per collection) and an
//! optional *scope*, the station or location it belongs to, so that a
//! collection serving several logical sources can be replaced one scope at a
//! time.
//!
//! Two backends implement [`DocumentStore`]:
//! - [`PgDocumentStore`]: a single JSONB table in PostgreSQL (production)
//! - [`MemoryStore`]: an in-process map with fault injection (tests, dry runs)
//!
//! Every operation touches either a whole scope or a single document; nothing
//! relies on multi-document transactions except the bulk insert itself.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::StoreError;

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;

// ---

/// A record type that knows its document key and scope.
pub trait Keyed: Serialize {
    fn doc_key(&self) -> String;

    fn scope(&self) -> Option<String> {
        None
    }
}

/// A stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub key: String,
    pub scope: Option<String>,
    pub body: Value,
}

impl Document {
    pub fn from_record<T: Keyed>(record: &T) -> Result<Self, StoreError> {
        Ok(Self {
            key: record.doc_key(),
            scope: record.scope(),
            body: serde_json::to_value(record)?,
        })
    }
}

/// Convert a batch, collapsing duplicate keys (the last occurrence wins)
/// while keeping first-seen order.
pub fn to_documents<T: Keyed>(records: &[T]) -> Result<Vec<Document>, StoreError> {
    // ---
    let mut docs: Vec<Document> = Vec::with_capacity(records.len());
    let mut index = std::collections::HashMap::with_capacity(records.len());
    for record in records {
        let doc = Document::from_record(record)?;
        match index.get(&doc.key) {
            Some(&pos) => docs[pos] = doc,
            None => {
                index.insert(doc.key.clone(), docs.len());
                docs.push(doc);
            }
        }
    }
    Ok(docs)
}

/// Deserialize a stored body back into a record.
pub fn from_body<T: DeserializeOwned>(body: Value) -> Result<T, StoreError> {
    Ok(serde_json::from_value(body)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Delete every document of `collection`, or only those of `scope`.
    async fn delete_scope(&self, collection: &str, scope: Option<&str>)
        -> Result<u64, StoreError>;

    /// Insert all documents as one unit. Keys must not already exist.
    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<u64, StoreError>;

    /// Insert or fully replace the document with the same key.
    async fn upsert(&self, collection: &str, doc: Document) -> Result<UpsertOutcome, StoreError>;

    /// Insert only when the key is new; never overwrites. Returns whether a
    /// document was written.
    async fn insert_if_absent(&self, collection: &str, doc: Document) -> Result<bool, StoreError>;

    /// Upsert a day bucket: create it, or append its `measurements` to the
    /// stored ones and add its `count`. A bucket whose `content_hash` equals
    /// the stored one is left untouched. Returns whether anything was written.
    async fn append_bucket(&self, collection: &str, doc: Document) -> Result<bool, StoreError>;

    async fn find_one(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError>;

    /// All documents of a scope (or the whole collection), ordered by key.
    async fn find_scope(&self, collection: &str, scope: Option<&str>)
        -> Result<Vec<Value>, StoreError>;

    async fn distinct_scopes(&self, collection: &str) -> Result<Vec<String>, StoreError>;
}
