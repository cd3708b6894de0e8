//! Full replace: delete everything in a collection (or one scope of it), then
//! insert the new batch.
//!
//! The two steps are not atomic. A failed insert after a successful delete
//! leaves the scope empty until the next successful cycle; callers get a
//! [`ReplaceError::AfterDelete`] so that case is never mistaken for a plain
//! fetch failure.

use crate::error::ReplaceError;
use crate::store::{Document, DocumentStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplaceOutcome {
    pub deleted: u64,
    pub inserted: u64,
}

pub async fn replace_all(
    store: &dyn DocumentStore,
    collection: &str,
    scope: Option<&str>,
    docs: Vec<Document>,
) -> Result<ReplaceOutcome, ReplaceError> {
    // ---
    let deleted = store
        .delete_scope(collection, scope)
        .await
        .map_err(|source| ReplaceError::BeforeDelete {
            collection: collection.to_string(),
            source,
        })?;

    let inserted = match store.insert_many(collection, docs).await {
        Ok(n) => n,
        Err(source) => {
            tracing::error!(
                collection,
                scope = scope.unwrap_or("*"),
                deleted,
                error = %source,
                "insert failed after delete; collection left without data until next cycle"
            );
            return Err(ReplaceError::AfterDelete {
                collection: collection.to_string(),
                deleted,
                source,
            });
        }
    };

    tracing::debug!(collection, deleted, inserted, "replaced");
    Ok(ReplaceOutcome { deleted, inserted })
}
