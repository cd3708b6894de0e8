//! Database schema management for `codemetal-hydroflow`.
//!
//! Ensures the JSONB document table and its indexes exist before any pipeline
//! writes. Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates the `documents` table that backs every collection of
/// [`crate::store::PgDocumentStore`]. Safe to call on every startup; no-op if
/// objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    // One row per document; collections are a column, not separate tables
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            collection  TEXT        NOT NULL,
            doc_key     TEXT        NOT NULL,
            scope       TEXT,
            body        JSONB       NOT NULL,
            updated_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
            PRIMARY KEY (collection, doc_key)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Scoped replace and per-station reads
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_documents_collection_scope
            ON documents (collection, scope);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
