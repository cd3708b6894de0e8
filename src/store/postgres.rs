//! PostgreSQL-backed [`DocumentStore`].
//!
//! All collections share the `documents` table created by
//! [`crate::schema::create_schema`]; a document is one row keyed by
//! `(collection, doc_key)` with its body in a JSONB column.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use super::{Document, DocumentStore, UpsertOutcome};
use crate::error::StoreError;

/// Rows per multi-value INSERT statement.
const INSERT_CHUNK: usize = 500;

#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn delete_scope(
        &self,
        collection: &str,
        scope: Option<&str>,
    ) -> Result<u64, StoreError> {
        // ---
        let result = sqlx::query(
            r#"
            DELETE FROM documents
            WHERE collection = $1
              AND ($2::text IS NULL OR scope = $2)
            "#,
        )
        .bind(collection)
        .bind(scope)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<u64, StoreError> {
        // ---
        if docs.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for chunk in docs.chunks(INSERT_CHUNK) {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO documents (collection, doc_key, scope, body) ");
            qb.push_values(chunk, |mut row, doc| {
                row.push_bind(collection)
                    .push_bind(&doc.key)
                    .push_bind(&doc.scope)
                    .push_bind(&doc.body);
            });
            inserted += qb.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn upsert(&self, collection: &str, doc: Document) -> Result<UpsertOutcome, StoreError> {
        // ---
        let row = sqlx::query(
            r#"
            INSERT INTO documents (collection, doc_key, scope, body)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (collection, doc_key) DO UPDATE SET
                scope      = EXCLUDED.scope,
                body       = EXCLUDED.body,
                updated_at = now()
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(collection)
        .bind(&doc.key)
        .bind(&doc.scope)
        .bind(&doc.body)
        .fetch_one(&self.pool)
        .await?;

        Ok(if row.try_get::<bool, _>("inserted")? {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn insert_if_absent(&self, collection: &str, doc: Document) -> Result<bool, StoreError> {
        // ---
        let result = sqlx::query(
            r#"
            INSERT INTO documents (collection, doc_key, scope, body)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (collection, doc_key) DO NOTHING
            "#,
        )
        .bind(collection)
        .bind(&doc.key)
        .bind(&doc.scope)
        .bind(&doc.body)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn append_bucket(&self, collection: &str, doc: Document) -> Result<bool, StoreError> {
        // ---
        // Single-row upsert so the append is atomic per bucket document.
        let result = sqlx::query(
            r#"
            INSERT INTO documents (collection, doc_key, scope, body)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (collection, doc_key) DO UPDATE SET
                body = jsonb_set(
                    jsonb_set(
                        jsonb_set(
                            documents.body,
                            '{measurements}',
                            COALESCE(documents.body->'measurements', '[]'::jsonb)
                                || COALESCE(EXCLUDED.body->'measurements', '[]'::jsonb)
                        ),
                        '{count}',
                        to_jsonb(
                            COALESCE((documents.body->>'count')::bigint, 0)
                                + COALESCE((EXCLUDED.body->>'count')::bigint, 0)
                        )
                    ),
                    '{content_hash}',
                    EXCLUDED.body->'content_hash'
                ),
                updated_at = now()
            WHERE documents.body->>'content_hash'
                IS DISTINCT FROM EXCLUDED.body->>'content_hash'
            "#,
        )
        .bind(collection)
        .bind(&doc.key)
        .bind(&doc.scope)
        .bind(&doc.body)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_one(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        // ---
        let body = sqlx::query_scalar::<_, Value>(
            "SELECT body FROM documents WHERE collection = $1 AND doc_key = $2",
        )
        .bind(collection)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(body)
    }

    async fn find_scope(
        &self,
        collection: &str,
        scope: Option<&str>,
    ) -> Result<Vec<Value>, StoreError> {
        // ---
        let bodies = sqlx::query_scalar::<_, Value>(
            r#"
            SELECT body FROM documents
            WHERE collection = $1
              AND ($2::text IS NULL OR scope = $2)
            ORDER BY doc_key
            "#,
        )
        .bind(collection)
        .bind(scope)
        .fetch_all(&self.pool)
        .await?;

        Ok(bodies)
    }

    async fn distinct_scopes(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        // ---
        let scopes = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT scope FROM documents
            WHERE collection = $1 AND scope IS NOT NULL
            ORDER BY scope
            "#,
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        Ok(scopes)
    }
}
