//! Scraped reservoir operations table. Rows are insert-only: a time already
//! stored is never overwritten.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{Pipeline, WriteStats};
use crate::config::SourceConfig;
use crate::error::PipelineError;
use crate::http::RetryClient;
use crate::models::collections;
use crate::normalize::lake::parse_lake_table;
use crate::store::{to_documents, DocumentStore};

pub struct LakePipeline {
    source: SourceConfig,
    client: RetryClient,
    store: Arc<dyn DocumentStore>,
}

impl LakePipeline {
    pub fn new(source: SourceConfig, client: RetryClient, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            source,
            client,
            store,
        }
    }
}

#[async_trait]
impl Pipeline for LakePipeline {
    type State = ();

    fn name(&self) -> &str {
        "lake_scrape"
    }

    fn interval(&self) -> Duration {
        self.source.interval
    }

    async fn execute(&self, _: &mut (), stats: &mut WriteStats) -> Result<String, PipelineError> {
        // ---
        let html = self
            .client
            .get_text(&self.source.url, self.source.max_retries, self.source.timeout)
            .await?;

        let batch = parse_lake_table(&html)?;
        stats.record_batch(&batch);

        for doc in to_documents(&batch.records)? {
            if self.store.insert_if_absent(collections::LAKE_ROWS, doc).await? {
                stats.inserted += 1;
            } else {
                stats.skipped += 1;
            }
        }

        Ok(format!(
            "{} new row(s), {} already stored",
            stats.inserted, stats.skipped
        ))
    }
}
