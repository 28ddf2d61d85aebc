//! Batch synchronizer: full-collection export.
//!
//! Pages through the primary store with a monotone offset cursor, applies
//! the access check and the kind's transformer per entity, sub-batches the
//! resulting documents to the backend's bulk limit, and dispatches through
//! the diff engine and deletion reconciler. A run always completes: every
//! backend or transform failure is collected into the report's error list
//! instead of aborting sibling entities.

use anyhow::Result;
use tokio::time::{sleep, Duration};

use crate::backend::SearchBackend;
use crate::config::Config;
use crate::convert::RichTextConverter;
use crate::diff;
use crate::models::{EntityKind, SearchDocument, SyncReport};
use crate::progress::{SyncProgressEvent, SyncProgressReporter};
use crate::reconcile;
use crate::store::PrimaryStore;
use crate::transform::transformer_for;

#[derive(Debug, Default, Clone)]
pub struct SyncOptions {
    /// Page offset to start from, for resuming an interrupted run.
    pub offset: i64,
    /// Maximum entities to process this run.
    pub limit: Option<u64>,
    /// Batch size override; defaults to `sync.batch_size` from config.
    pub batch_size: Option<usize>,
    /// Count entities and documents without touching the backend.
    pub dry_run: bool,
}

/// The sync pipeline with its collaborators injected.
pub struct Synchronizer<'a> {
    pub(crate) store: &'a dyn PrimaryStore,
    pub(crate) backend: &'a dyn SearchBackend,
    pub(crate) converter: &'a dyn RichTextConverter,
    pub(crate) config: &'a Config,
}

impl<'a> Synchronizer<'a> {
    pub fn new(
        store: &'a dyn PrimaryStore,
        backend: &'a dyn SearchBackend,
        converter: &'a dyn RichTextConverter,
        config: &'a Config,
    ) -> Self {
        Self {
            store,
            backend,
            converter,
            config,
        }
    }

    /// Export one collection into its index.
    pub async fn full_sync(
        &self,
        kind: EntityKind,
        opts: &SyncOptions,
        progress: &dyn SyncProgressReporter,
    ) -> Result<SyncReport> {
        let transformer = transformer_for(kind, &self.config.truncation);
        let batch_size = opts.batch_size.unwrap_or(self.config.sync.batch_size);

        progress.report(SyncProgressEvent::Counting { kind });
        let total = self.store.count(kind).await?;

        let mut report = SyncReport {
            total,
            last_offset: opts.offset,
            ..Default::default()
        };
        let mut offset = opts.offset;

        loop {
            let entities = self.store.find_page(kind, batch_size, offset).await?;
            if entities.is_empty() {
                break;
            }
            let page_len = entities.len();

            let mut desired: Vec<SearchDocument> = Vec::new();
            // Entity ids with their new shard count, for tail trimming.
            let mut shard_counts: Vec<(String, i64)> = Vec::new();
            // Entities whose every shard must be removed.
            let mut to_remove: Vec<String> = Vec::new();
            let mut hit_limit = false;
            // Entities consumed from this page; the resume offset only
            // advances past these, so a limited run never skips rows.
            let mut consumed = 0usize;

            for entity in &entities {
                if let Some(limit) = opts.limit {
                    if report.processed >= limit {
                        hit_limit = true;
                        break;
                    }
                }
                report.processed += 1;
                consumed += 1;

                if !self.store.check_access(entity) {
                    to_remove.push(entity.id().to_string());
                    continue;
                }

                match transformer
                    .transform(entity, self.store, self.converter)
                    .await
                {
                    Ok(docs) if docs.is_empty() => to_remove.push(entity.id().to_string()),
                    Ok(docs) => {
                        shard_counts.push((entity.id().to_string(), docs.len() as i64));
                        desired.extend(docs);
                    }
                    Err(e) => {
                        report
                            .errors
                            .push(format!("transform {} {}: {}", kind, entity.id(), e));
                    }
                }
            }

            if opts.dry_run {
                report.planned += desired.len() as u64;
            } else {
                // A primary-store page can transform into more documents
                // than one backend request may contain (post sharding
                // multiplies the count), so sub-batch to the bulk limit.
                for chunk in desired.chunks(self.config.backend.max_batch_size) {
                    match diff::reconcile(self.backend, kind, chunk).await {
                        Ok(outcome) => {
                            report.written += outcome.written;
                            report.skipped += outcome.skipped;
                        }
                        Err(e) => {
                            report
                                .errors
                                .push(format!("upsert {} at offset {}: {}", kind, offset, e));
                        }
                    }
                }

                // Trim runs after the upsert above is acknowledged, so the
                // probes see the new shard set. Only posts ever shard.
                if kind == EntityKind::Post {
                    for (entity_id, keep) in &shard_counts {
                        match reconcile::trim_shards(self.backend, kind, entity_id, *keep).await {
                            Ok(n) => report.deleted += n,
                            Err(e) => {
                                report
                                    .errors
                                    .push(format!("trim {} {}: {}", kind, entity_id, e));
                            }
                        }
                    }
                }

                for entity_id in &to_remove {
                    match reconcile::delete_entity(self.backend, kind, entity_id).await {
                        Ok(n) => report.deleted += n,
                        Err(e) => {
                            report
                                .errors
                                .push(format!("delete {} {}: {}", kind, entity_id, e));
                        }
                    }
                }
            }

            offset += consumed as i64;
            report.last_offset = offset;
            progress.report(SyncProgressEvent::Syncing {
                kind,
                n: report.processed,
                total,
            });

            if hit_limit || page_len < batch_size {
                break;
            }
            if self.config.sync.page_delay_ms > 0 {
                sleep(Duration::from_millis(self.config.sync.page_delay_ms)).await;
            }
        }

        Ok(report)
    }
}
