//! Incremental synchronizer: single-entity updates from the write path.
//!
//! The domain event dispatcher invokes [`Synchronizer::on_entity_saved`]
//! after a create or edit. It runs the same transform → diff → reconcile
//! pipeline as a full sync, for exactly one entity, and never propagates
//! failures back into the caller's write path: a stale search result is an
//! acceptable failure mode, a failed post save is not.

use anyhow::Result;
use tracing::warn;

use crate::diff;
use crate::models::{EntityKind, SyncReport};
use crate::reconcile;
use crate::sync::Synchronizer;
use crate::transform::transformer_for;

impl<'a> Synchronizer<'a> {
    /// Sync exactly one entity: upsert its current shards, trim any stale
    /// tail, or remove it from the index entirely if it is gone or no
    /// longer eligible.
    pub async fn sync_one(&self, kind: EntityKind, id: &str) -> Result<SyncReport> {
        let transformer = transformer_for(kind, &self.config.truncation);
        let mut report = SyncReport {
            total: 1,
            ..Default::default()
        };

        let entity = match self.store.find_one(kind, id).await? {
            Some(entity) => entity,
            None => {
                // Deleted from the primary store; nothing to transform.
                report.deleted += reconcile::delete_entity(self.backend, kind, id).await?;
                return Ok(report);
            }
        };
        report.processed = 1;

        if !self.store.check_access(&entity) {
            report.deleted += reconcile::delete_entity(self.backend, kind, id).await?;
            return Ok(report);
        }

        let docs = match transformer
            .transform(&entity, self.store, self.converter)
            .await
        {
            Ok(docs) => docs,
            Err(e) => {
                report.errors.push(format!("transform {} {}: {}", kind, id, e));
                return Ok(report);
            }
        };

        if docs.is_empty() {
            report.deleted += reconcile::delete_entity(self.backend, kind, id).await?;
            return Ok(report);
        }

        match diff::reconcile(self.backend, kind, &docs).await {
            Ok(outcome) => {
                report.written += outcome.written;
                report.skipped += outcome.skipped;
            }
            Err(e) => {
                report.errors.push(format!("upsert {} {}: {}", kind, id, e));
                return Ok(report);
            }
        }

        // Upsert acknowledged; now the probes reflect the new shard count.
        match reconcile::trim_shards(self.backend, kind, id, docs.len() as i64).await {
            Ok(n) => report.deleted += n,
            Err(e) => report.errors.push(format!("trim {} {}: {}", kind, id, e)),
        }

        Ok(report)
    }

    /// Write-path hook: named handler for "entity created/edited" events.
    /// Logs and swallows every failure.
    pub async fn on_entity_saved(&self, kind: EntityKind, id: &str) {
        match self.sync_one(kind, id).await {
            Ok(report) if !report.ok() => {
                warn!(kind = %kind, id, errors = ?report.errors, "incremental sync finished with errors");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(kind = %kind, id, error = %e, "incremental sync failed");
            }
        }
    }
}
