//! Deletion reconciler.
//!
//! Two deletion paths keep the index free of unreachable documents:
//! removing every shard of an entity that is no longer eligible, and
//! trimming the orphaned tail ordinals of an entity whose shard count
//! shrank. Both must run after the diff engine's upsert has been
//! acknowledged, so probes observe the new document set.

use anyhow::Result;
use tracing::debug;

use crate::backend::SearchBackend;
use crate::models::EntityKind;
use crate::shard::shard_id;

/// Remove every indexed shard of an entity. Used when the transformer
/// judged the entity ineligible (deleted, rejected, unreviewed author,
/// privacy change) or when the entity vanished from the primary store.
pub async fn delete_entity(
    backend: &dyn SearchBackend,
    kind: EntityKind,
    entity_id: &str,
) -> Result<u64> {
    let ids = backend.find_shard_ids(kind, entity_id).await?;
    if ids.is_empty() {
        return Ok(0);
    }
    debug!(kind = %kind, entity_id, shards = ids.len(), "deleting all shards");
    backend.delete(kind, &ids).await?;
    Ok(ids.len() as u64)
}

/// Remove trailing orphan shards after a shrink: the entity now has
/// ordinals `0..keep`, so probe `keep, keep+1, ...` until a miss and
/// delete every hit. Ordinals are contiguous, so the first miss ends the
/// scan. One existence probe per orphan.
pub async fn trim_shards(
    backend: &dyn SearchBackend,
    kind: EntityKind,
    entity_id: &str,
    keep: i64,
) -> Result<u64> {
    let mut orphans = Vec::new();
    let mut ordinal = keep;
    loop {
        let id = shard_id(entity_id, ordinal);
        if !backend.exists(kind, &id).await? {
            break;
        }
        orphans.push(id);
        ordinal += 1;
    }

    if orphans.is_empty() {
        return Ok(0);
    }
    debug!(kind = %kind, entity_id, keep, orphans = orphans.len(), "trimming stale shards");
    backend.delete(kind, &orphans).await?;
    Ok(orphans.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::models::SearchDocument;

    async fn seed(backend: &MemoryBackend, entity_id: &str, shards: i64) {
        let docs: Vec<SearchDocument> = (0..shards)
            .map(|i| SearchDocument::new(entity_id, i, 0))
            .collect();
        backend.upsert(EntityKind::Post, &docs).await.unwrap();
    }

    #[tokio::test]
    async fn delete_entity_removes_every_shard() {
        let backend = MemoryBackend::with_default_indices();
        seed(&backend, "p1", 4).await;
        seed(&backend, "p2", 1).await;

        let deleted = delete_entity(&backend, EntityKind::Post, "p1").await.unwrap();
        assert_eq!(deleted, 4);
        assert_eq!(
            backend.find_shard_ids(EntityKind::Post, "p1").await.unwrap(),
            Vec::<String>::new()
        );
        // Other entities untouched.
        assert!(backend.exists(EntityKind::Post, "p2_0").await.unwrap());
    }

    #[tokio::test]
    async fn delete_entity_with_nothing_indexed_is_zero() {
        let backend = MemoryBackend::with_default_indices();
        let deleted = delete_entity(&backend, EntityKind::Post, "ghost").await.unwrap();
        assert_eq!(deleted, 0);
    }

    #[tokio::test]
    async fn trim_removes_only_the_tail() {
        let backend = MemoryBackend::with_default_indices();
        seed(&backend, "p1", 5).await;

        let trimmed = trim_shards(&backend, EntityKind::Post, "p1", 2).await.unwrap();
        assert_eq!(trimmed, 3);
        assert!(backend.exists(EntityKind::Post, "p1_0").await.unwrap());
        assert!(backend.exists(EntityKind::Post, "p1_1").await.unwrap());
        assert!(!backend.exists(EntityKind::Post, "p1_2").await.unwrap());
    }

    #[tokio::test]
    async fn trim_is_a_no_op_when_nothing_shrank() {
        let backend = MemoryBackend::with_default_indices();
        seed(&backend, "p1", 2).await;

        let trimmed = trim_shards(&backend, EntityKind::Post, "p1", 2).await.unwrap();
        assert_eq!(trimmed, 0);
        assert!(backend.exists(EntityKind::Post, "p1_1").await.unwrap());
    }
}
