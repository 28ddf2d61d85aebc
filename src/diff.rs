//! Diff engine: compute and apply the minimal write set.
//!
//! The backend charges for writes, so the engine bulk-reads the currently
//! indexed copies of the desired documents and only upserts the ones that
//! are absent or field-wise different. The upsert blocks until the backend
//! acknowledges it; the deletion reconciler's probes run afterwards and
//! must observe the new state.

use anyhow::Result;

use crate::backend::SearchBackend;
use crate::models::{EntityKind, SearchDocument};

#[derive(Debug, Default, Clone, Copy)]
pub struct DiffOutcome {
    /// Documents upserted because they were new or changed.
    pub written: u64,
    /// Documents left alone because the indexed copy was identical.
    pub skipped: u64,
}

/// Reconcile one batch of desired documents against the index.
pub async fn reconcile(
    backend: &dyn SearchBackend,
    kind: EntityKind,
    desired: &[SearchDocument],
) -> Result<DiffOutcome> {
    if desired.is_empty() {
        return Ok(DiffOutcome::default());
    }

    let ids: Vec<String> = desired.iter().map(|d| d.id.clone()).collect();
    let current = backend.get_docs(kind, &ids).await?;

    let to_write: Vec<SearchDocument> = desired
        .iter()
        .filter(|doc| current.get(&doc.id) != Some(*doc))
        .cloned()
        .collect();

    let outcome = DiffOutcome {
        written: to_write.len() as u64,
        skipped: (desired.len() - to_write.len()) as u64,
    };

    if !to_write.is_empty() {
        backend.upsert(kind, &to_write).await?;
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;

    fn doc(entity_id: &str, ordinal: i64, body: &str) -> SearchDocument {
        let mut d = SearchDocument::new(entity_id, ordinal, 1_700_000_000_000);
        d.body = body.to_string();
        d
    }

    #[tokio::test]
    async fn writes_new_documents() {
        let backend = MemoryBackend::with_default_indices();
        let docs = vec![doc("a", 0, "one"), doc("b", 0, "two")];

        let outcome = reconcile(&backend, EntityKind::Post, &docs).await.unwrap();
        assert_eq!(outcome.written, 2);
        assert_eq!(outcome.skipped, 0);
        assert_eq!(backend.upsert_calls(), 1);
    }

    #[tokio::test]
    async fn unchanged_documents_skip_the_write_entirely() {
        let backend = MemoryBackend::with_default_indices();
        let docs = vec![doc("a", 0, "one")];

        reconcile(&backend, EntityKind::Post, &docs).await.unwrap();
        let outcome = reconcile(&backend, EntityKind::Post, &docs).await.unwrap();

        assert_eq!(outcome.written, 0);
        assert_eq!(outcome.skipped, 1);
        // The second reconcile must not issue a bulk upsert at all.
        assert_eq!(backend.upsert_calls(), 1);
    }

    #[tokio::test]
    async fn changed_field_triggers_rewrite() {
        let backend = MemoryBackend::with_default_indices();
        reconcile(&backend, EntityKind::Post, &[doc("a", 0, "one")])
            .await
            .unwrap();

        let mut changed = doc("a", 0, "one");
        changed.base_score = Some(42);
        let outcome = reconcile(&backend, EntityKind::Post, &[changed])
            .await
            .unwrap();

        assert_eq!(outcome.written, 1);
        assert_eq!(backend.upsert_calls(), 2);
    }

    #[tokio::test]
    async fn empty_desired_set_is_a_no_op() {
        let backend = MemoryBackend::with_default_indices();
        let outcome = reconcile(&backend, EntityKind::Post, &[]).await.unwrap();
        assert_eq!(outcome.written, 0);
        assert_eq!(backend.upsert_calls(), 0);
    }
}
