//! Index lifecycle manager.
//!
//! The backend's schema model is append-only, so schema changes go through
//! index versioning: each kind's stable alias points at exactly one
//! versioned physical index (`posts_v1692780000`), and a migration builds
//! a fresh index, copies the data server-side, and repoints the alias
//! atomically. Writers are only blocked during the short window where the
//! old index is read-only and the new one is not yet aliased.
//!
//! Unlike the sync pipeline, lifecycle failures propagate: these are rare
//! operator-triggered actions where failing fast beats limping on.
//! Concurrent migrations of the same kind are not defended against here;
//! serializing them is a deployment responsibility.

use anyhow::{bail, Result};
use tracing::info;

use crate::backend::SearchBackend;
use crate::models::EntityKind;

pub struct LifecycleManager<'a> {
    backend: &'a dyn SearchBackend,
}

impl<'a> LifecycleManager<'a> {
    pub fn new(backend: &'a dyn SearchBackend) -> Self {
        Self { backend }
    }

    /// Create or migrate the kind's index; returns the physical index name
    /// behind the alias afterwards.
    ///
    /// No alias yet: create a fresh versioned index and point the alias at
    /// it. Alias exists: old index goes read-only, a new index is created
    /// with the current mappings, the backend reindexes old into new, the
    /// alias swaps atomically, and only then is the old index deleted.
    pub async fn configure_index(&self, kind: EntityKind) -> Result<String> {
        let alias = kind.alias();
        let old = self.backend.resolve_alias(alias).await?;
        let new = versioned_name(alias, old.as_deref());
        let mappings = index_mappings(kind);

        match old {
            None => {
                self.backend.create_index(&new, &mappings).await?;
                self.backend.swap_alias(alias, None, &new).await?;
                info!(alias, index = %new, "created index");
            }
            Some(old) => {
                self.backend.set_read_only(&old, true).await?;
                self.backend.create_index(&new, &mappings).await?;
                self.backend.reindex(&old, &new).await?;
                self.backend.set_read_only(&new, false).await?;
                self.backend.swap_alias(alias, Some(&old), &new).await?;
                self.backend.delete_physical_index(&old).await?;
                info!(alias, from = %old, to = %new, "migrated index");
            }
        }

        Ok(new)
    }

    /// Delete the physical index behind the kind's alias. Erroring when no
    /// index exists is deliberate: calling this twice is a programmer
    /// error, not a condition to paper over.
    pub async fn delete_index(&self, kind: EntityKind) -> Result<()> {
        let alias = kind.alias();
        match self.backend.resolve_alias(alias).await? {
            Some(physical) => {
                self.backend.delete_physical_index(&physical).await?;
                info!(alias, index = %physical, "deleted index");
                Ok(())
            }
            None => bail!("no physical index behind alias '{}'", alias),
        }
    }
}

/// Versioned physical index name. Bumps past the current name when two
/// migrations land within the same second.
fn versioned_name(alias: &str, current: Option<&str>) -> String {
    let mut ts = chrono::Utc::now().timestamp();
    loop {
        let name = format!("{}_v{}", alias, ts);
        if current != Some(name.as_str()) {
            return name;
        }
        ts += 1;
    }
}

/// Field mappings for one kind's index. Identity and slug fields are
/// keywords, content is analyzed text, and the public date is an
/// epoch-millis date for range filtering.
pub fn index_mappings(kind: EntityKind) -> serde_json::Value {
    let mut properties = serde_json::Map::new();
    let mut put = |name: &str, value: serde_json::Value| {
        properties.insert(name.to_string(), value);
    };

    put("id", serde_json::json!({ "type": "keyword" }));
    put("entityId", serde_json::json!({ "type": "keyword" }));
    put("ordinal", serde_json::json!({ "type": "long" }));
    put("title", serde_json::json!({ "type": "text" }));
    put("slug", serde_json::json!({ "type": "keyword" }));
    put("body", serde_json::json!({ "type": "text" }));
    put(
        "publicDateMs",
        serde_json::json!({ "type": "date", "format": "epoch_millis" }),
    );

    match kind {
        EntityKind::Post => {
            put("authorId", serde_json::json!({ "type": "keyword" }));
            put("authorDisplayName", serde_json::json!({ "type": "text" }));
            put("authorSlug", serde_json::json!({ "type": "keyword" }));
            put("baseScore", serde_json::json!({ "type": "long" }));
        }
        EntityKind::Comment => {
            put("authorId", serde_json::json!({ "type": "keyword" }));
            put("authorDisplayName", serde_json::json!({ "type": "text" }));
            put("authorSlug", serde_json::json!({ "type": "keyword" }));
            put("postId", serde_json::json!({ "type": "keyword" }));
            put("postTitle", serde_json::json!({ "type": "text" }));
            put("postSlug", serde_json::json!({ "type": "keyword" }));
            put("baseScore", serde_json::json!({ "type": "long" }));
        }
        EntityKind::User => {
            put("karma", serde_json::json!({ "type": "long" }));
        }
        EntityKind::Sequence => {
            put("authorId", serde_json::json!({ "type": "keyword" }));
            put("authorDisplayName", serde_json::json!({ "type": "text" }));
            put("authorSlug", serde_json::json!({ "type": "keyword" }));
        }
        EntityKind::Tag => {
            put("postCount", serde_json::json!({ "type": "long" }));
        }
    }

    serde_json::json!({
        "settings": { "index": { "number_of_shards": 1 } },
        "mappings": { "properties": properties }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;

    #[tokio::test]
    async fn first_configure_creates_index_and_alias() {
        let backend = MemoryBackend::new();
        let manager = LifecycleManager::new(&backend);

        let physical = manager.configure_index(EntityKind::Post).await.unwrap();

        assert_eq!(
            backend.resolve_alias("posts").await.unwrap(),
            Some(physical.clone())
        );
        assert_eq!(backend.physical_indices(), vec![physical]);
    }

    #[tokio::test]
    async fn second_configure_migrates_and_drops_the_old_index() {
        let backend = MemoryBackend::new();
        let manager = LifecycleManager::new(&backend);

        let first = manager.configure_index(EntityKind::Post).await.unwrap();
        // Some pre-existing documents to carry across the migration.
        let docs = vec![crate::models::SearchDocument::new("p1", 0, 0)];
        backend.upsert(EntityKind::Post, &docs).await.unwrap();

        let second = manager.configure_index(EntityKind::Post).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(
            backend.resolve_alias("posts").await.unwrap(),
            Some(second.clone())
        );
        // Exactly one physical index remains, and the data moved with it.
        assert_eq!(backend.physical_indices(), vec![second]);
        assert!(backend.exists(EntityKind::Post, "p1_0").await.unwrap());
        assert_eq!(backend.doc_count(EntityKind::Post).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_index_errors_when_nothing_exists() {
        let backend = MemoryBackend::new();
        let manager = LifecycleManager::new(&backend);

        assert!(manager.delete_index(EntityKind::Tag).await.is_err());

        manager.configure_index(EntityKind::Tag).await.unwrap();
        manager.delete_index(EntityKind::Tag).await.unwrap();
        assert!(backend.physical_indices().is_empty());
    }

    #[tokio::test]
    async fn delete_then_configure_takes_the_create_path() {
        let backend = MemoryBackend::new();
        let manager = LifecycleManager::new(&backend);

        manager.configure_index(EntityKind::Tag).await.unwrap();
        manager.delete_index(EntityKind::Tag).await.unwrap();
        // The alias must die with its index, or the next configure would
        // try to migrate from an index that no longer exists.
        assert_eq!(backend.resolve_alias("tags").await.unwrap(), None);

        let physical = manager.configure_index(EntityKind::Tag).await.unwrap();
        assert_eq!(
            backend.resolve_alias("tags").await.unwrap(),
            Some(physical.clone())
        );
        assert_eq!(backend.physical_indices(), vec![physical]);
    }

    #[test]
    fn versioned_name_bumps_past_collision() {
        let ts = chrono::Utc::now().timestamp();
        let current = format!("posts_v{}", ts);
        let next = versioned_name("posts", Some(&current));
        assert_ne!(next, current);
        assert!(next.starts_with("posts_v"));
    }
}
