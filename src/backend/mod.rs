//! Search backend abstraction.
//!
//! [`SearchBackend`] is the seam between the sync pipeline and the concrete
//! search service. [`elastic::ElasticBackend`] talks to an
//! Elasticsearch-compatible REST API; [`memory::MemoryBackend`] is the
//! in-memory implementation used by tests.
//!
//! Document operations address indices by the kind's stable alias; the
//! physical-index administration surface at the bottom of the trait exists
//! for the lifecycle manager alone.

pub mod elastic;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use crate::models::{EntityKind, SearchDocument};

#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Bulk get-by-id. Ids that are not indexed are simply absent from the
    /// returned map. A kind whose index does not exist yet reads as empty.
    async fn get_docs(
        &self,
        kind: EntityKind,
        ids: &[String],
    ) -> Result<HashMap<String, SearchDocument>>;

    /// Bulk upsert. Blocks until the write is acknowledged and visible to
    /// subsequent reads; the deletion reconciler's probes depend on
    /// read-after-write consistency here.
    async fn upsert(&self, kind: EntityKind, docs: &[SearchDocument]) -> Result<()>;

    /// Bulk delete by id. Deleting an absent id is not an error.
    async fn delete(&self, kind: EntityKind, ids: &[String]) -> Result<()>;

    /// Existence probe for a single document id.
    async fn exists(&self, kind: EntityKind, id: &str) -> Result<bool>;

    /// All indexed shard ids belonging to one entity, via a term query on
    /// the identity field.
    async fn find_shard_ids(&self, kind: EntityKind, entity_id: &str) -> Result<Vec<String>>;

    /// Total documents behind the kind's alias.
    async fn doc_count(&self, kind: EntityKind) -> Result<i64>;

    /// Reachability check for status listings.
    async fn ping(&self) -> Result<bool>;

    // Physical index administration (lifecycle manager only).

    /// Physical index a given alias points at, if any.
    async fn resolve_alias(&self, alias: &str) -> Result<Option<String>>;

    async fn create_index(&self, name: &str, mappings: &serde_json::Value) -> Result<()>;

    /// Atomically repoint `alias` from `old` (if given) to `new`. The
    /// backend applies both actions in one request, so the alias is never
    /// dangling.
    async fn swap_alias(&self, alias: &str, old: Option<&str>, new: &str) -> Result<()>;

    /// Native server-side copy from one physical index to another. Blocks
    /// until the copy completes.
    async fn reindex(&self, from: &str, to: &str) -> Result<()>;

    async fn set_read_only(&self, name: &str, read_only: bool) -> Result<()>;

    async fn delete_physical_index(&self, name: &str) -> Result<()>;
}
