//! In-memory [`SearchBackend`] implementation for testing.
//!
//! Uses `HashMap`s behind `std::sync::RwLock` for thread safety. Writes are
//! immediately visible, which satisfies the acknowledged-write contract
//! trivially. The backend also counts bulk upsert calls so tests can assert
//! the diff engine's write-avoidance behavior.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{EntityKind, SearchDocument};

use super::SearchBackend;

pub struct MemoryBackend {
    /// Physical index name -> document id -> document.
    indices: RwLock<HashMap<String, HashMap<String, SearchDocument>>>,
    /// Alias -> physical index name.
    aliases: RwLock<HashMap<String, String>>,
    read_only: RwLock<HashSet<String>>,
    upsert_calls: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            indices: RwLock::new(HashMap::new()),
            aliases: RwLock::new(HashMap::new()),
            read_only: RwLock::new(HashSet::new()),
            upsert_calls: AtomicU64::new(0),
        }
    }

    /// Backend with one pre-aliased physical index per kind, for tests that
    /// exercise the sync pipeline without the lifecycle manager.
    pub fn with_default_indices() -> Self {
        let backend = Self::new();
        {
            let mut indices = backend.indices.write().unwrap();
            let mut aliases = backend.aliases.write().unwrap();
            for kind in EntityKind::all() {
                let physical = format!("{}_v0", kind.alias());
                indices.insert(physical.clone(), HashMap::new());
                aliases.insert(kind.alias().to_string(), physical);
            }
        }
        backend
    }

    /// Number of bulk upsert calls issued so far.
    pub fn upsert_calls(&self) -> u64 {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    /// All physical index names, for lifecycle assertions.
    pub fn physical_indices(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indices.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    fn physical_for(&self, alias: &str) -> Result<String> {
        match self.aliases.read().unwrap().get(alias) {
            Some(physical) => Ok(physical.clone()),
            None => bail!("no index behind alias '{}'", alias),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchBackend for MemoryBackend {
    async fn get_docs(
        &self,
        kind: EntityKind,
        ids: &[String],
    ) -> Result<HashMap<String, SearchDocument>> {
        let physical = match self.aliases.read().unwrap().get(kind.alias()) {
            Some(p) => p.clone(),
            None => return Ok(HashMap::new()),
        };
        let indices = self.indices.read().unwrap();
        let docs = match indices.get(&physical) {
            Some(docs) => docs,
            None => return Ok(HashMap::new()),
        };
        Ok(ids
            .iter()
            .filter_map(|id| docs.get(id).map(|d| (id.clone(), d.clone())))
            .collect())
    }

    async fn upsert(&self, kind: EntityKind, docs: &[SearchDocument]) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);

        let physical = self.physical_for(kind.alias())?;
        if self.read_only.read().unwrap().contains(&physical) {
            bail!("index '{}' is read-only", physical);
        }
        let mut indices = self.indices.write().unwrap();
        let index = indices
            .get_mut(&physical)
            .ok_or_else(|| anyhow::anyhow!("physical index '{}' missing", physical))?;
        for doc in docs {
            index.insert(doc.id.clone(), doc.clone());
        }
        Ok(())
    }

    async fn delete(&self, kind: EntityKind, ids: &[String]) -> Result<()> {
        let physical = self.physical_for(kind.alias())?;
        let mut indices = self.indices.write().unwrap();
        if let Some(index) = indices.get_mut(&physical) {
            for id in ids {
                index.remove(id);
            }
        }
        Ok(())
    }

    async fn exists(&self, kind: EntityKind, id: &str) -> Result<bool> {
        let physical = match self.aliases.read().unwrap().get(kind.alias()) {
            Some(p) => p.clone(),
            None => return Ok(false),
        };
        let indices = self.indices.read().unwrap();
        Ok(indices
            .get(&physical)
            .map(|index| index.contains_key(id))
            .unwrap_or(false))
    }

    async fn find_shard_ids(&self, kind: EntityKind, entity_id: &str) -> Result<Vec<String>> {
        let physical = match self.aliases.read().unwrap().get(kind.alias()) {
            Some(p) => p.clone(),
            None => return Ok(Vec::new()),
        };
        let indices = self.indices.read().unwrap();
        let mut ids: Vec<String> = indices
            .get(&physical)
            .map(|index| {
                index
                    .values()
                    .filter(|doc| doc.entity_id == entity_id)
                    .map(|doc| doc.id.clone())
                    .collect()
            })
            .unwrap_or_default();
        ids.sort();
        Ok(ids)
    }

    async fn doc_count(&self, kind: EntityKind) -> Result<i64> {
        let physical = match self.aliases.read().unwrap().get(kind.alias()) {
            Some(p) => p.clone(),
            None => return Ok(0),
        };
        let indices = self.indices.read().unwrap();
        Ok(indices
            .get(&physical)
            .map(|index| index.len() as i64)
            .unwrap_or(0))
    }

    async fn ping(&self) -> Result<bool> {
        Ok(true)
    }

    async fn resolve_alias(&self, alias: &str) -> Result<Option<String>> {
        Ok(self.aliases.read().unwrap().get(alias).cloned())
    }

    async fn create_index(&self, name: &str, _mappings: &serde_json::Value) -> Result<()> {
        let mut indices = self.indices.write().unwrap();
        if indices.contains_key(name) {
            bail!("index '{}' already exists", name);
        }
        indices.insert(name.to_string(), HashMap::new());
        Ok(())
    }

    async fn swap_alias(&self, alias: &str, old: Option<&str>, new: &str) -> Result<()> {
        let mut aliases = self.aliases.write().unwrap();
        if let Some(old) = old {
            if aliases.get(alias).map(String::as_str) != Some(old) {
                bail!("alias '{}' does not point at '{}'", alias, old);
            }
        }
        aliases.insert(alias.to_string(), new.to_string());
        Ok(())
    }

    async fn reindex(&self, from: &str, to: &str) -> Result<()> {
        let mut indices = self.indices.write().unwrap();
        let docs = match indices.get(from) {
            Some(docs) => docs.clone(),
            None => bail!("source index '{}' missing", from),
        };
        let dest = indices
            .get_mut(to)
            .ok_or_else(|| anyhow::anyhow!("destination index '{}' missing", to))?;
        dest.extend(docs);
        Ok(())
    }

    async fn set_read_only(&self, name: &str, read_only: bool) -> Result<()> {
        let mut set = self.read_only.write().unwrap();
        if read_only {
            set.insert(name.to_string());
        } else {
            set.remove(name);
        }
        Ok(())
    }

    async fn delete_physical_index(&self, name: &str) -> Result<()> {
        let mut indices = self.indices.write().unwrap();
        if indices.remove(name).is_none() {
            bail!("index '{}' does not exist", name);
        }
        // The real backend drops aliases together with the index they
        // point at; a deleted index must not leave a dangling alias.
        self.aliases
            .write()
            .unwrap()
            .retain(|_, target| target != name);
        self.read_only.write().unwrap().remove(name);
        Ok(())
    }
}
