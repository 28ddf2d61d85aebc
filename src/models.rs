//! Core data models for the search synchronization pipeline.
//!
//! These types represent the source-of-truth forum entities, the flat
//! documents written to the search backend, and the per-run report that
//! the batch synchronizer returns.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The five source collections mirrored into the search backend.
///
/// Each kind writes to its own index behind a stable alias, so syncs of
/// different kinds never contend with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Post,
    Comment,
    User,
    Sequence,
    Tag,
}

impl EntityKind {
    /// All kinds, in the order a full rebuild processes them.
    pub fn all() -> [EntityKind; 5] {
        [
            EntityKind::Post,
            EntityKind::Comment,
            EntityKind::User,
            EntityKind::Sequence,
            EntityKind::Tag,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Post => "post",
            EntityKind::Comment => "comment",
            EntityKind::User => "user",
            EntityKind::Sequence => "sequence",
            EntityKind::Tag => "tag",
        }
    }

    /// Stable alias name for this kind's index. Readers and writers only
    /// ever reference the alias; physical index names are versioned and
    /// owned by the lifecycle manager.
    pub fn alias(&self) -> &'static str {
        match self {
            EntityKind::Post => "posts",
            EntityKind::Comment => "comments",
            EntityKind::User => "users",
            EntityKind::Sequence => "sequences",
            EntityKind::Tag => "tags",
        }
    }

    /// Parse a kind from CLI input. Accepts singular or plural form.
    pub fn parse(s: &str) -> Option<EntityKind> {
        match s {
            "post" | "posts" => Some(EntityKind::Post),
            "comment" | "comments" => Some(EntityKind::Comment),
            "user" | "users" => Some(EntityKind::User),
            "sequence" | "sequences" => Some(EntityKind::Sequence),
            "tag" | "tags" => Some(EntityKind::Tag),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A forum post. Owned by the primary store; this subsystem only reads it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub body_html: String,
    pub author_id: Option<String>,
    pub base_score: i64,
    /// Moderation status. `2` is approved; everything else stays out of search.
    pub status: i64,
    pub draft: bool,
    pub rejected: bool,
    pub author_is_unreviewed: bool,
    /// Row-level ACL: visible only to logged-in users, so never indexed
    /// into the anonymous search index.
    pub logged_in_only: bool,
    pub posted_at: i64,
}

/// A comment on a post.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Comment {
    pub id: String,
    pub post_id: Option<String>,
    pub author_id: Option<String>,
    pub body_html: String,
    pub base_score: i64,
    pub deleted: bool,
    pub rejected: bool,
    pub author_is_unreviewed: bool,
    pub posted_at: i64,
}

/// A user profile.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub slug: String,
    pub bio_html: String,
    pub karma: i64,
    pub deleted: bool,
    /// Opt-out flag: the user asked not to appear in search.
    pub no_search_index: bool,
    pub created_at: i64,
}

/// A curated sequence of posts.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Sequence {
    pub id: String,
    pub title: String,
    pub author_id: Option<String>,
    pub body_html: String,
    pub deleted: bool,
    pub draft: bool,
    pub hidden: bool,
    pub created_at: i64,
}

/// A tag / topic page.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description_html: String,
    pub post_count: i64,
    pub deleted: bool,
    pub admin_only: bool,
    pub created_at: i64,
}

/// Any source entity, as returned by the primary store.
#[derive(Debug, Clone)]
pub enum Entity {
    Post(Post),
    Comment(Comment),
    User(User),
    Sequence(Sequence),
    Tag(Tag),
}

impl Entity {
    pub fn id(&self) -> &str {
        match self {
            Entity::Post(p) => &p.id,
            Entity::Comment(c) => &c.id,
            Entity::User(u) => &u.id,
            Entity::Sequence(s) => &s.id,
            Entity::Tag(t) => &t.id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Post(_) => EntityKind::Post,
            Entity::Comment(_) => EntityKind::Comment,
            Entity::User(_) => EntityKind::User,
            Entity::Sequence(_) => EntityKind::Sequence,
            Entity::Tag(_) => EntityKind::Tag,
        }
    }
}

/// The externally-indexed representation of one shard of an entity.
///
/// The wire form is camelCase JSON. Field-wise equality over this struct is
/// what the diff engine uses to decide whether an upsert is worth issuing,
/// so every field here participates in `PartialEq`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDocument {
    /// External document id: `shard::shard_id(entity_id, ordinal)`.
    pub id: String,
    pub entity_id: String,
    /// Shard ordinal. 0 for the first (or only) shard; contiguous from 0.
    pub ordinal: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_score: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub karma: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_count: Option<i64>,
    /// Publication date in epoch milliseconds, for sort/filter.
    pub public_date_ms: i64,
}

impl SearchDocument {
    /// Blank document for one shard of an entity. Transformers fill in the
    /// kind-specific fields.
    pub fn new(entity_id: &str, ordinal: i64, public_date_ms: i64) -> Self {
        SearchDocument {
            id: crate::shard::shard_id(entity_id, ordinal),
            entity_id: entity_id.to_string(),
            ordinal,
            title: None,
            slug: None,
            body: String::new(),
            author_id: None,
            author_display_name: None,
            author_slug: None,
            post_id: None,
            post_title: None,
            post_slug: None,
            base_score: None,
            karma: None,
            post_count: None,
            public_date_ms,
        }
    }
}

/// Summary of one sync run. Errors are aggregated rather than aborting the
/// run; callers decide how loudly to report them.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Entities examined this run.
    pub processed: u64,
    /// Total entities matching the kind's candidate filter.
    pub total: i64,
    /// Documents actually written (the diff engine decided they changed).
    pub written: u64,
    /// Documents skipped because the indexed copy was already identical.
    pub skipped: u64,
    /// Shards deleted (ineligible entities plus trimmed tails).
    pub deleted: u64,
    /// Documents that a dry run would have handed to the diff engine.
    pub planned: u64,
    /// Page offset after the last completed page, for resuming.
    pub last_offset: i64,
    pub errors: Vec<String>,
}

impl SyncReport {
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }
}
