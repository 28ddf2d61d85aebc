//! Per-kind document transformers.
//!
//! A [`DocumentTransformer`] maps one source entity to zero or more
//! [`SearchDocument`]s: zero when the entity fails its kind's eligibility
//! predicate (the signal to delete everything indexed for it), several when
//! a post body shards across paragraphs, one otherwise.
//!
//! Transformers are selected by kind through [`transformer_for`] and take
//! the primary store and rich-text converter as arguments, so there is no
//! global registration anywhere.
//!
//! Failure semantics: a rich-text conversion error degrades that field to
//! an empty string and is logged; a missing cross-reference (deleted
//! author, vanished parent post) simply leaves the denormalized fields
//! unset. Neither aborts the entity, let alone the batch.

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::warn;

use crate::config::TruncationConfig;
use crate::convert::RichTextConverter;
use crate::models::{Entity, EntityKind, SearchDocument};
use crate::store::PrimaryStore;

#[async_trait]
pub trait DocumentTransformer: Send + Sync {
    fn kind(&self) -> EntityKind;

    /// Pure eligibility predicate over entity state.
    fn eligible(&self, entity: &Entity) -> bool;

    /// Entity -> search documents. Empty means "remove this entity from
    /// the index".
    async fn transform(
        &self,
        entity: &Entity,
        store: &dyn PrimaryStore,
        converter: &dyn RichTextConverter,
    ) -> Result<Vec<SearchDocument>>;
}

/// The transformer for a kind, with the configured truncation budgets.
pub fn transformer_for(
    kind: EntityKind,
    budgets: &TruncationConfig,
) -> Box<dyn DocumentTransformer> {
    let budgets = budgets.clone();
    match kind {
        EntityKind::Post => Box::new(PostTransformer { budgets }),
        EntityKind::Comment => Box::new(CommentTransformer { budgets }),
        EntityKind::User => Box::new(UserTransformer { budgets }),
        EntityKind::Sequence => Box::new(SequenceTransformer { budgets }),
        EntityKind::Tag => Box::new(TagTransformer { budgets }),
    }
}

/// Hard character-count slice. A character budget approximates the
/// backend's byte limit; see the `[truncation]` config section.
fn truncate_chars(text: &str, budget: usize) -> String {
    text.chars().take(budget).collect()
}

/// Convert rich text, degrading to empty on failure.
fn convert_or_empty(converter: &dyn RichTextConverter, html: &str, entity_id: &str) -> String {
    match converter.to_text(html) {
        Ok(text) => text,
        Err(e) => {
            warn!(entity_id, error = %e, "rich text conversion failed; indexing empty body");
            String::new()
        }
    }
}

/// Denormalized author fields, non-fatal when the author is missing.
async fn author_fields(
    store: &dyn PrimaryStore,
    author_id: Option<&str>,
) -> (Option<String>, Option<String>) {
    let author_id = match author_id {
        Some(id) => id,
        None => return (None, None),
    };
    match store.find_one(EntityKind::User, author_id).await {
        Ok(Some(Entity::User(user))) => (Some(user.display_name), Some(user.slug)),
        Ok(_) => (None, None),
        Err(e) => {
            warn!(author_id, error = %e, "author lookup failed; omitting author fields");
            (None, None)
        }
    }
}

struct PostTransformer {
    budgets: TruncationConfig,
}

#[async_trait]
impl DocumentTransformer for PostTransformer {
    fn kind(&self) -> EntityKind {
        EntityKind::Post
    }

    fn eligible(&self, entity: &Entity) -> bool {
        match entity {
            Entity::Post(p) => {
                p.status == 2 && !p.draft && !p.rejected && !p.author_is_unreviewed
            }
            _ => false,
        }
    }

    async fn transform(
        &self,
        entity: &Entity,
        store: &dyn PrimaryStore,
        converter: &dyn RichTextConverter,
    ) -> Result<Vec<SearchDocument>> {
        let post = match entity {
            Entity::Post(p) => p,
            other => bail!("post transformer got a {}", other.kind()),
        };
        if !self.eligible(entity) {
            return Ok(Vec::new());
        }

        let (author_name, author_slug) = author_fields(store, post.author_id.as_deref()).await;
        let body = convert_or_empty(converter, &post.body_html, &post.id);
        let public_date_ms = post.posted_at * 1000;

        let fill = |mut doc: SearchDocument| {
            doc.title = Some(post.title.clone());
            doc.slug = Some(post.slug.clone());
            doc.author_id = post.author_id.clone();
            doc.author_display_name = author_name.clone();
            doc.author_slug = author_slug.clone();
            doc.base_score = Some(post.base_score);
            doc
        };

        // One document per paragraph; the only kind whose body can exceed
        // the backend's per-document budget. An empty body still indexes a
        // single shard so the post stays findable by title and metadata.
        let paragraphs: Vec<&str> = body
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        if paragraphs.is_empty() {
            return Ok(vec![fill(SearchDocument::new(&post.id, 0, public_date_ms))]);
        }

        Ok(paragraphs
            .iter()
            .enumerate()
            .map(|(i, paragraph)| {
                let mut doc = fill(SearchDocument::new(&post.id, i as i64, public_date_ms));
                doc.body = truncate_chars(paragraph, self.budgets.post_paragraph_chars);
                doc
            })
            .collect())
    }
}

struct CommentTransformer {
    budgets: TruncationConfig,
}

#[async_trait]
impl DocumentTransformer for CommentTransformer {
    fn kind(&self) -> EntityKind {
        EntityKind::Comment
    }

    fn eligible(&self, entity: &Entity) -> bool {
        match entity {
            Entity::Comment(c) => !c.deleted && !c.rejected && !c.author_is_unreviewed,
            _ => false,
        }
    }

    async fn transform(
        &self,
        entity: &Entity,
        store: &dyn PrimaryStore,
        converter: &dyn RichTextConverter,
    ) -> Result<Vec<SearchDocument>> {
        let comment = match entity {
            Entity::Comment(c) => c,
            other => bail!("comment transformer got a {}", other.kind()),
        };
        if !self.eligible(entity) {
            return Ok(Vec::new());
        }

        let mut doc = SearchDocument::new(&comment.id, 0, comment.posted_at * 1000);
        doc.body = truncate_chars(
            &convert_or_empty(converter, &comment.body_html, &comment.id),
            self.budgets.comment_chars,
        );
        doc.base_score = Some(comment.base_score);
        doc.author_id = comment.author_id.clone();

        let (author_name, author_slug) = author_fields(store, comment.author_id.as_deref()).await;
        doc.author_display_name = author_name;
        doc.author_slug = author_slug;

        if let Some(post_id) = &comment.post_id {
            doc.post_id = Some(post_id.clone());
            match store.find_one(EntityKind::Post, post_id).await {
                Ok(Some(Entity::Post(post))) => {
                    doc.post_title = Some(post.title);
                    doc.post_slug = Some(post.slug);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(post_id, error = %e, "parent post lookup failed; omitting post fields");
                }
            }
        }

        Ok(vec![doc])
    }
}

struct UserTransformer {
    budgets: TruncationConfig,
}

#[async_trait]
impl DocumentTransformer for UserTransformer {
    fn kind(&self) -> EntityKind {
        EntityKind::User
    }

    fn eligible(&self, entity: &Entity) -> bool {
        match entity {
            Entity::User(u) => !u.deleted && !u.no_search_index,
            _ => false,
        }
    }

    async fn transform(
        &self,
        entity: &Entity,
        _store: &dyn PrimaryStore,
        converter: &dyn RichTextConverter,
    ) -> Result<Vec<SearchDocument>> {
        let user = match entity {
            Entity::User(u) => u,
            other => bail!("user transformer got a {}", other.kind()),
        };
        if !self.eligible(entity) {
            return Ok(Vec::new());
        }

        let mut doc = SearchDocument::new(&user.id, 0, user.created_at * 1000);
        doc.title = Some(user.display_name.clone());
        doc.slug = Some(user.slug.clone());
        doc.body = truncate_chars(
            &convert_or_empty(converter, &user.bio_html, &user.id),
            self.budgets.user_bio_chars,
        );
        doc.karma = Some(user.karma);
        Ok(vec![doc])
    }
}

struct SequenceTransformer {
    budgets: TruncationConfig,
}

#[async_trait]
impl DocumentTransformer for SequenceTransformer {
    fn kind(&self) -> EntityKind {
        EntityKind::Sequence
    }

    fn eligible(&self, entity: &Entity) -> bool {
        match entity {
            Entity::Sequence(s) => !s.deleted && !s.draft && !s.hidden,
            _ => false,
        }
    }

    async fn transform(
        &self,
        entity: &Entity,
        store: &dyn PrimaryStore,
        converter: &dyn RichTextConverter,
    ) -> Result<Vec<SearchDocument>> {
        let sequence = match entity {
            Entity::Sequence(s) => s,
            other => bail!("sequence transformer got a {}", other.kind()),
        };
        if !self.eligible(entity) {
            return Ok(Vec::new());
        }

        let mut doc = SearchDocument::new(&sequence.id, 0, sequence.created_at * 1000);
        doc.title = Some(sequence.title.clone());
        doc.body = truncate_chars(
            &convert_or_empty(converter, &sequence.body_html, &sequence.id),
            self.budgets.sequence_chars,
        );
        doc.author_id = sequence.author_id.clone();

        let (author_name, author_slug) = author_fields(store, sequence.author_id.as_deref()).await;
        doc.author_display_name = author_name;
        doc.author_slug = author_slug;

        Ok(vec![doc])
    }
}

struct TagTransformer {
    budgets: TruncationConfig,
}

#[async_trait]
impl DocumentTransformer for TagTransformer {
    fn kind(&self) -> EntityKind {
        EntityKind::Tag
    }

    fn eligible(&self, entity: &Entity) -> bool {
        match entity {
            Entity::Tag(t) => !t.deleted && !t.admin_only,
            _ => false,
        }
    }

    async fn transform(
        &self,
        entity: &Entity,
        _store: &dyn PrimaryStore,
        converter: &dyn RichTextConverter,
    ) -> Result<Vec<SearchDocument>> {
        let tag = match entity {
            Entity::Tag(t) => t,
            other => bail!("tag transformer got a {}", other.kind()),
        };
        if !self.eligible(entity) {
            return Ok(Vec::new());
        }

        let mut doc = SearchDocument::new(&tag.id, 0, tag.created_at * 1000);
        doc.title = Some(tag.name.clone());
        doc.slug = Some(tag.slug.clone());
        doc.body = truncate_chars(
            &convert_or_empty(converter, &tag.description_html, &tag.id),
            self.budgets.tag_description_chars,
        );
        doc.post_count = Some(tag.post_count);
        Ok(vec![doc])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::HtmlConverter;
    use crate::models::{Comment, Post, User};

    struct StubStore {
        users: Vec<User>,
        posts: Vec<Post>,
    }

    #[async_trait]
    impl PrimaryStore for StubStore {
        async fn count(&self, _kind: EntityKind) -> Result<i64> {
            Ok(0)
        }

        async fn find_page(
            &self,
            _kind: EntityKind,
            _batch_size: usize,
            _offset: i64,
        ) -> Result<Vec<Entity>> {
            Ok(Vec::new())
        }

        async fn find_one(&self, kind: EntityKind, id: &str) -> Result<Option<Entity>> {
            match kind {
                EntityKind::User => Ok(self
                    .users
                    .iter()
                    .find(|u| u.id == id)
                    .cloned()
                    .map(Entity::User)),
                EntityKind::Post => Ok(self
                    .posts
                    .iter()
                    .find(|p| p.id == id)
                    .cloned()
                    .map(Entity::Post)),
                _ => Ok(None),
            }
        }
    }

    struct FailingConverter;

    impl RichTextConverter for FailingConverter {
        fn to_text(&self, _html: &str) -> Result<String> {
            anyhow::bail!("boom")
        }
    }

    fn alice() -> User {
        User {
            id: "u1".into(),
            username: "alice".into(),
            display_name: "Alice".into(),
            slug: "alice".into(),
            bio_html: String::new(),
            karma: 100,
            deleted: false,
            no_search_index: false,
            created_at: 1_700_000_000,
        }
    }

    fn post(body_html: &str) -> Post {
        Post {
            id: "p1".into(),
            title: "Title".into(),
            slug: "title".into(),
            body_html: body_html.into(),
            author_id: Some("u1".into()),
            base_score: 10,
            status: 2,
            draft: false,
            rejected: false,
            author_is_unreviewed: false,
            logged_in_only: false,
            posted_at: 1_700_000_000,
        }
    }

    fn store() -> StubStore {
        StubStore {
            users: vec![alice()],
            posts: vec![post("<p>parent</p>")],
        }
    }

    #[tokio::test]
    async fn post_shards_per_paragraph() {
        let t = transformer_for(EntityKind::Post, &TruncationConfig::default());
        let entity = Entity::Post(post("<p>One.</p><p>Two.</p><p>Three.</p>"));
        let docs = t.transform(&entity, &store(), &HtmlConverter).await.unwrap();

        assert_eq!(docs.len(), 3);
        for (i, doc) in docs.iter().enumerate() {
            assert_eq!(doc.ordinal, i as i64);
            assert_eq!(doc.id, format!("p1_{}", i));
            assert_eq!(doc.entity_id, "p1");
            assert_eq!(doc.title.as_deref(), Some("Title"));
            assert_eq!(doc.author_display_name.as_deref(), Some("Alice"));
        }
        assert_eq!(docs[0].body, "One.");
        assert_eq!(docs[2].body, "Three.");
    }

    #[tokio::test]
    async fn empty_post_body_still_indexes_one_shard() {
        let t = transformer_for(EntityKind::Post, &TruncationConfig::default());
        let entity = Entity::Post(post(""));
        let docs = t.transform(&entity, &store(), &HtmlConverter).await.unwrap();

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].ordinal, 0);
        assert_eq!(docs[0].body, "");
        assert_eq!(docs[0].title.as_deref(), Some("Title"));
    }

    #[tokio::test]
    async fn ineligible_post_transforms_to_nothing() {
        let t = transformer_for(EntityKind::Post, &TruncationConfig::default());
        let mut p = post("<p>hi</p>");
        p.draft = true;
        let docs = t
            .transform(&Entity::Post(p), &store(), &HtmlConverter)
            .await
            .unwrap();
        assert!(docs.is_empty());

        let mut p = post("<p>hi</p>");
        p.rejected = true;
        assert!(!t.eligible(&Entity::Post(p)));
    }

    #[tokio::test]
    async fn paragraph_budget_truncates() {
        let budgets = TruncationConfig {
            post_paragraph_chars: 5,
            ..TruncationConfig::default()
        };
        let t = transformer_for(EntityKind::Post, &budgets);
        let entity = Entity::Post(post("<p>abcdefghij</p>"));
        let docs = t.transform(&entity, &store(), &HtmlConverter).await.unwrap();
        assert_eq!(docs[0].body, "abcde");
    }

    #[tokio::test]
    async fn comment_denormalizes_author_and_post() {
        let t = transformer_for(EntityKind::Comment, &TruncationConfig::default());
        let comment = Comment {
            id: "c1".into(),
            post_id: Some("p1".into()),
            author_id: Some("u1".into()),
            body_html: "<p>hello</p>".into(),
            base_score: 5,
            deleted: false,
            rejected: false,
            author_is_unreviewed: false,
            posted_at: 1_700_000_000,
        };
        let docs = t
            .transform(&Entity::Comment(comment), &store(), &HtmlConverter)
            .await
            .unwrap();

        assert_eq!(docs.len(), 1);
        let doc = &docs[0];
        assert_eq!(doc.id, "c1_0");
        assert_eq!(doc.body, "hello");
        assert_eq!(doc.base_score, Some(5));
        assert_eq!(doc.author_display_name.as_deref(), Some("Alice"));
        assert_eq!(doc.post_title.as_deref(), Some("Title"));
        assert_eq!(doc.public_date_ms, 1_700_000_000_000);
    }

    #[tokio::test]
    async fn missing_references_are_omitted_not_fatal() {
        let t = transformer_for(EntityKind::Comment, &TruncationConfig::default());
        let comment = Comment {
            id: "c2".into(),
            post_id: Some("gone".into()),
            author_id: Some("nobody".into()),
            body_html: "<p>orphan</p>".into(),
            base_score: 0,
            deleted: false,
            rejected: false,
            author_is_unreviewed: false,
            posted_at: 1_700_000_000,
        };
        let docs = t
            .transform(&Entity::Comment(comment), &store(), &HtmlConverter)
            .await
            .unwrap();

        let doc = &docs[0];
        assert!(doc.author_display_name.is_none());
        assert!(doc.post_title.is_none());
        assert_eq!(doc.post_id.as_deref(), Some("gone"));
    }

    #[tokio::test]
    async fn conversion_failure_degrades_to_empty_body() {
        let t = transformer_for(EntityKind::Post, &TruncationConfig::default());
        let entity = Entity::Post(post("<p>whatever</p>"));
        let docs = t
            .transform(&entity, &store(), &FailingConverter)
            .await
            .unwrap();

        // Conversion failed, so the body is empty but the post remains
        // findable by title.
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].body, "");
        assert_eq!(docs[0].title.as_deref(), Some("Title"));
    }

    #[tokio::test]
    async fn deleted_user_is_ineligible() {
        let t = transformer_for(EntityKind::User, &TruncationConfig::default());
        let mut u = alice();
        u.deleted = true;
        let docs = t
            .transform(&Entity::User(u), &store(), &HtmlConverter)
            .await
            .unwrap();
        assert!(docs.is_empty());

        let mut u = alice();
        u.no_search_index = true;
        assert!(!t.eligible(&Entity::User(u)));
    }
}
