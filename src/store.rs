//! Primary datastore interface.
//!
//! The forum's database owns the source entities; this subsystem only
//! reads them. [`PrimaryStore`] is the seam the synchronizers and the
//! transformer consume, and [`SqliteStore`] is the concrete implementation
//! paging the forum tables.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::config::Config;
use crate::models::{Comment, Entity, EntityKind, Post, Sequence, Tag, User};

/// Read-only access to the source-of-truth collections.
#[async_trait]
pub trait PrimaryStore: Send + Sync {
    /// Number of entities matching the kind's candidate filter.
    async fn count(&self, kind: EntityKind) -> Result<i64>;

    /// One page of candidate entities, ordered by id so the offset cursor
    /// is stable across pages.
    async fn find_page(&self, kind: EntityKind, batch_size: usize, offset: i64)
        -> Result<Vec<Entity>>;

    /// Single entity by id, ignoring the candidate filter.
    async fn find_one(&self, kind: EntityKind, id: &str) -> Result<Option<Entity>>;

    /// Row-level ACL check: may this entity appear in the anonymous public
    /// search index at all? Distinct from the per-kind eligibility
    /// predicate, which the transformer applies.
    fn check_access(&self, entity: &Entity) -> bool {
        match entity {
            Entity::Post(p) => !p.logged_in_only,
            _ => true,
        }
    }
}

/// SQLite-backed primary store.
pub struct SqliteStore {
    pool: SqlitePool,
    /// Recency bound in days for candidate queries, if configured.
    window_days: Option<i64>,
}

impl SqliteStore {
    pub async fn connect(config: &Config) -> Result<Self> {
        let db_path = &config.db.path;

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self {
            pool,
            window_days: config.sync.window_days,
        })
    }

    /// In-memory store for tests. Single connection, so the database
    /// survives for the pool's lifetime.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self {
            pool,
            window_days: None,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Create the forum tables if they do not exist. The forum application
    /// owns this schema in production; this bootstrap exists for tests and
    /// local development.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                slug TEXT NOT NULL,
                body_html TEXT NOT NULL DEFAULT '',
                author_id TEXT,
                base_score INTEGER NOT NULL DEFAULT 0,
                status INTEGER NOT NULL DEFAULT 2,
                draft INTEGER NOT NULL DEFAULT 0,
                rejected INTEGER NOT NULL DEFAULT 0,
                author_is_unreviewed INTEGER NOT NULL DEFAULT 0,
                logged_in_only INTEGER NOT NULL DEFAULT 0,
                posted_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS comments (
                id TEXT PRIMARY KEY,
                post_id TEXT,
                author_id TEXT,
                body_html TEXT NOT NULL DEFAULT '',
                base_score INTEGER NOT NULL DEFAULT 0,
                deleted INTEGER NOT NULL DEFAULT 0,
                rejected INTEGER NOT NULL DEFAULT 0,
                author_is_unreviewed INTEGER NOT NULL DEFAULT 0,
                posted_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                display_name TEXT NOT NULL,
                slug TEXT NOT NULL,
                bio_html TEXT NOT NULL DEFAULT '',
                karma INTEGER NOT NULL DEFAULT 0,
                deleted INTEGER NOT NULL DEFAULT 0,
                no_search_index INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sequences (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                author_id TEXT,
                body_html TEXT NOT NULL DEFAULT '',
                deleted INTEGER NOT NULL DEFAULT 0,
                draft INTEGER NOT NULL DEFAULT 0,
                hidden INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tags (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                slug TEXT NOT NULL,
                description_html TEXT NOT NULL DEFAULT '',
                post_count INTEGER NOT NULL DEFAULT 0,
                deleted INTEGER NOT NULL DEFAULT 0,
                admin_only INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_comments_post_id ON comments(post_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_posted_at ON posts(posted_at DESC)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Candidate WHERE clause for a kind. Broad on purpose: it prunes the
    /// obviously-unindexable rows server-side, while the transformer's
    /// eligibility predicate remains the source of truth per entity.
    fn candidate_filter(kind: EntityKind) -> &'static str {
        match kind {
            EntityKind::Post => "status = 2 AND draft = 0",
            EntityKind::Comment => "deleted = 0",
            EntityKind::User => "deleted = 0",
            EntityKind::Sequence => "deleted = 0 AND draft = 0",
            EntityKind::Tag => "deleted = 0",
        }
    }

    fn table(kind: EntityKind) -> &'static str {
        kind.alias()
    }

    fn date_column(kind: EntityKind) -> &'static str {
        match kind {
            EntityKind::Post | EntityKind::Comment => "posted_at",
            _ => "created_at",
        }
    }

    fn window_cutoff(&self) -> Option<i64> {
        self.window_days
            .map(|days| chrono::Utc::now().timestamp() - days * 86_400)
    }
}

#[async_trait]
impl PrimaryStore for SqliteStore {
    async fn count(&self, kind: EntityKind) -> Result<i64> {
        let mut sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            Self::table(kind),
            Self::candidate_filter(kind)
        );
        let cutoff = self.window_cutoff();
        if cutoff.is_some() {
            sql.push_str(&format!(" AND {} >= ?", Self::date_column(kind)));
        }

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        if let Some(ts) = cutoff {
            query = query.bind(ts);
        }
        Ok(query.fetch_one(&self.pool).await?)
    }

    async fn find_page(
        &self,
        kind: EntityKind,
        batch_size: usize,
        offset: i64,
    ) -> Result<Vec<Entity>> {
        let mut sql = format!(
            "SELECT * FROM {} WHERE {}",
            Self::table(kind),
            Self::candidate_filter(kind)
        );
        let cutoff = self.window_cutoff();
        if cutoff.is_some() {
            sql.push_str(&format!(" AND {} >= ?", Self::date_column(kind)));
        }
        sql.push_str(" ORDER BY id LIMIT ? OFFSET ?");

        macro_rules! fetch_page {
            ($ty:ty, $variant:expr) => {{
                let mut query = sqlx::query_as::<_, $ty>(&sql);
                if let Some(ts) = cutoff {
                    query = query.bind(ts);
                }
                let rows = query
                    .bind(batch_size as i64)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await?;
                rows.into_iter().map($variant).collect()
            }};
        }

        let entities: Vec<Entity> = match kind {
            EntityKind::Post => fetch_page!(Post, Entity::Post),
            EntityKind::Comment => fetch_page!(Comment, Entity::Comment),
            EntityKind::User => fetch_page!(User, Entity::User),
            EntityKind::Sequence => fetch_page!(Sequence, Entity::Sequence),
            EntityKind::Tag => fetch_page!(Tag, Entity::Tag),
        };
        Ok(entities)
    }

    async fn find_one(&self, kind: EntityKind, id: &str) -> Result<Option<Entity>> {
        let sql = format!("SELECT * FROM {} WHERE id = ?", Self::table(kind));

        macro_rules! fetch_one {
            ($ty:ty, $variant:expr) => {{
                sqlx::query_as::<_, $ty>(&sql)
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
                    .map($variant)
            }};
        }

        let entity = match kind {
            EntityKind::Post => fetch_one!(Post, Entity::Post),
            EntityKind::Comment => fetch_one!(Comment, Entity::Comment),
            EntityKind::User => fetch_one!(User, Entity::User),
            EntityKind::Sequence => fetch_one!(Sequence, Entity::Sequence),
            EntityKind::Tag => fetch_one!(Tag, Entity::Tag),
        };
        Ok(entity)
    }
}
