//! Tag repository
//!
//! Tags are connected to articles by name: a missing tag is created on first
//! use and an existing one is reused. The connection helpers take a
//! connection rather than a pool so the article repository can run them
//! inside its own transactions.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Tag, TagWithCount};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlConnection, MySqlPool, Row, SqliteConnection, SqlitePool};
use std::sync::Arc;

/// Tag repository trait
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Tags ranked by the number of linked articles, ties broken by name
    async fn get_popular(&self, limit: usize) -> Result<Vec<TagWithCount>>;
}

/// SQLx-based tag repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxTagRepository {
    pool: DynDatabasePool,
}

impl SqlxTagRepository {
    /// Create a new SQLx tag repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn get_popular(&self, limit: usize) -> Result<Vec<TagWithCount>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_popular_sqlite(self.pool.sqlite()?, limit).await,
            DatabaseDriver::Mysql => get_popular_mysql(self.pool.mysql()?, limit).await,
        }
    }
}

const POPULAR_TAGS_SQL: &str = r#"
    SELECT t.id, t.name, t.created_at, COUNT(atg.article_id) AS article_count
    FROM tags t
    LEFT JOIN article_tags atg ON atg.tag_id = t.id
    GROUP BY t.id, t.name, t.created_at
    ORDER BY article_count DESC, t.name ASC
    LIMIT ?
"#;

const TAG_NAMES_BY_ARTICLE_SQL: &str = r#"
    SELECT t.name
    FROM tags t
    INNER JOIN article_tags atg ON atg.tag_id = t.id
    WHERE atg.article_id = ?
    ORDER BY t.name ASC
"#;

// ============================================================================
// SQLite implementations
// ============================================================================

async fn get_popular_sqlite(pool: &SqlitePool, limit: usize) -> Result<Vec<TagWithCount>> {
    let rows = sqlx::query(POPULAR_TAGS_SQL)
        .bind(limit as i64)
        .fetch_all(pool)
        .await
        .context("Failed to get popular tags")?;

    rows.iter()
        .map(|row| {
            Ok(TagWithCount {
                tag: row_to_tag_sqlite(row)?,
                article_count: row.try_get("article_count")?,
            })
        })
        .collect()
}

/// Names of the tags linked to an article, alphabetical
pub(crate) async fn tag_names_sqlite(pool: &SqlitePool, article_id: i64) -> Result<Vec<String>> {
    sqlx::query_scalar(TAG_NAMES_BY_ARTICLE_SQL)
        .bind(article_id)
        .fetch_all(pool)
        .await
        .context("Failed to get article tag names")
}

/// Connect-or-create each named tag and link it to the article
pub(crate) async fn attach_tags_sqlite(
    conn: &mut SqliteConnection,
    article_id: i64,
    names: &[String],
) -> Result<()> {
    for name in names {
        sqlx::query("INSERT OR IGNORE INTO tags (name, created_at) VALUES (?, ?)")
            .bind(name)
            .bind(Utc::now())
            .execute(&mut *conn)
            .await
            .with_context(|| format!("Failed to create tag '{}'", name))?;

        let tag_id: i64 = sqlx::query_scalar("SELECT id FROM tags WHERE name = ?")
            .bind(name)
            .fetch_one(&mut *conn)
            .await
            .with_context(|| format!("Failed to look up tag '{}'", name))?;

        sqlx::query("INSERT OR IGNORE INTO article_tags (article_id, tag_id) VALUES (?, ?)")
            .bind(article_id)
            .bind(tag_id)
            .execute(&mut *conn)
            .await
            .context("Failed to link tag to article")?;
    }
    Ok(())
}

/// Replace the article's tag set wholesale. Tags left without articles persist.
pub(crate) async fn replace_tags_sqlite(
    conn: &mut SqliteConnection,
    article_id: i64,
    names: &[String],
) -> Result<()> {
    sqlx::query("DELETE FROM article_tags WHERE article_id = ?")
        .bind(article_id)
        .execute(&mut *conn)
        .await
        .context("Failed to clear article tags")?;

    attach_tags_sqlite(conn, article_id, names).await
}

fn row_to_tag_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Tag> {
    Ok(Tag {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        created_at: row.try_get("created_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn get_popular_mysql(pool: &MySqlPool, limit: usize) -> Result<Vec<TagWithCount>> {
    let rows = sqlx::query(POPULAR_TAGS_SQL)
        .bind(limit as i64)
        .fetch_all(pool)
        .await
        .context("Failed to get popular tags")?;

    rows.iter()
        .map(|row| {
            Ok(TagWithCount {
                tag: row_to_tag_mysql(row)?,
                article_count: row.try_get("article_count")?,
            })
        })
        .collect()
}

pub(crate) async fn tag_names_mysql(pool: &MySqlPool, article_id: i64) -> Result<Vec<String>> {
    sqlx::query_scalar(TAG_NAMES_BY_ARTICLE_SQL)
        .bind(article_id)
        .fetch_all(pool)
        .await
        .context("Failed to get article tag names")
}

pub(crate) async fn attach_tags_mysql(
    conn: &mut MySqlConnection,
    article_id: i64,
    names: &[String],
) -> Result<()> {
    for name in names {
        sqlx::query("INSERT IGNORE INTO tags (name, created_at) VALUES (?, ?)")
            .bind(name)
            .bind(Utc::now())
            .execute(&mut *conn)
            .await
            .with_context(|| format!("Failed to create tag '{}'", name))?;

        let tag_id: i64 = sqlx::query_scalar("SELECT id FROM tags WHERE name = ?")
            .bind(name)
            .fetch_one(&mut *conn)
            .await
            .with_context(|| format!("Failed to look up tag '{}'", name))?;

        sqlx::query("INSERT IGNORE INTO article_tags (article_id, tag_id) VALUES (?, ?)")
            .bind(article_id)
            .bind(tag_id)
            .execute(&mut *conn)
            .await
            .context("Failed to link tag to article")?;
    }
    Ok(())
}

pub(crate) async fn replace_tags_mysql(
    conn: &mut MySqlConnection,
    article_id: i64,
    names: &[String],
) -> Result<()> {
    sqlx::query("DELETE FROM article_tags WHERE article_id = ?")
        .bind(article_id)
        .execute(&mut *conn)
        .await
        .context("Failed to clear article tags")?;

    attach_tags_mysql(conn, article_id, names).await
}

fn row_to_tag_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Tag> {
    Ok(Tag {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxTagRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        (pool.clone(), SqlxTagRepository::new(pool))
    }

    async fn create_test_user(pool: &SqlitePool) -> i64 {
        sqlx::query("INSERT INTO users (email, username, password_hash) VALUES ('t@example.com', 'tester', 'hash')")
            .execute(pool)
            .await
            .expect("Failed to create test user")
            .last_insert_rowid()
    }

    async fn create_test_article(pool: &SqlitePool, author_id: i64, slug: &str) -> i64 {
        sqlx::query(
            "INSERT INTO articles (slug, title, description, body, author_id) VALUES (?, 'T', 'D', 'B', ?)",
        )
        .bind(slug)
        .bind(author_id)
        .execute(pool)
        .await
        .expect("Failed to create test article")
        .last_insert_rowid()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_attach_creates_then_reuses_tags() {
        let (pool, _repo) = setup_test_repo().await;
        let sqlite = pool.sqlite().unwrap();
        let author = create_test_user(sqlite).await;
        let first = create_test_article(sqlite, author, "first-000001").await;
        let second = create_test_article(sqlite, author, "second-000002").await;

        let mut conn = sqlite.acquire().await.unwrap();
        attach_tags_sqlite(&mut conn, first, &names(&["rust", "web"])).await.unwrap();
        attach_tags_sqlite(&mut conn, second, &names(&["rust"])).await.unwrap();
        drop(conn);

        let tag_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tags")
            .fetch_one(sqlite)
            .await
            .unwrap();
        assert_eq!(tag_count, 2);

        let second_tags = tag_names_sqlite(sqlite, second).await.unwrap();
        assert_eq!(second_tags, vec!["rust"]);
    }

    #[tokio::test]
    async fn test_tag_names_are_alphabetical() {
        let (pool, _repo) = setup_test_repo().await;
        let sqlite = pool.sqlite().unwrap();
        let author = create_test_user(sqlite).await;
        let article = create_test_article(sqlite, author, "a-000001").await;

        let mut conn = sqlite.acquire().await.unwrap();
        attach_tags_sqlite(&mut conn, article, &names(&["zeta", "alpha", "mu"])).await.unwrap();
        drop(conn);

        let tags = tag_names_sqlite(sqlite, article).await.unwrap();
        assert_eq!(tags, vec!["alpha", "mu", "zeta"]);
    }

    #[tokio::test]
    async fn test_replace_tags_keeps_orphans() {
        let (pool, _repo) = setup_test_repo().await;
        let sqlite = pool.sqlite().unwrap();
        let author = create_test_user(sqlite).await;
        let article = create_test_article(sqlite, author, "a-000001").await;

        let mut conn = sqlite.acquire().await.unwrap();
        attach_tags_sqlite(&mut conn, article, &names(&["a", "b"])).await.unwrap();
        replace_tags_sqlite(&mut conn, article, &names(&["b", "c"])).await.unwrap();
        drop(conn);

        let tags = tag_names_sqlite(sqlite, article).await.unwrap();
        assert_eq!(tags, vec!["b", "c"]);

        // "a" is no longer linked but still exists
        let orphan: Option<i64> = sqlx::query_scalar("SELECT id FROM tags WHERE name = 'a'")
            .fetch_optional(sqlite)
            .await
            .unwrap();
        assert!(orphan.is_some());
    }

    #[tokio::test]
    async fn test_get_popular_orders_by_usage_then_name() {
        let (pool, repo) = setup_test_repo().await;
        let sqlite = pool.sqlite().unwrap();
        let author = create_test_user(sqlite).await;
        let a1 = create_test_article(sqlite, author, "a-000001").await;
        let a2 = create_test_article(sqlite, author, "a-000002").await;
        let a3 = create_test_article(sqlite, author, "a-000003").await;

        let mut conn = sqlite.acquire().await.unwrap();
        attach_tags_sqlite(&mut conn, a1, &names(&["rust", "go", "zig"])).await.unwrap();
        attach_tags_sqlite(&mut conn, a2, &names(&["rust", "go"])).await.unwrap();
        attach_tags_sqlite(&mut conn, a3, &names(&["rust", "c"])).await.unwrap();
        // Orphan ranks last
        replace_tags_sqlite(&mut conn, a1, &names(&["rust", "go"])).await.unwrap();
        drop(conn);

        let popular = repo.get_popular(10).await.unwrap();
        let ranked: Vec<(&str, i64)> = popular
            .iter()
            .map(|t| (t.tag.name.as_str(), t.article_count))
            .collect();
        assert_eq!(ranked, vec![("rust", 3), ("go", 2), ("c", 1), ("zig", 0)]);
    }

    #[tokio::test]
    async fn test_get_popular_respects_limit() {
        let (pool, repo) = setup_test_repo().await;
        let sqlite = pool.sqlite().unwrap();
        let author = create_test_user(sqlite).await;
        let article = create_test_article(sqlite, author, "a-000001").await;

        let many: Vec<String> = (0..15).map(|i| format!("tag{:02}", i)).collect();
        let mut conn = sqlite.acquire().await.unwrap();
        attach_tags_sqlite(&mut conn, article, &many).await.unwrap();
        drop(conn);

        let popular = repo.get_popular(10).await.unwrap();
        assert_eq!(popular.len(), 10);
        assert_eq!(popular[0].tag.name, "tag00");
    }
}
