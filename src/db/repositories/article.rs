//! Article repository
//!
//! Database operations for articles.
//!
//! - `ArticleRepository` trait defining the interface for article data access
//! - `SqlxArticleRepository` implementing the trait for SQLite and MySQL
//!
//! Mutations are scoped: update and delete match on the author as well as the
//! article, so a caller who does not own the row affects nothing.

use crate::config::DatabaseDriver;
use crate::db::repositories::tag::{
    attach_tags_mysql, attach_tags_sqlite, replace_tags_mysql, replace_tags_sqlite,
    tag_names_mysql, tag_names_sqlite,
};
use crate::db::DynDatabasePool;
use crate::models::{Article, ArticleFilter, ArticlePatch, ArticleView, Profile};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Article repository trait
#[async_trait]
pub trait ArticleRepository: Send + Sync {
    /// Insert an article and link its tags in one transaction
    async fn create(&self, article: &Article, tags: &[String]) -> Result<Article>;

    /// Get article by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Article>>;

    /// Get article by slug
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Article>>;

    /// Update the article with `slug` written by `author_id`.
    ///
    /// `tags` replaces the tag set when present. Returns the article's slug
    /// after the update, or `None` when no article matched both conditions.
    async fn update_scoped(
        &self,
        slug: &str,
        author_id: i64,
        patch: &ArticlePatch,
        tags: Option<&[String]>,
    ) -> Result<Option<String>>;

    /// Delete the article `id` written by `author_id`. Returns whether a row went away.
    async fn delete_scoped(&self, id: i64, author_id: i64) -> Result<bool>;

    /// Article as seen by `viewer_id` (anonymous when `None`)
    async fn get_view_by_slug(&self, slug: &str, viewer_id: Option<i64>)
        -> Result<Option<ArticleView>>;

    /// Articles matching every set condition of `filter`, newest first
    async fn list(&self, filter: &ArticleFilter, viewer_id: Option<i64>)
        -> Result<Vec<ArticleView>>;
}

/// SQLx-based article repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxArticleRepository {
    pool: DynDatabasePool,
}

impl SqlxArticleRepository {
    /// Create a new SQLx article repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ArticleRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ArticleRepository for SqlxArticleRepository {
    async fn create(&self, article: &Article, tags: &[String]) -> Result<Article> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_article_sqlite(self.pool.sqlite()?, article, tags).await,
            DatabaseDriver::Mysql => create_article_mysql(self.pool.mysql()?, article, tags).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Article>> {
        let sql = format!("SELECT {} FROM articles WHERE id = ?", ARTICLE_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get article by id")?;
                row.as_ref().map(row_to_article_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get article by id")?;
                row.as_ref().map(row_to_article_mysql).transpose()
            }
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Article>> {
        let sql = format!("SELECT {} FROM articles WHERE slug = ?", ARTICLE_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(slug)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get article by slug")?;
                row.as_ref().map(row_to_article_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(slug)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get article by slug")?;
                row.as_ref().map(row_to_article_mysql).transpose()
            }
        }
    }

    async fn update_scoped(
        &self,
        slug: &str,
        author_id: i64,
        patch: &ArticlePatch,
        tags: Option<&[String]>,
    ) -> Result<Option<String>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                update_article_sqlite(self.pool.sqlite()?, slug, author_id, patch, tags).await
            }
            DatabaseDriver::Mysql => {
                update_article_mysql(self.pool.mysql()?, slug, author_id, patch, tags).await
            }
        }
    }

    async fn delete_scoped(&self, id: i64, author_id: i64) -> Result<bool> {
        let sql = "DELETE FROM articles WHERE id = ? AND author_id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .bind(author_id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete article")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .bind(author_id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to delete article")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn get_view_by_slug(
        &self,
        slug: &str,
        viewer_id: Option<i64>,
    ) -> Result<Option<ArticleView>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_view_sqlite(self.pool.sqlite()?, slug, viewer_id).await,
            DatabaseDriver::Mysql => get_view_mysql(self.pool.mysql()?, slug, viewer_id).await,
        }
    }

    async fn list(
        &self,
        filter: &ArticleFilter,
        viewer_id: Option<i64>,
    ) -> Result<Vec<ArticleView>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_views_sqlite(self.pool.sqlite()?, filter, viewer_id).await,
            DatabaseDriver::Mysql => list_views_mysql(self.pool.mysql()?, filter, viewer_id).await,
        }
    }
}

const ARTICLE_COLUMNS: &str =
    "id, slug, title, description, body, author_id, created_at, updated_at";

// Viewer-relative flags are counts so both backends decode them as BIGINT.
// The two leading placeholders bind the viewer id.
const VIEW_SELECT: &str = r#"
    SELECT a.id, a.slug, a.title, a.description, a.body, a.created_at, a.updated_at,
           u.id AS author_id, u.username AS author_username,
           u.bio AS author_bio, u.image AS author_image,
           (SELECT COUNT(*) FROM favorites f WHERE f.article_id = a.id) AS favorites_count,
           (SELECT COUNT(*) FROM favorites f WHERE f.article_id = a.id AND f.user_id = ?) AS viewer_favorited,
           (SELECT COUNT(*) FROM follows fo WHERE fo.following_id = a.author_id AND fo.follower_id = ?) AS viewer_following
    FROM articles a
    INNER JOIN users u ON u.id = a.author_id
"#;

// Each condition binds its value twice: once for the NULL check, once for the match
const LIST_CONDITIONS: &str = r#"
    WHERE (? IS NULL OR a.author_id = ?)
      AND (? IS NULL OR a.id IN (SELECT fv.article_id FROM favorites fv WHERE fv.user_id = ?))
      AND (? IS NULL OR a.id IN (
            SELECT atg.article_id FROM article_tags atg
            INNER JOIN tags t ON t.id = atg.tag_id
            WHERE t.name = ?))
      AND (? IS NULL OR a.author_id IN (SELECT fl.following_id FROM follows fl WHERE fl.follower_id = ?))
    ORDER BY a.created_at DESC, a.id DESC
"#;

const UPDATE_ARTICLE_SET: &str = r#"
    UPDATE articles
    SET slug = COALESCE(?, slug),
        title = COALESCE(?, title),
        description = COALESCE(?, description),
        body = COALESCE(?, body),
        updated_at = ?
"#;

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_article_sqlite(pool: &SqlitePool, article: &Article, tags: &[String]) -> Result<Article> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let result = sqlx::query(
        r#"
        INSERT INTO articles (slug, title, description, body, author_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&article.slug)
    .bind(&article.title)
    .bind(&article.description)
    .bind(&article.body)
    .bind(article.author_id)
    .bind(article.created_at)
    .bind(article.updated_at)
    .execute(&mut *tx)
    .await
    .context("Failed to create article")?;

    let id = result.last_insert_rowid();
    attach_tags_sqlite(&mut tx, id, tags).await?;

    tx.commit().await.context("Failed to commit article")?;

    Ok(Article {
        id,
        ..article.clone()
    })
}

async fn update_article_sqlite(
    pool: &SqlitePool,
    slug: &str,
    author_id: i64,
    patch: &ArticlePatch,
    tags: Option<&[String]>,
) -> Result<Option<String>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    // Scoped UPDATE first so the transaction starts out holding the write lock
    let sql = format!("{} WHERE slug = ? AND author_id = ? RETURNING id", UPDATE_ARTICLE_SET);
    let id: Option<i64> = sqlx::query_scalar(&sql)
        .bind(patch.slug.as_deref())
        .bind(patch.title.as_deref())
        .bind(patch.description.as_deref())
        .bind(patch.body.as_deref())
        .bind(Utc::now())
        .bind(slug)
        .bind(author_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to update article")?;
    let Some(id) = id else {
        return Ok(None);
    };

    if let Some(tags) = tags {
        replace_tags_sqlite(&mut tx, id, tags).await?;
    }

    tx.commit().await.context("Failed to commit article update")?;

    Ok(Some(patch.slug.clone().unwrap_or_else(|| slug.to_string())))
}

async fn get_view_sqlite(
    pool: &SqlitePool,
    slug: &str,
    viewer_id: Option<i64>,
) -> Result<Option<ArticleView>> {
    let sql = format!("{} WHERE a.slug = ?", VIEW_SELECT);
    let row = sqlx::query(&sql)
        .bind(viewer_id)
        .bind(viewer_id)
        .bind(slug)
        .fetch_optional(pool)
        .await
        .context("Failed to get article view")?;

    match row {
        Some(row) => {
            let tags = tag_names_sqlite(pool, row.try_get("id")?).await?;
            Ok(Some(row_to_view_sqlite(&row, tags)?))
        }
        None => Ok(None),
    }
}

async fn list_views_sqlite(
    pool: &SqlitePool,
    filter: &ArticleFilter,
    viewer_id: Option<i64>,
) -> Result<Vec<ArticleView>> {
    let sql = format!("{} {}", VIEW_SELECT, LIST_CONDITIONS);
    let rows = sqlx::query(&sql)
        .bind(viewer_id)
        .bind(viewer_id)
        .bind(filter.author_id)
        .bind(filter.author_id)
        .bind(filter.favorited_by_user_id)
        .bind(filter.favorited_by_user_id)
        .bind(filter.tag.as_deref())
        .bind(filter.tag.as_deref())
        .bind(filter.followed_by_user_id)
        .bind(filter.followed_by_user_id)
        .fetch_all(pool)
        .await
        .context("Failed to list articles")?;

    let mut views = Vec::with_capacity(rows.len());
    for row in &rows {
        let tags = tag_names_sqlite(pool, row.try_get("id")?).await?;
        views.push(row_to_view_sqlite(row, tags)?);
    }
    Ok(views)
}

fn row_to_article_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Article> {
    Ok(Article {
        id: row.try_get("id")?,
        slug: row.try_get("slug")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        body: row.try_get("body")?,
        author_id: row.try_get("author_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_view_sqlite(row: &sqlx::sqlite::SqliteRow, tags: Vec<String>) -> Result<ArticleView> {
    let viewer_favorited: i64 = row.try_get("viewer_favorited")?;
    let viewer_following: i64 = row.try_get("viewer_following")?;

    Ok(ArticleView {
        id: row.try_get("id")?,
        slug: row.try_get("slug")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        body: row.try_get("body")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        tags,
        author: Profile {
            id: row.try_get("author_id")?,
            username: row.try_get("author_username")?,
            bio: row.try_get("author_bio")?,
            image: row.try_get("author_image")?,
            is_following: viewer_following != 0,
        },
        favorites_count: row.try_get("favorites_count")?,
        is_favorited: viewer_favorited != 0,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_article_mysql(pool: &MySqlPool, article: &Article, tags: &[String]) -> Result<Article> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let result = sqlx::query(
        r#"
        INSERT INTO articles (slug, title, description, body, author_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&article.slug)
    .bind(&article.title)
    .bind(&article.description)
    .bind(&article.body)
    .bind(article.author_id)
    .bind(article.created_at)
    .bind(article.updated_at)
    .execute(&mut *tx)
    .await
    .context("Failed to create article")?;

    let id = result.last_insert_id() as i64;
    attach_tags_mysql(&mut tx, id, tags).await?;

    tx.commit().await.context("Failed to commit article")?;

    Ok(Article {
        id,
        ..article.clone()
    })
}

async fn update_article_mysql(
    pool: &MySqlPool,
    slug: &str,
    author_id: i64,
    patch: &ArticlePatch,
    tags: Option<&[String]>,
) -> Result<Option<String>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let id: Option<i64> =
        sqlx::query_scalar("SELECT id FROM articles WHERE slug = ? AND author_id = ? FOR UPDATE")
            .bind(slug)
            .bind(author_id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to look up article for update")?;
    let Some(id) = id else {
        return Ok(None);
    };

    let sql = format!("{} WHERE id = ?", UPDATE_ARTICLE_SET);
    sqlx::query(&sql)
        .bind(patch.slug.as_deref())
        .bind(patch.title.as_deref())
        .bind(patch.description.as_deref())
        .bind(patch.body.as_deref())
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to update article")?;

    if let Some(tags) = tags {
        replace_tags_mysql(&mut tx, id, tags).await?;
    }

    tx.commit().await.context("Failed to commit article update")?;

    Ok(Some(patch.slug.clone().unwrap_or_else(|| slug.to_string())))
}

async fn get_view_mysql(
    pool: &MySqlPool,
    slug: &str,
    viewer_id: Option<i64>,
) -> Result<Option<ArticleView>> {
    let sql = format!("{} WHERE a.slug = ?", VIEW_SELECT);
    let row = sqlx::query(&sql)
        .bind(viewer_id)
        .bind(viewer_id)
        .bind(slug)
        .fetch_optional(pool)
        .await
        .context("Failed to get article view")?;

    match row {
        Some(row) => {
            let tags = tag_names_mysql(pool, row.try_get("id")?).await?;
            Ok(Some(row_to_view_mysql(&row, tags)?))
        }
        None => Ok(None),
    }
}

async fn list_views_mysql(
    pool: &MySqlPool,
    filter: &ArticleFilter,
    viewer_id: Option<i64>,
) -> Result<Vec<ArticleView>> {
    let sql = format!("{} {}", VIEW_SELECT, LIST_CONDITIONS);
    let rows = sqlx::query(&sql)
        .bind(viewer_id)
        .bind(viewer_id)
        .bind(filter.author_id)
        .bind(filter.author_id)
        .bind(filter.favorited_by_user_id)
        .bind(filter.favorited_by_user_id)
        .bind(filter.tag.as_deref())
        .bind(filter.tag.as_deref())
        .bind(filter.followed_by_user_id)
        .bind(filter.followed_by_user_id)
        .fetch_all(pool)
        .await
        .context("Failed to list articles")?;

    let mut views = Vec::with_capacity(rows.len());
    for row in &rows {
        let tags = tag_names_mysql(pool, row.try_get("id")?).await?;
        views.push(row_to_view_mysql(row, tags)?);
    }
    Ok(views)
}

fn row_to_article_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Article> {
    Ok(Article {
        id: row.try_get("id")?,
        slug: row.try_get("slug")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        body: row.try_get("body")?,
        author_id: row.try_get("author_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_view_mysql(row: &sqlx::mysql::MySqlRow, tags: Vec<String>) -> Result<ArticleView> {
    let viewer_favorited: i64 = row.try_get("viewer_favorited")?;
    let viewer_following: i64 = row.try_get("viewer_following")?;

    Ok(ArticleView {
        id: row.try_get("id")?,
        slug: row.try_get("slug")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        body: row.try_get("body")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        tags,
        author: Profile {
            id: row.try_get("author_id")?,
            username: row.try_get("author_username")?,
            bio: row.try_get("author_bio")?,
            image: row.try_get("author_image")?,
            is_following: viewer_following != 0,
        },
        favorites_count: row.try_get("favorites_count")?,
        is_favorited: viewer_favorited != 0,
    })
}
