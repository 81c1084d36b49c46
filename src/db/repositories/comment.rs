//! Comment repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Comment, CommentAuthor, CommentWithAuthor};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Insert a comment and return it with its assigned id
    async fn create(&self, comment: &Comment) -> Result<Comment>;

    /// Delete comment `id` written by `author_id`. Returns whether a row went away.
    async fn delete_scoped(&self, id: i64, author_id: i64) -> Result<bool>;

    /// Comments on an article with their authors, newest first
    async fn list_by_article(&self, article_id: i64) -> Result<Vec<CommentWithAuthor>>;
}

pub struct SqlxCommentRepository {
    pool: DynDatabasePool,
}

impl SqlxCommentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

const INSERT_COMMENT_SQL: &str =
    "INSERT INTO comments (body, article_id, author_id, created_at) VALUES (?, ?, ?, ?)";

const LIST_BY_ARTICLE_SQL: &str = r#"
    SELECT c.id, c.body, c.article_id, c.created_at,
           u.id AS author_id, u.username AS author_username, u.image AS author_image
    FROM comments c
    INNER JOIN users u ON u.id = c.author_id
    WHERE c.article_id = ?
    ORDER BY c.created_at DESC, c.id DESC
"#;

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(&self, comment: &Comment) -> Result<Comment> {
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(INSERT_COMMENT_SQL)
                .bind(&comment.body)
                .bind(comment.article_id)
                .bind(comment.author_id)
                .bind(comment.created_at)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create comment")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(INSERT_COMMENT_SQL)
                .bind(&comment.body)
                .bind(comment.article_id)
                .bind(comment.author_id)
                .bind(comment.created_at)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create comment")?
                .last_insert_id() as i64,
        };

        Ok(Comment {
            id,
            ..comment.clone()
        })
    }

    async fn delete_scoped(&self, id: i64, author_id: i64) -> Result<bool> {
        let sql = "DELETE FROM comments WHERE id = ? AND author_id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .bind(author_id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete comment")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .bind(author_id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to delete comment")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn list_by_article(&self, article_id: i64) -> Result<Vec<CommentWithAuthor>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_by_article_sqlite(self.pool.sqlite()?, article_id).await,
            DatabaseDriver::Mysql => list_by_article_mysql(self.pool.mysql()?, article_id).await,
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn list_by_article_sqlite(pool: &SqlitePool, article_id: i64) -> Result<Vec<CommentWithAuthor>> {
    let rows = sqlx::query(LIST_BY_ARTICLE_SQL)
        .bind(article_id)
        .fetch_all(pool)
        .await
        .context("Failed to list comments")?;

    rows.iter()
        .map(|row| {
            Ok(CommentWithAuthor {
                id: row.try_get("id")?,
                body: row.try_get("body")?,
                article_id: row.try_get("article_id")?,
                created_at: row.try_get("created_at")?,
                author: CommentAuthor {
                    id: row.try_get("author_id")?,
                    username: row.try_get("author_username")?,
                    image: row.try_get("author_image")?,
                },
            })
        })
        .collect()
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn list_by_article_mysql(pool: &MySqlPool, article_id: i64) -> Result<Vec<CommentWithAuthor>> {
    let rows = sqlx::query(LIST_BY_ARTICLE_SQL)
        .bind(article_id)
        .fetch_all(pool)
        .await
        .context("Failed to list comments")?;

    rows.iter()
        .map(|row| {
            Ok(CommentWithAuthor {
                id: row.try_get("id")?,
                body: row.try_get("body")?,
                article_id: row.try_get("article_id")?,
                created_at: row.try_get("created_at")?,
                author: CommentAuthor {
                    id: row.try_get("author_id")?,
                    username: row.try_get("author_username")?,
                    image: row.try_get("author_image")?,
                },
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxCommentRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        (pool.clone(), SqlxCommentRepository::new(pool))
    }

    async fn create_test_user(pool: &SqlitePool, username: &str) -> i64 {
        sqlx::query("INSERT INTO users (email, username, password_hash) VALUES (?, ?, 'hash')")
            .bind(format!("{}@example.com", username))
            .bind(username)
            .execute(pool)
            .await
            .expect("Failed to create test user")
            .last_insert_rowid()
    }

    async fn create_test_article(pool: &SqlitePool, author_id: i64) -> i64 {
        sqlx::query(
            "INSERT INTO articles (slug, title, description, body, author_id) VALUES ('a-000001', 'T', 'D', 'B', ?)",
        )
        .bind(author_id)
        .execute(pool)
        .await
        .expect("Failed to create test article")
        .last_insert_rowid()
    }

    #[tokio::test]
    async fn test_create_and_list_comments() {
        let (pool, repo) = setup_test_repo().await;
        let sqlite = pool.sqlite().unwrap();
        let author = create_test_user(sqlite, "jake").await;
        let article = create_test_article(sqlite, author).await;

        let first = repo
            .create(&Comment::new("First".to_string(), article, author))
            .await
            .expect("Failed to create comment");
        let second = repo
            .create(&Comment::new("Second".to_string(), article, author))
            .await
            .expect("Failed to create comment");
        assert!(first.id > 0);

        let listed = repo.list_by_article(article).await.unwrap();
        let ids: Vec<i64> = listed.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert_eq!(listed[0].author.username, "jake");
        assert_eq!(listed[0].article_id, article);
    }

    #[tokio::test]
    async fn test_list_comments_for_other_article_is_empty() {
        let (pool, repo) = setup_test_repo().await;
        let sqlite = pool.sqlite().unwrap();
        let author = create_test_user(sqlite, "jake").await;
        let article = create_test_article(sqlite, author).await;
        repo.create(&Comment::new("Hi".to_string(), article, author)).await.unwrap();

        assert!(repo.list_by_article(article + 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_comment_on_missing_article_fails() {
        let (pool, repo) = setup_test_repo().await;
        let author = create_test_user(pool.sqlite().unwrap(), "jake").await;

        let result = repo.create(&Comment::new("Hi".to_string(), 999, author)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_delete_scoped_by_author() {
        let (pool, repo) = setup_test_repo().await;
        let sqlite = pool.sqlite().unwrap();
        let author = create_test_user(sqlite, "jake").await;
        let intruder = create_test_user(sqlite, "mallory").await;
        let article = create_test_article(sqlite, author).await;
        let comment = repo
            .create(&Comment::new("Mine".to_string(), article, author))
            .await
            .unwrap();

        assert!(!repo.delete_scoped(comment.id, intruder).await.unwrap());
        assert_eq!(repo.list_by_article(article).await.unwrap().len(), 1);

        assert!(repo.delete_scoped(comment.id, author).await.unwrap());
        assert!(repo.list_by_article(article).await.unwrap().is_empty());
    }
}
