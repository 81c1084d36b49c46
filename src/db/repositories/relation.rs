//! Toggle relation repository
//!
//! Favorites (user -> article) and follows (user -> user) are both binary
//! edges between an actor and a subject. Flipping an edge is a read-then-write,
//! so `toggle` runs the subject check, the edge lookup and the write in a
//! single transaction. On SQLite the delete doubles as the lookup so the
//! transaction takes the write lock up front.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, SqlitePool};
use std::sync::Arc;

/// A named many-to-many relation between an actor (always a user) and a subject
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// user favorites article
    Favorite,
    /// user follows user
    Follow,
}

impl Relation {
    fn subject_exists_sql(self) -> &'static str {
        match self {
            Relation::Favorite => "SELECT id FROM articles WHERE id = ?",
            Relation::Follow => "SELECT id FROM users WHERE id = ?",
        }
    }

    fn subject_lock_sql(self) -> &'static str {
        match self {
            Relation::Favorite => "SELECT id FROM articles WHERE id = ? FOR UPDATE",
            Relation::Follow => "SELECT id FROM users WHERE id = ? FOR UPDATE",
        }
    }

    fn edge_sql(self) -> &'static str {
        match self {
            Relation::Favorite => {
                "SELECT 1 FROM favorites WHERE article_id = ? AND user_id = ?"
            }
            Relation::Follow => {
                "SELECT 1 FROM follows WHERE following_id = ? AND follower_id = ?"
            }
        }
    }

    fn connect_sql(self) -> &'static str {
        match self {
            Relation::Favorite => {
                "INSERT INTO favorites (article_id, user_id, created_at) VALUES (?, ?, ?)"
            }
            Relation::Follow => {
                "INSERT INTO follows (following_id, follower_id, created_at) VALUES (?, ?, ?)"
            }
        }
    }

    fn disconnect_sql(self) -> &'static str {
        match self {
            Relation::Favorite => "DELETE FROM favorites WHERE article_id = ? AND user_id = ?",
            Relation::Follow => "DELETE FROM follows WHERE following_id = ? AND follower_id = ?",
        }
    }
}

/// Relation repository trait
#[async_trait]
pub trait RelationRepository: Send + Sync {
    /// Flip the edge between `actor_id` and `subject_id`.
    ///
    /// Returns the new membership state, or `None` if the subject does not exist.
    async fn toggle(&self, relation: Relation, subject_id: i64, actor_id: i64)
        -> Result<Option<bool>>;

    /// Whether `actor_id` currently holds an edge to `subject_id`
    async fn exists(&self, relation: Relation, subject_id: i64, actor_id: i64) -> Result<bool>;
}

/// SQLx-based relation repository implementation
pub struct SqlxRelationRepository {
    pool: DynDatabasePool,
}

impl SqlxRelationRepository {
    /// Create a new SQLx relation repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn RelationRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl RelationRepository for SqlxRelationRepository {
    async fn toggle(
        &self,
        relation: Relation,
        subject_id: i64,
        actor_id: i64,
    ) -> Result<Option<bool>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                toggle_sqlite(self.pool.sqlite()?, relation, subject_id, actor_id).await
            }
            DatabaseDriver::Mysql => {
                toggle_mysql(self.pool.mysql()?, relation, subject_id, actor_id).await
            }
        }
    }

    async fn exists(&self, relation: Relation, subject_id: i64, actor_id: i64) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(relation.edge_sql())
                    .bind(subject_id)
                    .bind(actor_id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to look up relation")?;
                Ok(row.is_some())
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(relation.edge_sql())
                    .bind(subject_id)
                    .bind(actor_id)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to look up relation")?;
                Ok(row.is_some())
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn toggle_sqlite(
    pool: &SqlitePool,
    relation: Relation,
    subject_id: i64,
    actor_id: i64,
) -> Result<Option<bool>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    // The first statement must write. A deferred transaction that reads first
    // holds a shared lock, and two such transactions upgrading at once fail
    // with SQLITE_BUSY instead of waiting on the busy timeout.
    let removed = sqlx::query(relation.disconnect_sql())
        .bind(subject_id)
        .bind(actor_id)
        .execute(&mut *tx)
        .await
        .context("Failed to disconnect relation")?
        .rows_affected();
    if removed > 0 {
        tx.commit().await.context("Failed to commit toggle")?;
        return Ok(Some(false));
    }

    let subject = sqlx::query(relation.subject_exists_sql())
        .bind(subject_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to look up relation subject")?;
    if subject.is_none() {
        return Ok(None);
    }

    sqlx::query(relation.connect_sql())
        .bind(subject_id)
        .bind(actor_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .context("Failed to connect relation")?;

    tx.commit().await.context("Failed to commit toggle")?;
    Ok(Some(true))
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn toggle_mysql(
    pool: &MySqlPool,
    relation: Relation,
    subject_id: i64,
    actor_id: i64,
) -> Result<Option<bool>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    // Row lock on the subject serializes concurrent toggles against it
    let subject = sqlx::query(relation.subject_lock_sql())
        .bind(subject_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to lock relation subject")?;
    if subject.is_none() {
        return Ok(None);
    }

    let present = sqlx::query(relation.edge_sql())
        .bind(subject_id)
        .bind(actor_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to look up relation")?
        .is_some();

    if present {
        sqlx::query(relation.disconnect_sql())
            .bind(subject_id)
            .bind(actor_id)
            .execute(&mut *tx)
            .await
            .context("Failed to disconnect relation")?;
    } else {
        sqlx::query(relation.connect_sql())
            .bind(subject_id)
            .bind(actor_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .context("Failed to connect relation")?;
    }

    tx.commit().await.context("Failed to commit toggle")?;
    Ok(Some(!present))
}
