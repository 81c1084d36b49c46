//! User repository
//!
//! - `UserRepository` trait defining user data access
//! - `SqlxUserRepository` implementing it for SQLite and MySQL

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{User, UserPatch};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user and return it with its assigned id
    async fn create(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by email
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Get user by username
    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Apply a partial update. Returns `None` if the user does not exist.
    async fn update(&self, id: i64, patch: &UserPatch) -> Result<Option<User>>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_user_sqlite(self.pool.sqlite()?, user).await,
            DatabaseDriver::Mysql => create_user_mysql(self.pool.mysql()?, user).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_user_sqlite(self.pool.sqlite()?, "id", UserKey::Id(id)).await,
            DatabaseDriver::Mysql => get_user_mysql(self.pool.mysql()?, "id", UserKey::Id(id)).await,
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_user_sqlite(self.pool.sqlite()?, "email", UserKey::Text(email)).await
            }
            DatabaseDriver::Mysql => {
                get_user_mysql(self.pool.mysql()?, "email", UserKey::Text(email)).await
            }
        }
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_user_sqlite(self.pool.sqlite()?, "username", UserKey::Text(username)).await
            }
            DatabaseDriver::Mysql => {
                get_user_mysql(self.pool.mysql()?, "username", UserKey::Text(username)).await
            }
        }
    }

    async fn update(&self, id: i64, patch: &UserPatch) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_user_sqlite(self.pool.sqlite()?, id, patch).await,
            DatabaseDriver::Mysql => update_user_mysql(self.pool.mysql()?, id, patch).await,
        }
    }
}

/// Lookup value for the single-column user queries
#[derive(Clone, Copy)]
enum UserKey<'a> {
    Id(i64),
    Text(&'a str),
}

const USER_COLUMNS: &str =
    "id, email, username, password_hash, bio, image, created_at, updated_at";

const UPDATE_USER_SQL: &str = r#"
    UPDATE users
    SET email = COALESCE(?, email),
        username = COALESCE(?, username),
        password_hash = COALESCE(?, password_hash),
        bio = COALESCE(?, bio),
        image = COALESCE(?, image),
        updated_at = ?
    WHERE id = ?
"#;

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (email, username, password_hash, bio, image, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.email)
    .bind(&user.username)
    .bind(&user.password_hash)
    .bind(&user.bio)
    .bind(&user.image)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn get_user_sqlite(pool: &SqlitePool, column: &str, key: UserKey<'_>) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, column);
    let query = sqlx::query(&sql);
    let query = match key {
        UserKey::Id(id) => query.bind(id),
        UserKey::Text(value) => query.bind(value),
    };

    let row = query
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to get user by {}", column))?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn update_user_sqlite(pool: &SqlitePool, id: i64, patch: &UserPatch) -> Result<Option<User>> {
    let result = sqlx::query(UPDATE_USER_SQL)
        .bind(patch.email.as_deref())
        .bind(patch.username.as_deref())
        .bind(patch.password_hash.as_deref())
        .bind(patch.bio.as_deref())
        .bind(patch.image.as_deref())
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update user")?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    get_user_sqlite(pool, "id", UserKey::Id(id)).await
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        bio: row.try_get("bio")?,
        image: row.try_get("image")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (email, username, password_hash, bio, image, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.email)
    .bind(&user.username)
    .bind(&user.password_hash)
    .bind(&user.bio)
    .bind(&user.image)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_id() as i64,
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn get_user_mysql(pool: &MySqlPool, column: &str, key: UserKey<'_>) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, column);
    let query = sqlx::query(&sql);
    let query = match key {
        UserKey::Id(id) => query.bind(id),
        UserKey::Text(value) => query.bind(value),
    };

    let row = query
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to get user by {}", column))?;

    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn update_user_mysql(pool: &MySqlPool, id: i64, patch: &UserPatch) -> Result<Option<User>> {
    let result = sqlx::query(UPDATE_USER_SQL)
        .bind(patch.email.as_deref())
        .bind(patch.username.as_deref())
        .bind(patch.password_hash.as_deref())
        .bind(patch.bio.as_deref())
        .bind(patch.image.as_deref())
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update user")?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    get_user_mysql(pool, "id", UserKey::Id(id)).await
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        bio: row.try_get("bio")?,
        image: row.try_get("image")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxUserRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxUserRepository::new(pool)
    }

    fn test_user(username: &str) -> User {
        User::new(
            format!("{}@example.com", username),
            username.to_string(),
            "not-a-real-hash".to_string(),
        )
    }

    #[tokio::test]
    async fn test_create_user() {
        let repo = setup_test_repo().await;

        let created = repo.create(&test_user("jake")).await.expect("Failed to create user");

        assert!(created.id > 0);
        assert_eq!(created.username, "jake");
        assert_eq!(created.email, "jake@example.com");
        assert!(created.bio.is_none());
        assert!(created.image.is_none());
    }

    #[tokio::test]
    async fn test_lookups() {
        let repo = setup_test_repo().await;
        let created = repo.create(&test_user("jake")).await.expect("Failed to create user");

        let by_id = repo.get_by_id(created.id).await.expect("Failed to get user");
        let by_email = repo
            .get_by_email("jake@example.com")
            .await
            .expect("Failed to get user");
        let by_username = repo.get_by_username("jake").await.expect("Failed to get user");

        assert_eq!(by_id.map(|u| u.id), Some(created.id));
        assert_eq!(by_email.map(|u| u.id), Some(created.id));
        assert_eq!(by_username.map(|u| u.id), Some(created.id));
    }

    #[tokio::test]
    async fn test_lookups_not_found() {
        let repo = setup_test_repo().await;

        assert!(repo.get_by_id(999).await.expect("query failed").is_none());
        assert!(repo.get_by_email("nobody@example.com").await.expect("query failed").is_none());
        assert!(repo.get_by_username("nobody").await.expect("query failed").is_none());
    }

    #[tokio::test]
    async fn test_create_duplicate_email_is_unique_violation() {
        let repo = setup_test_repo().await;
        repo.create(&test_user("jake")).await.expect("Failed to create user");

        let mut clash = test_user("other");
        clash.email = "jake@example.com".to_string();
        let err = repo.create(&clash).await.expect_err("Duplicate email should fail");

        assert!(crate::db::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_partial_update_keeps_unset_columns() {
        let repo = setup_test_repo().await;
        let created = repo.create(&test_user("jake")).await.expect("Failed to create user");

        let patch = UserPatch {
            bio: Some("I work at statefarm".to_string()),
            image: Some("https://example.com/jake.png".to_string()),
            ..Default::default()
        };
        let updated = repo
            .update(created.id, &patch)
            .await
            .expect("Failed to update")
            .expect("User should exist");

        assert_eq!(updated.bio.as_deref(), Some("I work at statefarm"));
        assert_eq!(updated.image.as_deref(), Some("https://example.com/jake.png"));
        assert_eq!(updated.username, "jake");
        assert_eq!(updated.email, "jake@example.com");
        assert_eq!(updated.password_hash, created.password_hash);
    }

    #[tokio::test]
    async fn test_update_missing_user_returns_none() {
        let repo = setup_test_repo().await;

        let patch = UserPatch {
            bio: Some("ghost".to_string()),
            ..Default::default()
        };
        let result = repo.update(42, &patch).await.expect("Failed to update");

        assert!(result.is_none());
    }
}
