//! User service
//!
//! Registration, login, profile reads and updates, and following.
//!
//! Login failures are deliberately distinguishable: an unknown email and a
//! wrong password produce different errors.

use anyhow::Context;
use std::sync::Arc;
use thiserror::Error;

use crate::db::repositories::{Relation, RelationRepository, UserRepository};
use crate::models::{CurrentUser, Profile, User, UserPatch};
use crate::services::password::{hash_password, verify_password};
use crate::services::token::TokenService;
use crate::services::validation::{non_empty, require, require_email, FieldError};

/// Error type for user service operations
#[derive(Debug, Error)]
pub enum UserServiceError {
    /// One or more input fields are invalid
    #[error("Validation failed")]
    ValidationError(Vec<FieldError>),

    #[error("user with this email does not exist")]
    UnknownEmail,

    #[error("password is not correct")]
    WrongPassword,

    /// Email or username already taken
    #[error("{}", .0.message)]
    Conflict(FieldError),

    #[error("User not found")]
    NotFound,

    #[error("you cannot follow yourself")]
    SelfFollow,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Input for user registration
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub username: String,
}

impl RegisterInput {
    pub fn new(email: impl Into<String>, password: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            username: username.into(),
        }
    }
}

/// Input for login
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Partial account update. Empty strings count as "not supplied".
#[derive(Debug, Clone, Default)]
pub struct UpdateUserInput {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub bio: Option<String>,
    pub image: Option<String>,
}

/// Result of a successful register or login
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub access_token: String,
}

pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    relation_repo: Arc<dyn RelationRepository>,
    tokens: Arc<TokenService>,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        relation_repo: Arc<dyn RelationRepository>,
        tokens: Arc<TokenService>,
    ) -> Self {
        Self {
            user_repo,
            relation_repo,
            tokens,
        }
    }

    /// Register a new account and sign it in.
    ///
    /// # Errors
    ///
    /// - `ValidationError` for blank fields or a malformed email
    /// - `Conflict` if the email or username is taken
    pub async fn register(&self, input: RegisterInput) -> Result<AuthenticatedUser, UserServiceError> {
        let mut errors = Vec::new();
        require_email(&mut errors, &input.email);
        require(&mut errors, "password", &input.password);
        require(&mut errors, "username", &input.username);
        if !errors.is_empty() {
            return Err(UserServiceError::ValidationError(errors));
        }

        self.ensure_email_free(&input.email, None).await?;
        self.ensure_username_free(&input.username, None).await?;

        let password_hash = hash_password(&input.password)?;
        let user = User::new(input.email, input.username, password_hash);

        let user = match self.user_repo.create(&user).await {
            Ok(created) => created,
            // Lost a race with a concurrent registration
            Err(e) if crate::db::is_unique_violation(&e) => {
                self.ensure_email_free(&user.email, None).await?;
                self.ensure_username_free(&user.username, None).await?;
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!("Registered user {} ({})", user.username, user.id);
        self.sign_in(user.id)
    }

    pub async fn login(&self, input: LoginInput) -> Result<AuthenticatedUser, UserServiceError> {
        let mut errors = Vec::new();
        require(&mut errors, "email", &input.email);
        require(&mut errors, "password", &input.password);
        if !errors.is_empty() {
            return Err(UserServiceError::ValidationError(errors));
        }

        let user = self
            .user_repo
            .get_by_email(&input.email)
            .await
            .context("Failed to look up user by email")?
            .ok_or(UserServiceError::UnknownEmail)?;

        if !verify_password(&input.password, &user.password_hash)? {
            tracing::debug!("Wrong password for user {}", user.id);
            return Err(UserServiceError::WrongPassword);
        }

        self.sign_in(user.id)
    }

    /// Resolve a bearer token to an existing user id
    pub async fn resolve_token(&self, token: &str) -> Result<Option<i64>, UserServiceError> {
        let Some(user_id) = self.tokens.verify(token) else {
            return Ok(None);
        };

        let exists = self
            .user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to look up token subject")?
            .is_some();
        if !exists {
            tracing::debug!("Token subject {} no longer exists", user_id);
        }
        Ok(exists.then_some(user_id))
    }

    pub async fn get_current_user(&self, caller_id: i64) -> Result<CurrentUser, UserServiceError> {
        let user = self
            .user_repo
            .get_by_id(caller_id)
            .await
            .context("Failed to get current user")?
            .ok_or(UserServiceError::NotFound)?;
        Ok(user.into())
    }

    /// Public profile, with `is_following` relative to `viewer_id`
    pub async fn get_profile_by_username(
        &self,
        username: &str,
        viewer_id: Option<i64>,
    ) -> Result<Profile, UserServiceError> {
        let user = self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to get user by username")?
            .ok_or(UserServiceError::NotFound)?;

        let is_following = match viewer_id {
            Some(viewer) => self
                .relation_repo
                .exists(Relation::Follow, user.id, viewer)
                .await
                .context("Failed to check follow state")?,
            None => false,
        };

        Ok(Profile {
            id: user.id,
            username: user.username,
            bio: user.bio,
            image: user.image,
            is_following,
        })
    }

    /// Apply a partial update to the caller's own account
    pub async fn update(
        &self,
        caller_id: i64,
        input: UpdateUserInput,
    ) -> Result<CurrentUser, UserServiceError> {
        let email = non_empty(input.email);
        let username = non_empty(input.username);
        let password = non_empty(input.password);

        let mut errors = Vec::new();
        if let Some(email) = &email {
            require_email(&mut errors, email);
        }
        if let Some(username) = &username {
            require(&mut errors, "username", username);
        }
        if !errors.is_empty() {
            return Err(UserServiceError::ValidationError(errors));
        }

        if let Some(email) = &email {
            self.ensure_email_free(email, Some(caller_id)).await?;
        }
        if let Some(username) = &username {
            self.ensure_username_free(username, Some(caller_id)).await?;
        }

        let password_hash = password.as_deref().map(hash_password).transpose()?;
        let patch = UserPatch {
            email,
            username,
            password_hash,
            bio: non_empty(input.bio),
            image: non_empty(input.image),
        };

        if patch.is_empty() {
            return self.get_current_user(caller_id).await;
        }

        let user = match self.user_repo.update(caller_id, &patch).await {
            Ok(user) => user.ok_or(UserServiceError::NotFound)?,
            Err(e) if crate::db::is_unique_violation(&e) => {
                if let Some(email) = &patch.email {
                    self.ensure_email_free(email, Some(caller_id)).await?;
                }
                if let Some(username) = &patch.username {
                    self.ensure_username_free(username, Some(caller_id)).await?;
                }
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        Ok(user.into())
    }

    /// Follow or unfollow `target_user_id`. Returns the new following state.
    pub async fn change_following_status(
        &self,
        target_user_id: i64,
        caller_id: i64,
    ) -> Result<bool, UserServiceError> {
        if target_user_id == caller_id {
            return Err(UserServiceError::SelfFollow);
        }

        self.relation_repo
            .toggle(Relation::Follow, target_user_id, caller_id)
            .await
            .context("Failed to toggle follow")?
            .ok_or(UserServiceError::NotFound)
    }

    fn sign_in(&self, user_id: i64) -> Result<AuthenticatedUser, UserServiceError> {
        Ok(AuthenticatedUser {
            id: user_id,
            access_token: self.tokens.issue(user_id)?,
        })
    }

    async fn ensure_email_free(&self, email: &str, owner: Option<i64>) -> Result<(), UserServiceError> {
        let existing = self
            .user_repo
            .get_by_email(email)
            .await
            .context("Failed to check email")?;
        match existing {
            Some(user) if Some(user.id) != owner => Err(UserServiceError::Conflict(FieldError::new(
                "email",
                "user with this email already exists",
            ))),
            _ => Ok(()),
        }
    }

    async fn ensure_username_free(&self, username: &str, owner: Option<i64>) -> Result<(), UserServiceError> {
        let existing = self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to check username")?;
        match existing {
            Some(user) if Some(user.id) != owner => Err(UserServiceError::Conflict(FieldError::new(
                "username",
                "user with this username already exists",
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxRelationRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations, DatabasePool, DynDatabasePool};
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::Mutex;

    /// Store where a rival account lands between the service's availability
    /// check and its own write
    struct RacedUserRepository {
        inner: Arc<dyn UserRepository>,
        rival: Mutex<Option<User>>,
    }

    impl RacedUserRepository {
        fn arm(&self, email: &str, username: &str) {
            *self.rival.lock().unwrap() =
                Some(User::new(email.to_string(), username.to_string(), "hash".to_string()));
        }

        async fn let_rival_in(&self) {
            let rival = self.rival.lock().unwrap().take();
            if let Some(rival) = rival {
                self.inner.create(&rival).await.expect("Failed to insert rival");
            }
        }
    }

    #[async_trait]
    impl UserRepository for RacedUserRepository {
        async fn create(&self, user: &User) -> anyhow::Result<User> {
            self.let_rival_in().await;
            self.inner.create(user).await
        }

        async fn get_by_id(&self, id: i64) -> anyhow::Result<Option<User>> {
            self.inner.get_by_id(id).await
        }

        async fn get_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
            self.inner.get_by_email(email).await
        }

        async fn get_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
            self.inner.get_by_username(username).await
        }

        async fn update(&self, id: i64, patch: &UserPatch) -> anyhow::Result<Option<User>> {
            self.let_rival_in().await;
            self.inner.update(id, patch).await
        }
    }

    async fn setup_raced_service() -> (Arc<RacedUserRepository>, UserService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let repo = Arc::new(RacedUserRepository {
            inner: SqlxUserRepository::boxed(pool.clone()),
            rival: Mutex::new(None),
        });
        let service = UserService::new(
            repo.clone(),
            SqlxRelationRepository::boxed(pool),
            Arc::new(TokenService::new(b"test-secret", Duration::hours(1))),
        );
        (repo, service)
    }

    async fn setup_test_service() -> (DynDatabasePool, UserService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let service = UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxRelationRepository::boxed(pool.clone()),
            Arc::new(TokenService::new(b"test-secret", Duration::hours(1))),
        );
        (pool, service)
    }

    async fn register(service: &UserService, username: &str) -> i64 {
        service
            .register(RegisterInput::new(
                format!("{}@example.com", username),
                "password123",
                username,
            ))
            .await
            .expect("Failed to register")
            .id
    }

    // ========================================================================
    // Registration and login
    // ========================================================================

    #[tokio::test]
    async fn test_register_returns_token_for_new_user() {
        let (_pool, service) = setup_test_service().await;

        let auth = service
            .register(RegisterInput::new("jake@jake.jake", "jakejake", "jake"))
            .await
            .expect("Failed to register");

        assert!(auth.id > 0);
        assert_eq!(service.resolve_token(&auth.access_token).await.unwrap(), Some(auth.id));
    }

    #[tokio::test]
    async fn test_register_validation_errors() {
        let (_pool, service) = setup_test_service().await;

        let err = service
            .register(RegisterInput::new("not-an-email", "", " "))
            .await
            .expect_err("Should fail validation");

        match err {
            UserServiceError::ValidationError(errors) => {
                let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
                assert_eq!(
                    messages,
                    vec!["email is invalid", "password can't be blank", "username can't be blank"]
                );
            }
            other => panic!("Expected ValidationError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_register_duplicate_email_conflicts_and_keeps_original() {
        let (pool, service) = setup_test_service().await;
        let first = service
            .register(RegisterInput::new("jake@jake.jake", "first-password", "jake"))
            .await
            .unwrap();

        let err = service
            .register(RegisterInput::new("jake@jake.jake", "second-password", "other"))
            .await
            .expect_err("Duplicate email should conflict");
        match err {
            UserServiceError::Conflict(field) => {
                assert_eq!(field.field, "email");
                assert_eq!(field.message, "user with this email already exists");
            }
            other => panic!("Expected Conflict, got {:?}", other),
        }

        let repo = SqlxUserRepository::new(pool);
        let stored = repo.get_by_id(first.id).await.unwrap().unwrap();
        assert!(verify_password("first-password", &stored.password_hash).unwrap());
    }

    #[tokio::test]
    async fn test_register_duplicate_username_conflicts() {
        let (_pool, service) = setup_test_service().await;
        register(&service, "jake").await;

        let err = service
            .register(RegisterInput::new("other@example.com", "password", "jake"))
            .await
            .expect_err("Duplicate username should conflict");
        assert!(matches!(err, UserServiceError::Conflict(ref f) if f.field == "username"));
    }

    #[tokio::test]
    async fn test_register_losing_email_race_conflicts_on_email() {
        let (repo, service) = setup_raced_service().await;
        repo.arm("jake@jake.jake", "rival");

        let err = service
            .register(RegisterInput::new("jake@jake.jake", "jakejake", "jake"))
            .await
            .expect_err("Rival took the email first");
        match err {
            UserServiceError::Conflict(field) => {
                assert_eq!(field.field, "email");
                assert_eq!(field.message, "user with this email already exists");
            }
            other => panic!("Expected Conflict, got {:?}", other),
        }
        assert!(repo.get_by_username("jake").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_register_losing_username_race_conflicts_on_username() {
        let (repo, service) = setup_raced_service().await;
        repo.arm("rival@example.com", "jake");

        let err = service
            .register(RegisterInput::new("jake@jake.jake", "jakejake", "jake"))
            .await
            .expect_err("Rival took the username first");
        assert!(matches!(err, UserServiceError::Conflict(ref f) if f.field == "username"));
    }

    #[tokio::test]
    async fn test_login_token_resolves_to_same_user() {
        let (_pool, service) = setup_test_service().await;
        let id = register(&service, "jake").await;

        let auth = service
            .login(LoginInput::new("jake@example.com", "password123"))
            .await
            .expect("Failed to log in");
        let caller = service.resolve_token(&auth.access_token).await.unwrap();
        assert_eq!(caller, Some(id));

        let me = service.get_current_user(id).await.unwrap();
        assert_eq!(me.username, "jake");
        assert_eq!(me.email, "jake@example.com");
    }

    #[tokio::test]
    async fn test_login_failures_are_distinguishable() {
        let (_pool, service) = setup_test_service().await;
        register(&service, "jake").await;

        let unknown = service
            .login(LoginInput::new("nobody@example.com", "password123"))
            .await
            .expect_err("Unknown email should fail");
        assert!(matches!(unknown, UserServiceError::UnknownEmail));

        let wrong = service
            .login(LoginInput::new("jake@example.com", "not-it"))
            .await
            .expect_err("Wrong password should fail");
        assert!(matches!(wrong, UserServiceError::WrongPassword));
        assert_eq!(wrong.to_string(), "password is not correct");
    }

    #[tokio::test]
    async fn test_resolve_token_for_deleted_user() {
        let (pool, service) = setup_test_service().await;
        let id = register(&service, "jake").await;
        let auth = service
            .login(LoginInput::new("jake@example.com", "password123"))
            .await
            .unwrap();

        pool.execute(&format!("DELETE FROM users WHERE id = {}", id)).await.unwrap();

        assert_eq!(service.resolve_token(&auth.access_token).await.unwrap(), None);
        assert_eq!(service.resolve_token("garbage").await.unwrap(), None);
    }

    // ========================================================================
    // Update
    // ========================================================================

    #[tokio::test]
    async fn test_update_strips_empty_strings() {
        let (_pool, service) = setup_test_service().await;
        let id = register(&service, "jake").await;

        let updated = service
            .update(
                id,
                UpdateUserInput {
                    email: Some(String::new()),
                    username: Some(String::new()),
                    password: Some(String::new()),
                    bio: Some("I like to skateboard".to_string()),
                    image: Some(String::new()),
                },
            )
            .await
            .expect("Failed to update");

        assert_eq!(updated.email, "jake@example.com");
        assert_eq!(updated.username, "jake");
        assert_eq!(updated.bio.as_deref(), Some("I like to skateboard"));
        assert!(updated.image.is_none());

        // Password untouched
        service
            .login(LoginInput::new("jake@example.com", "password123"))
            .await
            .expect("Old password should still work");
    }

    #[tokio::test]
    async fn test_update_rehashes_password() {
        let (_pool, service) = setup_test_service().await;
        let id = register(&service, "jake").await;

        service
            .update(
                id,
                UpdateUserInput {
                    password: Some("new-password".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(service
            .login(LoginInput::new("jake@example.com", "new-password"))
            .await
            .is_ok());
        assert!(matches!(
            service.login(LoginInput::new("jake@example.com", "password123")).await,
            Err(UserServiceError::WrongPassword)
        ));
    }

    #[tokio::test]
    async fn test_update_conflicts_are_field_specific() {
        let (_pool, service) = setup_test_service().await;
        let jake = register(&service, "jake").await;
        register(&service, "anna").await;

        let email = service
            .update(
                jake,
                UpdateUserInput {
                    email: Some("anna@example.com".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect_err("Taken email should conflict");
        assert!(matches!(email, UserServiceError::Conflict(ref f) if f.field == "email"));

        let username = service
            .update(
                jake,
                UpdateUserInput {
                    username: Some("anna".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect_err("Taken username should conflict");
        assert!(matches!(username, UserServiceError::Conflict(ref f) if f.field == "username"));
    }

    #[tokio::test]
    async fn test_update_losing_email_race_conflicts_on_email() {
        let (repo, service) = setup_raced_service().await;
        let jake = register(&service, "jake").await;
        repo.arm("taken@example.com", "rival");

        let err = service
            .update(
                jake,
                UpdateUserInput {
                    email: Some("taken@example.com".to_string()),
                    bio: Some("new bio".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect_err("Rival took the email first");
        assert!(matches!(err, UserServiceError::Conflict(ref f) if f.field == "email"));

        let me = service.get_current_user(jake).await.unwrap();
        assert_eq!(me.email, "jake@example.com");
        assert!(me.bio.is_none());
    }

    #[tokio::test]
    async fn test_update_to_own_email_is_allowed() {
        let (_pool, service) = setup_test_service().await;
        let jake = register(&service, "jake").await;

        let updated = service
            .update(
                jake,
                UpdateUserInput {
                    email: Some("jake@example.com".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("Re-submitting own email should succeed");
        assert_eq!(updated.email, "jake@example.com");
    }

    #[tokio::test]
    async fn test_update_rejects_invalid_email() {
        let (_pool, service) = setup_test_service().await;
        let jake = register(&service, "jake").await;

        let err = service
            .update(
                jake,
                UpdateUserInput {
                    email: Some("nope".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect_err("Invalid email should fail");
        assert!(matches!(err, UserServiceError::ValidationError(_)));
    }

    // ========================================================================
    // Profiles and following
    // ========================================================================

    #[tokio::test]
    async fn test_follow_toggle_and_profile_flag() {
        let (_pool, service) = setup_test_service().await;
        let jake = register(&service, "jake").await;
        let anna = register(&service, "anna").await;

        assert!(service.change_following_status(anna, jake).await.unwrap());
        let profile = service.get_profile_by_username("anna", Some(jake)).await.unwrap();
        assert!(profile.is_following);

        let anonymous = service.get_profile_by_username("anna", None).await.unwrap();
        assert!(!anonymous.is_following);

        assert!(!service.change_following_status(anna, jake).await.unwrap());
        let profile = service.get_profile_by_username("anna", Some(jake)).await.unwrap();
        assert!(!profile.is_following);
    }

    #[tokio::test]
    async fn test_follow_rejects_self_and_missing_target() {
        let (_pool, service) = setup_test_service().await;
        let jake = register(&service, "jake").await;

        assert!(matches!(
            service.change_following_status(jake, jake).await,
            Err(UserServiceError::SelfFollow)
        ));
        assert!(matches!(
            service.change_following_status(999, jake).await,
            Err(UserServiceError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_profile_not_found() {
        let (_pool, service) = setup_test_service().await;
        assert!(matches!(
            service.get_profile_by_username("ghost", None).await,
            Err(UserServiceError::NotFound)
        ));
    }
}
