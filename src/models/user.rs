//! User model
//!
//! Users own articles and comments, follow other users and favorite articles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Email address (unique, used to log in)
    pub email: String,
    /// Username (unique, public)
    pub username: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Free-form biography
    pub bio: Option<String>,
    /// Avatar URL
    pub image: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new, not yet persisted user.
    ///
    /// The password must already be hashed with `services::password::hash_password`.
    pub fn new(email: String, username: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by the database
            email,
            username,
            password_hash,
            bio: None,
            image: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The caller's own account as returned by `user.getCurrentUser`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub bio: Option<String>,
    pub image: Option<String>,
}

impl From<User> for CurrentUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            bio: user.bio,
            image: user.image,
        }
    }
}

/// Public view of a user, relative to a viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: i64,
    pub username: String,
    pub bio: Option<String>,
    pub image: Option<String>,
    /// Whether the viewer follows this user; always false for anonymous viewers
    pub is_following: bool,
}

/// Partial profile update. `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub email: Option<String>,
    pub username: Option<String>,
    /// Already hashed
    pub password_hash: Option<String>,
    pub bio: Option<String>,
    pub image: Option<String>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.username.is_none()
            && self.password_hash.is_none()
            && self.bio.is_none()
            && self.image.is_none()
    }
}
