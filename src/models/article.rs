//! Article model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Profile;

/// An article row. The author is fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    /// Unique identifier
    pub id: i64,
    /// URL identifier, globally unique
    pub slug: String,
    pub title: String,
    pub description: String,
    /// Article body (markdown, stored verbatim)
    pub body: String,
    /// Author user ID
    pub author_id: i64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Article {
    /// Create a new, not yet persisted article
    pub fn new(
        slug: String,
        title: String,
        description: String,
        body: String,
        author_id: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            slug,
            title,
            description,
            body,
            author_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Columns an update may change. `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticlePatch {
    pub slug: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub body: Option<String>,
}

/// Listing filter. All set conditions must hold.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleFilter {
    /// Only articles written by this user
    pub author_id: Option<i64>,
    /// Only articles favorited by this user
    pub favorited_by_user_id: Option<i64>,
    /// Only articles carrying this tag name
    pub tag: Option<String>,
    /// Only articles whose author is followed by this user (the feed)
    #[serde(skip)]
    pub followed_by_user_id: Option<i64>,
}

/// Identity of a freshly created article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedArticle {
    pub id: i64,
    pub slug: String,
}

/// An article as presented to a viewer: author profile, tags and favorite state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleView {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Tag names, alphabetical
    pub tags: Vec<String>,
    pub author: Profile,
    pub favorites_count: i64,
    /// Whether the viewer has favorited the article; false for anonymous viewers
    pub is_favorited: bool,
}
