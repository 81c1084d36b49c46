//! Comment model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A comment attached to one article, written by one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    /// Unique identifier
    pub id: i64,
    pub body: String,
    pub article_id: i64,
    pub author_id: i64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(body: String, article_id: i64, author_id: i64) -> Self {
        Self {
            id: 0,
            body,
            article_id,
            author_id,
            created_at: Utc::now(),
        }
    }
}

/// Author summary shown next to a comment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentAuthor {
    pub id: i64,
    pub username: String,
    pub image: Option<String>,
}

/// Comment joined with its author, as listed under an article
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentWithAuthor {
    pub id: i64,
    pub body: String,
    pub article_id: i64,
    pub created_at: DateTime<Utc>,
    pub author: CommentAuthor,
}
