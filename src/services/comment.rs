//! Comment service

use anyhow::Context;
use std::sync::Arc;
use thiserror::Error;

use crate::db::repositories::{ArticleRepository, CommentRepository};
use crate::models::{Comment, CommentWithAuthor};
use crate::services::validation::FieldError;

#[derive(Debug, Error)]
pub enum CommentServiceError {
    #[error("Validation failed")]
    ValidationError(Vec<FieldError>),

    /// Missing article, or missing / not-owned comment
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Comment service
pub struct CommentService {
    repo: Arc<dyn CommentRepository>,
    article_repo: Arc<dyn ArticleRepository>,
}

impl CommentService {
    pub fn new(repo: Arc<dyn CommentRepository>, article_repo: Arc<dyn ArticleRepository>) -> Self {
        Self { repo, article_repo }
    }

    /// Comment on `article_id` as `caller_id`
    pub async fn create(
        &self,
        article_id: i64,
        body: String,
        caller_id: i64,
    ) -> Result<Comment, CommentServiceError> {
        if body.trim().is_empty() {
            return Err(CommentServiceError::ValidationError(vec![FieldError::blank(
                "comment",
            )]));
        }

        self.article_repo
            .get_by_id(article_id)
            .await
            .context("Failed to look up article")?
            .ok_or(CommentServiceError::NotFound("Article"))?;

        let comment = self
            .repo
            .create(&Comment::new(body, article_id, caller_id))
            .await
            .context("Failed to create comment")?;
        Ok(comment)
    }

    /// Delete a comment the caller wrote
    pub async fn delete_by_id(&self, comment_id: i64, caller_id: i64) -> Result<(), CommentServiceError> {
        let deleted = self
            .repo
            .delete_scoped(comment_id, caller_id)
            .await
            .context("Failed to delete comment")?;

        if deleted {
            Ok(())
        } else {
            Err(CommentServiceError::NotFound("Comment"))
        }
    }

    pub async fn list_for_article(&self, article_id: i64) -> Result<Vec<CommentWithAuthor>, CommentServiceError> {
        Ok(self
            .repo
            .list_by_article(article_id)
            .await
            .context("Failed to list comments")?)
    }
}
