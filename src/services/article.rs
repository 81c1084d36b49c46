//! Article service
//!
//! Creation derives a slug from the title and retries with a fresh one when
//! the store reports a slug collision. Updates and deletes go through the
//! author-scoped repository calls, so a caller who does not own the article
//! sees `NotFound`.

use anyhow::Context;
use std::sync::Arc;
use thiserror::Error;

use crate::db::repositories::{ArticleRepository, Relation, RelationRepository};
use crate::models::{normalize_tag_names, Article, ArticleFilter, ArticlePatch, ArticleView, CreatedArticle};
use crate::services::slug::derive_slug;
use crate::services::validation::{non_empty, require, FieldError};

/// Attempts at finding a free slug before giving up
const SLUG_ATTEMPTS: usize = 3;

/// Error type for article service operations
#[derive(Debug, Error)]
pub enum ArticleServiceError {
    #[error("Validation failed")]
    ValidationError(Vec<FieldError>),

    /// Missing, or not written by the caller
    #[error("Article not found")]
    NotFound,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Input for creating an article
#[derive(Debug, Clone, Default)]
pub struct CreateArticleInput {
    pub title: String,
    pub description: String,
    pub body: String,
    pub tags: Vec<String>,
}

impl CreateArticleInput {
    pub fn new(title: impl Into<String>, description: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            body: body.into(),
            tags: Vec::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Input for updating an article. Empty strings count as "not supplied";
/// `tags`, when present, replaces the whole tag set.
#[derive(Debug, Clone, Default)]
pub struct UpdateArticleInput {
    pub slug: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub body: Option<String>,
    pub tags: Option<Vec<String>>,
}

pub struct ArticleService {
    article_repo: Arc<dyn ArticleRepository>,
    relation_repo: Arc<dyn RelationRepository>,
}

impl ArticleService {
    pub fn new(
        article_repo: Arc<dyn ArticleRepository>,
        relation_repo: Arc<dyn RelationRepository>,
    ) -> Self {
        Self {
            article_repo,
            relation_repo,
        }
    }

    /// Create an article written by `author_id`
    pub async fn create(
        &self,
        input: CreateArticleInput,
        author_id: i64,
    ) -> Result<CreatedArticle, ArticleServiceError> {
        let mut errors = Vec::new();
        require(&mut errors, "title", &input.title);
        require(&mut errors, "description", &input.description);
        require(&mut errors, "body", &input.body);
        if !errors.is_empty() {
            return Err(ArticleServiceError::ValidationError(errors));
        }

        let tags = normalize_tag_names(&input.tags);

        let mut attempt = 1;
        loop {
            let article = Article::new(
                derive_slug(&input.title),
                input.title.clone(),
                input.description.clone(),
                input.body.clone(),
                author_id,
            );

            match self.article_repo.create(&article, &tags).await {
                Ok(created) => {
                    tracing::info!("Article {} created by user {}", created.slug, author_id);
                    return Ok(CreatedArticle {
                        id: created.id,
                        slug: created.slug,
                    });
                }
                Err(e) if attempt < SLUG_ATTEMPTS && crate::db::is_unique_violation(&e) => {
                    tracing::warn!("Slug {} already taken, deriving another", article.slug);
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Update the article at `input.slug`. Returns the slug after the update,
    /// which changes only when the title does.
    pub async fn update(
        &self,
        input: UpdateArticleInput,
        caller_id: i64,
    ) -> Result<String, ArticleServiceError> {
        let mut patch = ArticlePatch {
            slug: None,
            title: non_empty(input.title),
            description: non_empty(input.description),
            body: non_empty(input.body),
        };

        let mut errors = Vec::new();
        for (field, value) in [
            ("title", &patch.title),
            ("description", &patch.description),
            ("body", &patch.body),
        ] {
            if let Some(value) = value {
                require(&mut errors, field, value);
            }
        }
        if !errors.is_empty() {
            return Err(ArticleServiceError::ValidationError(errors));
        }

        let tags = input.tags.map(normalize_tag_names);

        let current = self
            .article_repo
            .get_by_slug(&input.slug)
            .await
            .context("Failed to load article for update")?
            .ok_or(ArticleServiceError::NotFound)?;

        let retitled = patch
            .title
            .as_deref()
            .is_some_and(|title| title != current.title);

        let mut attempt = 1;
        loop {
            if retitled {
                patch.slug = patch.title.as_deref().map(derive_slug);
            }

            match self
                .article_repo
                .update_scoped(&input.slug, caller_id, &patch, tags.as_deref())
                .await
            {
                Ok(Some(slug)) => return Ok(slug),
                Ok(None) => return Err(ArticleServiceError::NotFound),
                Err(e) if retitled && attempt < SLUG_ATTEMPTS && crate::db::is_unique_violation(&e) => {
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Delete article `article_id` if the caller wrote it
    pub async fn delete(&self, article_id: i64, caller_id: i64) -> Result<(), ArticleServiceError> {
        let deleted = self
            .article_repo
            .delete_scoped(article_id, caller_id)
            .await
            .context("Failed to delete article")?;

        if !deleted {
            return Err(ArticleServiceError::NotFound);
        }
        tracing::info!("Article {} deleted by user {}", article_id, caller_id);
        Ok(())
    }

    pub async fn get_by_slug(
        &self,
        slug: &str,
        viewer_id: Option<i64>,
    ) -> Result<ArticleView, ArticleServiceError> {
        self.article_repo
            .get_view_by_slug(slug, viewer_id)
            .await
            .context("Failed to get article")?
            .ok_or(ArticleServiceError::NotFound)
    }

    /// Public listing. The feed condition is never taken from the filter.
    pub async fn list(
        &self,
        filter: ArticleFilter,
        viewer_id: Option<i64>,
    ) -> Result<Vec<ArticleView>, ArticleServiceError> {
        let filter = ArticleFilter {
            followed_by_user_id: None,
            tag: filter.tag.filter(|t| !t.is_empty()),
            ..filter
        };

        Ok(self
            .article_repo
            .list(&filter, viewer_id)
            .await
            .context("Failed to list articles")?)
    }

    /// Articles written by users the viewer follows
    pub async fn feed(&self, viewer_id: i64) -> Result<Vec<ArticleView>, ArticleServiceError> {
        let filter = ArticleFilter {
            followed_by_user_id: Some(viewer_id),
            ..Default::default()
        };

        Ok(self
            .article_repo
            .list(&filter, Some(viewer_id))
            .await
            .context("Failed to load feed")?)
    }

    /// Favorite or unfavorite an article. Returns the new favorited state.
    pub async fn change_favorited_status(
        &self,
        article_id: i64,
        caller_id: i64,
    ) -> Result<bool, ArticleServiceError> {
        self.relation_repo
            .toggle(Relation::Favorite, article_id, caller_id)
            .await
            .context("Failed to toggle favorite")?
            .ok_or(ArticleServiceError::NotFound)
    }
}
