//! Tag service
//!
//! Tags are only ever created through articles; the service exposes the
//! popularity ranking shown in the sidebar.

use crate::db::repositories::TagRepository;
use anyhow::Context;
use std::sync::Arc;

/// Number of tags returned by `popular_tags`
pub const POPULAR_TAG_LIMIT: usize = 10;

/// Error types for tag service operations
#[derive(Debug, thiserror::Error)]
pub enum TagServiceError {
    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct TagService {
    repo: Arc<dyn TagRepository>,
}

impl TagService {
    pub fn new(repo: Arc<dyn TagRepository>) -> Self {
        Self { repo }
    }

    /// Names of the most used tags, most used first
    pub async fn popular_tags(&self) -> Result<Vec<String>, TagServiceError> {
        let tags = self
            .repo
            .get_popular(POPULAR_TAG_LIMIT)
            .await
            .context("Failed to get popular tags")?;

        Ok(tags.into_iter().map(|t| t.tag.name).collect())
    }
}
