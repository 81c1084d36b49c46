//! Tag procedures
//!
//! - GET /api/tag.getPopularTags

use axum::{extract::State, routing::get, Json, Router};

use crate::api::middleware::{ApiError, AppState};

pub fn router() -> Router<AppState> {
    Router::new().route("/tag.getPopularTags", get(get_popular_tags))
}

/// Top tag names by number of articles
async fn get_popular_tags(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let tags = state.tag_service.popular_tags().await?;
    Ok(Json(tags))
}
