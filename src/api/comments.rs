//! Comment procedures
//!
//! - GET  /api/comment.getCommentsByArticleId?articleId=
//! - POST /api/comment.create (auth)
//! - POST /api/comment.deleteById (auth)

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, ApiJson, ApiQuery, AppState, CallerContext};
use crate::models::CommentWithAuthor;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub article_id: i64,
    pub comment_body: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentIdRequest {
    pub comment_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleIdQuery {
    pub article_id: i64,
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/comment.getCommentsByArticleId", get(get_comments))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/comment.create", post(create_comment))
        .route("/comment.deleteById", post(delete_comment))
}

async fn get_comments(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ArticleIdQuery>,
) -> Result<Json<Vec<CommentWithAuthor>>, ApiError> {
    let comments = state
        .comment_service
        .list_for_article(query.article_id)
        .await?;
    Ok(Json(comments))
}

async fn create_comment(
    State(state): State<AppState>,
    caller: CallerContext,
    ApiJson(body): ApiJson<CreateCommentRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .comment_service
        .create(body.article_id, body.comment_body, caller.require()?)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_comment(
    State(state): State<AppState>,
    caller: CallerContext,
    ApiJson(body): ApiJson<CommentIdRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .comment_service
        .delete_by_id(body.comment_id, caller.require()?)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
