//! Article procedures
//!
//! - GET  /api/article.getBySlug?slug=
//! - GET  /api/article.getArticles?authorId=&favoritedByUserId=&tag=
//! - GET  /api/article.getUserFeed (auth)
//! - POST /api/article.create (auth)
//! - POST /api/article.update (auth)
//! - POST /api/article.delete (auth)
//! - POST /api/article.changeArticleFavoritedStatus (auth)

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, ApiJson, ApiQuery, AppState, CallerContext};
use crate::models::{ArticleFilter, ArticleView, CreatedArticle};
use crate::services::{CreateArticleInput, UpdateArticleInput};

#[derive(Debug, Deserialize)]
pub struct CreateArticleRequest {
    pub title: String,
    pub description: String,
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateArticleRequest {
    pub slug: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub body: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleIdRequest {
    pub article_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct SlugQuery {
    pub slug: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SlugResponse {
    pub slug: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteResponse {
    pub is_favorited: bool,
}

/// Routes open to anonymous callers
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/article.getBySlug", get(get_by_slug))
        .route("/article.getArticles", get(get_articles))
}

/// Routes behind `require_auth`
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/article.getUserFeed", get(get_user_feed))
        .route("/article.create", post(create))
        .route("/article.update", post(update))
        .route("/article.delete", post(delete))
        .route(
            "/article.changeArticleFavoritedStatus",
            post(change_favorited_status),
        )
}

async fn get_by_slug(
    State(state): State<AppState>,
    caller: CallerContext,
    ApiQuery(query): ApiQuery<SlugQuery>,
) -> Result<Json<ArticleView>, ApiError> {
    let article = state
        .article_service
        .get_by_slug(&query.slug, caller.user_id)
        .await?;
    Ok(Json(article))
}

async fn get_articles(
    State(state): State<AppState>,
    caller: CallerContext,
    ApiQuery(filter): ApiQuery<ArticleFilter>,
) -> Result<Json<Vec<ArticleView>>, ApiError> {
    let articles = state.article_service.list(filter, caller.user_id).await?;
    Ok(Json(articles))
}

async fn get_user_feed(
    State(state): State<AppState>,
    caller: CallerContext,
) -> Result<Json<Vec<ArticleView>>, ApiError> {
    let articles = state.article_service.feed(caller.require()?).await?;
    Ok(Json(articles))
}

async fn create(
    State(state): State<AppState>,
    caller: CallerContext,
    ApiJson(body): ApiJson<CreateArticleRequest>,
) -> Result<Json<CreatedArticle>, ApiError> {
    let input = CreateArticleInput::new(body.title, body.description, body.body).with_tags(body.tags);
    let created = state.article_service.create(input, caller.require()?).await?;
    Ok(Json(created))
}

async fn update(
    State(state): State<AppState>,
    caller: CallerContext,
    ApiJson(body): ApiJson<UpdateArticleRequest>,
) -> Result<Json<SlugResponse>, ApiError> {
    let input = UpdateArticleInput {
        slug: body.slug,
        title: body.title,
        description: body.description,
        body: body.body,
        tags: body.tags,
    };
    let slug = state.article_service.update(input, caller.require()?).await?;
    Ok(Json(SlugResponse { slug }))
}

async fn delete(
    State(state): State<AppState>,
    caller: CallerContext,
    ApiJson(body): ApiJson<ArticleIdRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .article_service
        .delete(body.article_id, caller.require()?)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn change_favorited_status(
    State(state): State<AppState>,
    caller: CallerContext,
    ApiJson(body): ApiJson<ArticleIdRequest>,
) -> Result<Json<FavoriteResponse>, ApiError> {
    let is_favorited = state
        .article_service
        .change_favorited_status(body.article_id, caller.require()?)
        .await?;
    Ok(Json(FavoriteResponse { is_favorited }))
}
