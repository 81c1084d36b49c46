//! User procedures
//!
//! - POST /api/user.register
//! - POST /api/user.login
//! - GET  /api/user.getUserByUsername?username=
//! - GET  /api/user.getCurrentUser (auth)
//! - POST /api/user.update (auth)
//! - POST /api/user.changeFollowingStatus (auth)

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, ApiJson, ApiQuery, AppState, CallerContext};
use crate::models::{CurrentUser, Profile};
use crate::services::{AuthenticatedUser, LoginInput, RegisterInput, UpdateUserInput};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub image: Option<String>,
    pub bio: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UsernameQuery {
    pub username: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowRequest {
    pub target_user_id: i64,
}

/// Response for register and login
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub id: i64,
    pub access_token: String,
}

impl From<AuthenticatedUser> for AuthResponse {
    fn from(auth: AuthenticatedUser) -> Self {
        Self {
            id: auth.id,
            access_token: auth.access_token,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowResponse {
    pub is_following: bool,
}

/// Routes open to anonymous callers
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/user.register", post(register))
        .route("/user.login", post(login))
        .route("/user.getUserByUsername", get(get_user_by_username))
}

/// Routes behind `require_auth`
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/user.getCurrentUser", get(get_current_user))
        .route("/user.update", post(update))
        .route("/user.changeFollowingStatus", post(change_following_status))
}

async fn register(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RegisterRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let auth = state
        .user_service
        .register(RegisterInput::new(body.email, body.password, body.username))
        .await?;
    Ok(Json(auth.into()))
}

async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let auth = state
        .user_service
        .login(LoginInput::new(body.email, body.password))
        .await?;
    Ok(Json(auth.into()))
}

async fn get_user_by_username(
    State(state): State<AppState>,
    caller: CallerContext,
    ApiQuery(query): ApiQuery<UsernameQuery>,
) -> Result<Json<Profile>, ApiError> {
    let profile = state
        .user_service
        .get_profile_by_username(&query.username, caller.user_id)
        .await?;
    Ok(Json(profile))
}

async fn get_current_user(
    State(state): State<AppState>,
    caller: CallerContext,
) -> Result<Json<CurrentUser>, ApiError> {
    let user = state.user_service.get_current_user(caller.require()?).await?;
    Ok(Json(user))
}

async fn update(
    State(state): State<AppState>,
    caller: CallerContext,
    ApiJson(body): ApiJson<UpdateUserRequest>,
) -> Result<Json<CurrentUser>, ApiError> {
    let input = UpdateUserInput {
        email: body.email,
        username: body.username,
        password: body.password,
        bio: body.bio,
        image: body.image,
    };
    let user = state.user_service.update(caller.require()?, input).await?;
    Ok(Json(user))
}

async fn change_following_status(
    State(state): State<AppState>,
    caller: CallerContext,
    ApiJson(body): ApiJson<FollowRequest>,
) -> Result<Json<FollowResponse>, ApiError> {
    let is_following = state
        .user_service
        .change_following_status(body.target_user_id, caller.require()?)
        .await?;
    Ok(Json(FollowResponse { is_following }))
}
