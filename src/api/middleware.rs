//! API middleware and shared request types
//!
//! - `AppState`, the services handed to every handler
//! - `ApiError`, the structured error body and its status mapping
//! - `CallerContext`, the request-scoped identity resolved from the bearer token
//! - `require_auth` / `optional_auth`, which resolve that identity

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Request, State,
    },
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;

use crate::db::repositories::{
    SqlxArticleRepository, SqlxCommentRepository, SqlxRelationRepository, SqlxTagRepository,
    SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::services::{
    ArticleService, ArticleServiceError, CommentService, CommentServiceError, FieldError,
    TagService, TagServiceError, TokenService, UserService, UserServiceError,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub user_service: Arc<UserService>,
    pub article_service: Arc<ArticleService>,
    pub comment_service: Arc<CommentService>,
    pub tag_service: Arc<TagService>,
}

impl AppState {
    /// Wire the SQL repositories and services over one pool
    pub fn new(pool: DynDatabasePool, tokens: Arc<TokenService>) -> Self {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let relation_repo = SqlxRelationRepository::boxed(pool.clone());
        let article_repo = SqlxArticleRepository::boxed(pool.clone());
        let comment_repo = SqlxCommentRepository::boxed(pool.clone());
        let tag_repo = SqlxTagRepository::boxed(pool.clone());

        Self {
            user_service: Arc::new(UserService::new(user_repo, relation_repo.clone(), tokens)),
            article_service: Arc::new(ArticleService::new(article_repo.clone(), relation_repo)),
            comment_service: Arc::new(CommentService::new(comment_repo, article_repo)),
            tag_service: Arc::new(TagService::new(tag_repo)),
            pool,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Machine-readable error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Unauthorized,
    BadRequest,
    NotFound,
    Conflict,
    Internal,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

impl ApiError {
    pub fn new(code: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code,
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(code: ErrorKind, message: impl Into<String>, details: Vec<FieldError>) -> Self {
        Self {
            error: ApiErrorDetail {
                code,
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Log the cause and hide it from the caller
    pub fn internal(err: &anyhow::Error) -> Self {
        tracing::error!("Internal error: {:#}", err);
        Self::new(ErrorKind::Internal, "Internal server error")
    }

    fn validation(errors: Vec<FieldError>) -> Self {
        Self::with_details(ErrorKind::BadRequest, "Validation failed", errors)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.error.code.status(), Json(self)).into_response()
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        let message = err.to_string();
        match err {
            UserServiceError::ValidationError(errors) => ApiError::validation(errors),
            UserServiceError::UnknownEmail => ApiError::with_details(
                ErrorKind::BadRequest,
                message.clone(),
                vec![FieldError::new("email", message)],
            ),
            UserServiceError::WrongPassword => ApiError::with_details(
                ErrorKind::BadRequest,
                message.clone(),
                vec![FieldError::new("password", message)],
            ),
            UserServiceError::Conflict(field) => {
                ApiError::with_details(ErrorKind::Conflict, message, vec![field])
            }
            UserServiceError::NotFound => ApiError::not_found(message),
            UserServiceError::SelfFollow => ApiError::bad_request(message),
            UserServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

impl From<ArticleServiceError> for ApiError {
    fn from(err: ArticleServiceError) -> Self {
        match err {
            ArticleServiceError::ValidationError(errors) => ApiError::validation(errors),
            ArticleServiceError::NotFound => ApiError::not_found("Article not found"),
            ArticleServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

impl From<CommentServiceError> for ApiError {
    fn from(err: CommentServiceError) -> Self {
        let message = err.to_string();
        match err {
            CommentServiceError::ValidationError(errors) => ApiError::validation(errors),
            CommentServiceError::NotFound(_) => ApiError::not_found(message),
            CommentServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

impl From<TagServiceError> for ApiError {
    fn from(err: TagServiceError) -> Self {
        match err {
            TagServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

/// JSON body extractor that reports malformed input as `BAD_REQUEST`
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Query string extractor that reports malformed input as `BAD_REQUEST`
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

// ============================================================================
// Caller identity
// ============================================================================

/// Identity of the caller for one request. `user_id` is `None` for anonymous callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallerContext {
    pub user_id: Option<i64>,
}

impl CallerContext {
    /// The caller's id, or `UNAUTHORIZED` for anonymous callers
    pub fn require(&self) -> Result<i64, ApiError> {
        self.user_id
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

// Routes without an auth layer see an anonymous caller
impl<S> FromRequestParts<S> for CallerContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<CallerContext>()
            .copied()
            .unwrap_or_default())
    }
}

/// Extract the bearer token from the `Authorization` header
fn extract_bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Reject the request unless it carries a token for an existing user
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(&request)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user_id = state
        .user_service
        .resolve_token(token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))?;

    request.extensions_mut().insert(CallerContext {
        user_id: Some(user_id),
    });
    Ok(next.run(request).await)
}

/// Resolve the caller when a valid token is present; otherwise continue anonymously
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_bearer_token(&request) {
        match state.user_service.resolve_token(token).await {
            Ok(Some(user_id)) => {
                request.extensions_mut().insert(CallerContext {
                    user_id: Some(user_id),
                });
            }
            Ok(None) => tracing::debug!("Ignoring invalid token on public route"),
            Err(e) => tracing::warn!("Token resolution failed, continuing anonymously: {}", e),
        }
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with_auth(value: &str) -> Request {
        Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, value)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_extract_bearer_token() {
        let request = request_with_auth("Bearer abc.def.ghi");
        assert_eq!(extract_bearer_token(&request), Some("abc.def.ghi"));
    }

    #[test]
    fn test_extract_bearer_token_rejects_other_schemes() {
        assert!(extract_bearer_token(&request_with_auth("Basic abc")).is_none());
        assert!(extract_bearer_token(&request_with_auth("Bearer ")).is_none());

        let bare = Request::builder().uri("/test").body(Body::empty()).unwrap();
        assert!(extract_bearer_token(&bare).is_none());
    }

    #[test]
    fn test_error_kind_status() {
        assert_eq!(ErrorKind::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorKind::BadRequest.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorKind::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorKind::Conflict.status(), StatusCode::CONFLICT);
        assert_eq!(ErrorKind::Internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_body_shape() {
        let err = ApiError::with_details(
            ErrorKind::BadRequest,
            "Validation failed",
            vec![FieldError::new("title", "title can't be blank")],
        );
        let json = serde_json::to_value(&err).unwrap();

        assert_eq!(json["error"]["code"], "BAD_REQUEST");
        assert_eq!(json["error"]["message"], "Validation failed");
        assert_eq!(json["error"]["details"][0]["field"], "title");
        assert_eq!(json["error"]["details"][0]["message"], "title can't be blank");

        let plain = serde_json::to_value(ApiError::not_found("gone")).unwrap();
        assert!(plain["error"].get("details").is_none());
    }

    #[test]
    fn test_user_errors_map_to_kinds() {
        let wrong: ApiError = UserServiceError::WrongPassword.into();
        assert_eq!(wrong.error.code, ErrorKind::BadRequest);
        assert_eq!(wrong.error.message, "password is not correct");
        assert_eq!(wrong.error.details.unwrap()[0].field, "password");

        let conflict: ApiError = UserServiceError::Conflict(FieldError::new(
            "email",
            "user with this email already exists",
        ))
        .into();
        assert_eq!(conflict.error.code, ErrorKind::Conflict);
        assert_eq!(conflict.error.message, "user with this email already exists");

        let internal: ApiError = UserServiceError::InternalError(anyhow::anyhow!("db down")).into();
        assert_eq!(internal.error.code, ErrorKind::Internal);
        assert!(!internal.error.message.contains("db down"));
    }

    #[test]
    fn test_caller_context_require() {
        assert_eq!(CallerContext { user_id: Some(3) }.require().unwrap(), 3);
        assert_eq!(
            CallerContext::default().require().unwrap_err().error.code,
            ErrorKind::Unauthorized
        );
    }
}
