//! API layer - HTTP handlers and routing
//!
//! Every operation is a named procedure under `/api/<group>.<name>`.
//! Reads are `GET` with query parameters, mutations are `POST` with a JSON
//! body. Procedures marked (auth) sit behind `require_auth`; the rest go
//! through `optional_auth` so viewer-relative flags can be computed.

pub mod articles;
pub mod comments;
pub mod middleware;
pub mod tags;
pub mod users;

use anyhow::Context;
use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use middleware::{ApiError, AppState, CallerContext, ErrorKind};

/// Build the procedure router (mounted under `/api`)
pub fn build_api_router(state: AppState) -> Router<AppState> {
    let protected_routes = Router::new()
        .merge(users::protected_router())
        .merge(articles::protected_router())
        .merge(comments::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    let public_routes = Router::new()
        .merge(users::public_router())
        .merge(articles::public_router())
        .merge(comments::public_router())
        .merge(tags::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::optional_auth,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(public_routes)
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> anyhow::Result<Router> {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    let cors = if cors_origin == "*" {
        cors.allow_origin(Any)
    } else {
        let origin = cors_origin
            .parse::<HeaderValue>()
            .with_context(|| format!("Invalid CORS origin: {}", cors_origin))?;
        cors.allow_origin(origin)
    };

    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors);

    Ok(Router::new()
        .nest("/api", build_api_router(state.clone()))
        .layer(middleware)
        .with_state(state))
}

async fn health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state
        .pool
        .ping()
        .await
        .map_err(|e| ApiError::internal(&e))?;
    Ok(Json(json!({ "status": "ok" })))
}
