//! Router construction.
//!
//! # Responsibilities
//! - Liveness (`/health`) and database readiness (`/health/db`) endpoints
//! - Mount externally defined routes under [`API_PREFIX`]
//! - Wire up middleware (request ID, tracing, panic recovery, deadline, CORS)

use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Method, Request},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{Config, CorsConfig};
use crate::database::{self, Database};
use crate::error::Error;
use crate::http::request::{MakeRequestUuidV4, RequestIdExt, X_REQUEST_ID};

/// Versioned prefix for API routes.
pub const API_PREFIX: &str = "/api/v1";

/// Build the application router.
///
/// `api` holds the routes mounted under [`API_PREFIX`]; pass `Router::new()`
/// when there are none. `/health/db` exists only when `db` is given.
#[allow(deprecated)]
pub fn build(config: &Config, db: Option<Database>, api: Router) -> Router {
    let mut router = Router::new().route("/health", get(health));
    if let Some(db) = db {
        router = router.route("/health/db", get(database_health).with_state(db));
    }

    router.nest(API_PREFIX, api).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuidV4))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = request.request_id().unwrap_or("-"),
                )
            }))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(CatchPanicLayer::new())
            .layer(TimeoutLayer::new(response_deadline(config)))
            .layer(cors_layer(&config.cors)),
    )
}

fn response_deadline(config: &Config) -> Duration {
    if config.server.write_timeout.is_zero() {
        Duration::MAX
    } else {
        config.server.write_timeout
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn database_health(State(db): State<Database>) -> Result<Json<Value>, Error> {
    database::health_check(&db).await?;
    Ok(Json(json!({ "status": "ok" })))
}

fn is_wildcard(values: &[String]) -> bool {
    values.iter().any(|v| v == "*")
}

/// CORS policy from configuration. Unparseable entries are skipped.
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins = if is_wildcard(&config.allowed_origins) {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(parse_all(&config.allowed_origins, |v| HeaderValue::from_str(v).ok()))
    };

    let methods = if is_wildcard(&config.allowed_methods) {
        AllowMethods::any()
    } else {
        AllowMethods::list(parse_all(&config.allowed_methods, |v| {
            Method::from_bytes(v.to_ascii_uppercase().as_bytes()).ok()
        }))
    };

    let headers = if is_wildcard(&config.allowed_headers) {
        AllowHeaders::any()
    } else {
        AllowHeaders::list(parse_all(&config.allowed_headers, |v| {
            HeaderName::from_bytes(v.as_bytes()).ok()
        }))
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(headers)
}

fn parse_all<T>(values: &[String], parse: impl Fn(&str) -> Option<T>) -> Vec<T> {
    values
        .iter()
        .filter_map(|value| {
            let parsed = parse(value);
            if parsed.is_none() {
                tracing::warn!(value = %value, "ignoring invalid CORS entry");
            }
            parsed
        })
        .collect()
}
