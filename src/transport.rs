#![forbid(unsafe_code)]

use crate::app_state::AppState;
use crate::domain::RegistrationRequest;
use crate::error::{Context, Result};
use crate::registry::credentials::constant_time_eq;
use crate::registry::engine::RegistryError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Path};
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const SERVICE_ID_HEADER: &str = "x-service-id";
const SERVICE_TOKEN_HEADER: &str = "x-service-token";
const ADMIN_KEY_HEADER: &str = "x-admin-key";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/service", post(register_service))
        .route("/services/{service_type}", get(list_instances))
        .route("/service/{id}", get(get_instance).delete(remove_instance))
        .route("/admin/health", get(admin_health))
        .route("/admin/shutdown", post(admin_shutdown))
        .layer(Extension(state))
}

pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = router(state);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown.cancelled().await;
    })
    .await
    .context("registry HTTP server exited abnormally")?;

    Ok(())
}

async fn root() -> &'static str {
    "beacon service registry"
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterBody {
    #[serde(default)]
    service_type: String,
    port: JsonValue,
    #[serde(default)]
    meta: Option<BTreeMap<String, JsonValue>>,
}

async fn register_service(
    Extension(state): Extension<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: std::result::Result<Json<RegisterBody>, JsonRejection>,
) -> Response {
    let Some(presented_key) = bearer_token(&headers) else {
        return failure(
            StatusCode::UNAUTHORIZED,
            "missing or malformed Authorization header",
        );
    };

    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return failure(
                StatusCode::BAD_REQUEST,
                format!("invalid request body: {rejection}"),
            )
        }
    };

    let port = match &body.port {
        JsonValue::Number(number) => number.to_string(),
        JsonValue::String(text) => text.clone(),
        _ => return failure(StatusCode::BAD_REQUEST, "port must be a number or a string"),
    };

    let mut request = RegistrationRequest::new(body.service_type, peer.ip().to_string(), port);
    if let Some(meta) = body.meta {
        request.meta = meta
            .into_iter()
            .map(|(key, value)| (key, meta_label(value)))
            .collect();
    }

    match state.engine.register(request, presented_key) {
        Ok(receipt) => (
            StatusCode::CREATED,
            Json(success_body(json!({
                "serviceId": receipt.id,
                "token": receipt.token,
            }))),
        )
            .into_response(),
        Err(err) => registry_failure(err),
    }
}

async fn list_instances(
    Extension(state): Extension<AppState>,
    Path(service_type): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !service_auth(&state, &headers) {
        return failure(StatusCode::UNAUTHORIZED, "invalid service credentials");
    }

    let instances = state.engine.instances_by_type(&service_type);
    if instances.is_empty() {
        return failure(
            StatusCode::BAD_REQUEST,
            format!("unknown service type `{service_type}`"),
        );
    }

    (StatusCode::OK, Json(success_body(json!(instances)))).into_response()
}

async fn get_instance(
    Extension(state): Extension<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !service_auth(&state, &headers) {
        return failure(StatusCode::UNAUTHORIZED, "invalid service credentials");
    }

    let data = match state.engine.instance_by_id(&id) {
        Some(instance) => json!(instance),
        None => JsonValue::Null,
    };

    (StatusCode::OK, Json(success_body(data))).into_response()
}

async fn remove_instance(
    Extension(state): Extension<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !service_auth(&state, &headers) {
        return failure(StatusCode::UNAUTHORIZED, "invalid service credentials");
    }

    match state.engine.unregister(&id) {
        Ok(()) => (
            StatusCode::OK,
            Json(success_body(json!({ "serviceId": id }))),
        )
            .into_response(),
        Err(err) => registry_failure(err),
    }
}

async fn admin_health(Extension(state): Extension<AppState>, headers: HeaderMap) -> Response {
    if !admin_auth(&state, &headers) {
        return failure(StatusCode::UNAUTHORIZED, "invalid admin key");
    }

    (
        StatusCode::OK,
        Json(success_body(json!({
            "status": "UP",
            "timestamp": Utc::now().timestamp_millis(),
            "instanceCount": state.engine.instance_count(),
            "serviceCount": state.engine.service_type_count(),
        }))),
    )
        .into_response()
}

async fn admin_shutdown(Extension(state): Extension<AppState>, headers: HeaderMap) -> Response {
    if !admin_auth(&state, &headers) {
        return failure(StatusCode::UNAUTHORIZED, "invalid admin key");
    }

    tracing::info!("shutdown requested via admin endpoint");
    state.engine.dispose();
    state.shutdown.cancel();

    (
        StatusCode::OK,
        Json(success_body(json!({ "status": "shutting down" }))),
    )
        .into_response()
}

/// Meta values are stored as string labels; non-string JSON scalars keep
/// their JSON rendering.
fn meta_label(value: JsonValue) -> String {
    match value {
        JsonValue::String(text) => text,
        other => other.to_string(),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn header_value<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name)?.to_str().ok()
}

fn service_auth(state: &AppState, headers: &HeaderMap) -> bool {
    match (
        header_value(headers, SERVICE_ID_HEADER),
        header_value(headers, SERVICE_TOKEN_HEADER),
    ) {
        (Some(id), Some(token)) => state.engine.validate_instance_auth(id, token),
        _ => false,
    }
}

fn admin_auth(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(expected) = state.admin_key.as_deref() else {
        return false;
    };
    match header_value(headers, ADMIN_KEY_HEADER) {
        Some(presented) => constant_time_eq(presented.as_bytes(), expected.as_bytes()),
        None => false,
    }
}

fn success_body(data: JsonValue) -> JsonValue {
    json!({
        "success": true,
        "data": data,
        "timestamp": Utc::now().timestamp_millis(),
    })
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "error": message.into(),
            "timestamp": Utc::now().timestamp_millis(),
        })),
    )
        .into_response()
}

fn registry_failure(err: RegistryError) -> Response {
    let status = match err {
        RegistryError::Authentication => StatusCode::UNAUTHORIZED,
        RegistryError::Validation { .. } => StatusCode::BAD_REQUEST,
        RegistryError::Disposed => StatusCode::SERVICE_UNAVAILABLE,
    };
    failure(status, err.to_string())
}
