use super::gateway::CommandGateway;
use super::types::{ErrorCode, GatewayRequest, GatewayResponse, QueryKind, UnlinkResponse};
use crate::auth::AuthenticatedUser;
use axum::{
    Extension,
    extract::{FromRequestParts, State, rejection::JsonRejection},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;

pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

#[derive(Clone)]
pub struct SmartHomeState {
    pub gateway: Arc<CommandGateway>,
}

/// The platform's `X-Request-Id`, echoed back in every envelope.
/// Requests without one are rejected with 400 before reaching the gateway.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for RequestId {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        match id {
            Some(id) => Ok(RequestId(id.to_string())),
            None => {
                tracing::warn!("{} {} without {} header", parts.method, parts.uri, REQUEST_ID_HEADER);
                let body = GatewayResponse::error(None, ErrorCode::InvalidValue, "missing-request-id");
                Err((StatusCode::BAD_REQUEST, Json(body)).into_response())
            }
        }
    }
}

/// GET /v1.0/user/devices
pub async fn devices_handler(
    State(state): State<SmartHomeState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    RequestId(request_id): RequestId,
) -> Response {
    tracing::info!("Discovery request {} from user {}", request_id, user_id);
    let response = state
        .gateway
        .process_request(GatewayRequest::default(), &request_id, &user_id, QueryKind::Discovery)
        .await;
    Json(response).into_response()
}

/// POST /v1.0/user/devices/query
pub async fn query_handler(
    State(state): State<SmartHomeState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    RequestId(request_id): RequestId,
    body: Result<Json<GatewayRequest>, JsonRejection>,
) -> Response {
    tracing::info!("Query request {} from user {}", request_id, user_id);
    with_body(&state, body, &request_id, &user_id, QueryKind::Query).await
}

/// POST /v1.0/user/devices/action
pub async fn action_handler(
    State(state): State<SmartHomeState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    RequestId(request_id): RequestId,
    body: Result<Json<GatewayRequest>, JsonRejection>,
) -> Response {
    tracing::info!("Action request {} from user {}", request_id, user_id);
    with_body(&state, body, &request_id, &user_id, QueryKind::Action).await
}

async fn with_body(
    state: &SmartHomeState,
    body: Result<Json<GatewayRequest>, JsonRejection>,
    request_id: &str,
    user_id: &str,
    kind: QueryKind,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::warn!("Malformed {} request {}: {}", kind, request_id, rejection);
            let body = GatewayResponse::error(Some(request_id), ErrorCode::InvalidValue, "invalid-json");
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
    };

    let response = state
        .gateway
        .process_request(request, request_id, user_id, kind)
        .await;
    Json(response).into_response()
}

/// POST /v1.0/user/unlink. Tokens are stateless, so there is nothing to
/// revoke; the platform just needs the acknowledgement.
pub async fn unlink_handler(
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    RequestId(request_id): RequestId,
) -> Json<UnlinkResponse> {
    tracing::info!("Unlink request {} from user {}", request_id, user_id);
    Json(UnlinkResponse { request_id })
}

/// HEAD /v1.0
pub async fn health_handler() -> &'static str {
    "OK"
}
