use super::TokenIssuer;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::sync::Arc;

/// user id taken from a validated access token, handed to the smart home handlers
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub String);

/// Bearer authentication for the smart home API. Only `access` tokens get
/// through; codes and refresh tokens are signed by the same key but rejected.
pub async fn bearer_auth_middleware(
    State(issuer): State<Arc<TokenIssuer>>,
    mut req: Request,
    next: Next,
) -> Response {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok());

    let token = match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) => token.trim(),
        None => {
            tracing::warn!(
                "Authentication failed for request: {} {}",
                req.method(),
                req.uri()
            );
            return unauthorized_response();
        }
    };

    match issuer.validate_access(token) {
        Ok(claims) => {
            tracing::debug!("Valid access token for user: {}", claims.sub);
            req.extensions_mut().insert(AuthenticatedUser(claims.sub));
            next.run(req).await
        }
        Err(e) => {
            tracing::warn!("Invalid access token for {} {}: {}", req.method(), req.uri(), e);
            unauthorized_response()
        }
    }
}

fn unauthorized_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": "Unauthorized",
            "message": "Authentication required",
        })),
    )
        .into_response()
}
