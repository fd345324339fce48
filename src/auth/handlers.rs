use super::token::{OAuthError, TokenIssuer};
use super::traits::GrantType;
use axum::{
    Form,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Combined OAuth state for all handlers
#[derive(Clone)]
pub struct OAuthAppState {
    pub issuer: Arc<TokenIssuer>,
}

/// OAuth 2.0 token request (supports both grant types)
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    /// kept as a raw string so unknown values map to unsupported_grant_type
    pub grant_type: Option<String>,
    pub client_id: Option<String>,
    /// Authorization code (authorization_code grant)
    pub code: Option<String>,
    /// Refresh token (refresh_token grant)
    pub refresh_token: Option<String>,
}

/// OAuth 2.0 error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Handler for POST /oauth/token
pub async fn oauth_token_handler(
    State(state): State<OAuthAppState>,
    Form(req): Form<TokenRequest>,
) -> Response {
    tracing::info!(
        "Token request grant_type={:?}, client_id={:?}",
        req.grant_type,
        req.client_id
    );

    match exchange(&state.issuer, &req) {
        Ok(tokens) => (StatusCode::OK, Json(tokens)).into_response(),
        Err(e) => {
            match &e {
                OAuthError::Signing(_) => tracing::error!("Failed to issue token: {}", e),
                _ => tracing::warn!("Token request rejected: {}", e),
            }
            error_response(&e)
        }
    }
}

fn exchange(issuer: &TokenIssuer, req: &TokenRequest) -> Result<super::TokenResponse, OAuthError> {
    // client_id is checked before anything else, for every grant type
    if !issuer.is_valid_client(req.client_id.as_deref().unwrap_or_default()) {
        return Err(OAuthError::InvalidClient);
    }

    let grant_type = req
        .grant_type
        .as_deref()
        .and_then(GrantType::parse)
        .ok_or(OAuthError::UnsupportedGrantType)?;

    match grant_type {
        GrantType::AuthorizationCode => {
            let code = req
                .code
                .as_deref()
                .ok_or_else(|| OAuthError::InvalidGrant("missing code".to_string()))?;
            issuer.consume_code(code)
        }
        GrantType::RefreshToken => {
            let refresh_token = req
                .refresh_token
                .as_deref()
                .ok_or_else(|| OAuthError::InvalidGrant("missing refresh_token".to_string()))?;
            issuer.refresh(refresh_token)
        }
    }
}

fn error_response(err: &OAuthError) -> Response {
    let status = match err {
        OAuthError::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };
    let body = ErrorResponse {
        error: err.code().to_string(),
    };
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthConfig, ClientConfig};
    use axum::{Router, body::Body, http::Request, routing::post};
    use tower::ServiceExt;

    fn issuer(clients: Vec<ClientConfig>) -> Arc<TokenIssuer> {
        Arc::new(TokenIssuer::new(&AuthConfig {
            jwt_secret: "test-secret-that-is-long-enough-for-hs256".to_string(),
            expires_in: 3600,
            clients,
        }))
    }

    fn app(issuer: Arc<TokenIssuer>) -> Router {
        Router::new()
            .route("/oauth/token", post(oauth_token_handler))
            .with_state(OAuthAppState { issuer })
    }

    async fn post_form(app: Router, body: String) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::post("/oauth/token")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_authorization_code_grant() {
        let issuer = issuer(vec![]);
        let code = issuer.create_code("anonymous", "smart-home").unwrap();

        let (status, body) = post_form(
            app(issuer),
            format!("grant_type=authorization_code&client_id=yandex&code={code}"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_type"], "Bearer");
        assert_eq!(body["user_id"], "anonymous");
        assert_eq!(body["scope"], "smart-home");
        assert_eq!(body["expires_in"], 3600);
        assert!(body["access_token"].is_string());
        assert!(body["refresh_token"].is_string());
    }

    #[tokio::test]
    async fn test_refresh_token_grant_omits_refresh_token() {
        let issuer = issuer(vec![]);
        let code = issuer.create_code("anonymous", "smart-home").unwrap();
        let refresh = issuer.consume_code(&code).unwrap().refresh_token.unwrap();

        let (status, body) = post_form(
            app(issuer),
            format!("grant_type=refresh_token&client_id=yandex&refresh_token={refresh}"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["access_token"].is_string());
        assert!(body.get("refresh_token").is_none());
    }

    #[tokio::test]
    async fn test_unknown_client_rejected_first() {
        let issuer = issuer(vec![ClientConfig {
            client_id: "yandex".to_string(),
            redirect_uris: vec!["https://social.yandex.net/broker/redirect".to_string()],
        }]);

        let (status, body) =
            post_form(app(issuer), "grant_type=password&client_id=intruder".to_string()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_client");
    }

    #[tokio::test]
    async fn test_unsupported_grant_type() {
        let (status, body) = post_form(
            app(issuer(vec![])),
            "grant_type=client_credentials&client_id=yandex".to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "unsupported_grant_type");
    }

    #[tokio::test]
    async fn test_bad_code_is_invalid_grant() {
        let (status, body) = post_form(
            app(issuer(vec![])),
            "grant_type=authorization_code&client_id=yandex&code=nonsense".to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_grant");
    }

    #[tokio::test]
    async fn test_missing_code_is_invalid_grant() {
        let (status, body) = post_form(
            app(issuer(vec![])),
            "grant_type=authorization_code&client_id=yandex".to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_grant");
    }
}
