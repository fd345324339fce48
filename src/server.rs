use crate::auth::{self, OAuthAppState, TokenIssuer};
use crate::smarthome::{self, CommandGateway, SmartHomeState};
use anyhow::anyhow;
use axum::{
    Router, middleware,
    routing::{get, head, post},
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Builds the whole HTTP surface: the OAuth endpoints the platform links
/// accounts through, and the bearer-protected smart home API.
///
/// Also starts the rate limiter cleanup task, which stops when `shutdown`
/// is cancelled.
pub fn build_router(
    issuer: Arc<TokenIssuer>,
    gateway: Arc<CommandGateway>,
    shutdown: CancellationToken,
) -> anyhow::Result<Router> {
    // SmartIpKeyExtractor looks at x-forwarded-for and friends before the peer ip,
    // so limits are per client both behind a reverse proxy and without one

    // 10 requests per second per ip, burst of 30
    let api_governor = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(SmartIpKeyExtractor)
            .per_second(10)
            .burst_size(30)
            .finish()
            .ok_or_else(|| anyhow!("failed to build api rate limiter config"))?,
    );

    // stricter for the oauth endpoints: 5 per second, burst of 10
    let auth_governor = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(SmartIpKeyExtractor)
            .per_second(5)
            .burst_size(10)
            .finish()
            .ok_or_else(|| anyhow!("failed to build auth rate limiter config"))?,
    );

    let api_limiter = api_governor.limiter().clone();
    let auth_limiter = auth_governor.limiter().clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    api_limiter.retain_recent();
                    auth_limiter.retain_recent();
                }
            }
        }
        tracing::debug!("Rate limiter cleanup stopped");
    });

    let oauth_routes = Router::new()
        .route("/oauth/authorize", get(auth::authorize_handler))
        .route("/oauth/login", post(auth::login_handler))
        .route("/oauth/token", post(auth::oauth_token_handler))
        .layer(GovernorLayer::new(auth_governor))
        .with_state(OAuthAppState {
            issuer: issuer.clone(),
        });

    // route_layer so unknown paths still 404 instead of asking for a token
    let api_routes = Router::new()
        .route("/v1.0/user/devices", get(smarthome::devices_handler))
        .route("/v1.0/user/devices/query", post(smarthome::query_handler))
        .route("/v1.0/user/devices/action", post(smarthome::action_handler))
        .route("/v1.0/user/unlink", post(smarthome::unlink_handler))
        .route_layer(middleware::from_fn_with_state(
            issuer,
            auth::bearer_auth_middleware,
        ))
        .layer(GovernorLayer::new(api_governor))
        .with_state(SmartHomeState { gateway });

    // the platform pings this without a token
    let health = Router::new().route("/v1.0", head(smarthome::health_handler));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Ok(oauth_routes
        .merge(api_routes)
        .merge(health)
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthConfig;
    use crate::receiver::testing::FakeReceiver;
    use crate::smarthome::DeviceProfile;
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode, header},
        response::Response,
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        issuer: Arc<TokenIssuer>,
        fake: Arc<FakeReceiver>,
    }

    fn app() -> TestApp {
        let issuer = Arc::new(TokenIssuer::new(&AuthConfig {
            jwt_secret: "router-test-secret-long-enough-for-hs256".to_string(),
            expires_in: 3600,
            clients: vec![],
        }));
        let fake = FakeReceiver::new();
        let gateway = Arc::new(CommandGateway::new(
            Some(fake.receiver()),
            DeviceProfile {
                description: "StingrayTV receiver".to_string(),
                room: "Living room".to_string(),
            },
        ));
        let router = build_router(issuer.clone(), gateway, CancellationToken::new()).unwrap();
        TestApp {
            router,
            issuer,
            fake,
        }
    }

    impl TestApp {
        fn access_token(&self) -> String {
            let code = self.issuer.create_code("anonymous", "").unwrap();
            self.issuer.consume_code(&code).unwrap().access_token
        }

        async fn send(&self, request: Request<Body>) -> Response {
            self.router.clone().oneshot(request).await.unwrap()
        }
    }

    // the rate limiter needs a client ip and oneshot has no peer address
    fn request(method: Method, uri: &str) -> axum::http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", "203.0.113.7")
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_check_needs_no_token() {
        let app = app();
        let response = app
            .send(request(Method::HEAD, "/v1.0").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_bearer_is_401() {
        let app = app();
        let response = app
            .send(
                request(Method::GET, "/v1.0/user/devices")
                    .header("X-Request-Id", "r-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            json_body(response).await,
            json!({"error": "Unauthorized", "message": "Authentication required"})
        );
    }

    #[tokio::test]
    async fn test_refresh_token_is_not_a_bearer() {
        let app = app();
        let code = app.issuer.create_code("anonymous", "").unwrap();
        let refresh = app
            .issuer
            .consume_code(&code)
            .unwrap()
            .refresh_token
            .unwrap();

        let response = app
            .send(
                request(Method::GET, "/v1.0/user/devices")
                    .header("X-Request-Id", "r-1")
                    .header(header::AUTHORIZATION, format!("Bearer {refresh}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_discovery_with_token() {
        let app = app();
        let response = app
            .send(
                request(Method::GET, "/v1.0/user/devices")
                    .header("X-Request-Id", "r-2")
                    .header(header::AUTHORIZATION, format!("Bearer {}", app.access_token()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["request_id"], "r-2");
        assert_eq!(body["status"], "ok");
        assert_eq!(body["payload"]["user_id"], "anonymous");
        assert_eq!(body["payload"]["devices"][0]["id"], "SN-0042");
        assert_eq!(
            body["payload"]["devices"][0]["capabilities"]
                .as_array()
                .unwrap()
                .len(),
            3
        );
    }

    #[tokio::test]
    async fn test_request_id_required() {
        let app = app();
        let response = app
            .send(
                request(Method::GET, "/v1.0/user/devices")
                    .header(header::AUTHORIZATION, format!("Bearer {}", app.access_token()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_json_envelope() {
        let app = app();
        let response = app
            .send(
                request(Method::POST, "/v1.0/user/devices/query")
                    .header("X-Request-Id", "r-3")
                    .header(header::AUTHORIZATION, format!("Bearer {}", app.access_token()))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["error_code"], "INVALID_VALUE");
        assert_eq!(body["error_message"], "invalid-json");
        assert!(app.fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_action_through_router() {
        let app = app();
        let body = json!({
            "payload": {"devices": [{
                "id": "SN-0042",
                "capabilities": [{"type": "devices.capabilities.on_off", "state": {"instance": "on", "value": false}}],
            }]}
        });
        let response = app
            .send(
                request(Method::POST, "/v1.0/user/devices/action")
                    .header("X-Request-Id", "r-4")
                    .header(header::AUTHORIZATION, format!("Bearer {}", app.access_token()))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(
            body["payload"]["devices"][0]["capabilities"][0]["state"]["action_result"]["status"],
            "DONE"
        );
        assert_eq!(app.fake.count(reqwest::Method::PUT, "/power"), 1);
    }

    #[tokio::test]
    async fn test_unlink_echoes_request_id() {
        let app = app();
        let response = app
            .send(
                request(Method::POST, "/v1.0/user/unlink")
                    .header("X-Request-Id", "r-5")
                    .header(header::AUTHORIZATION, format!("Bearer {}", app.access_token()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"request_id": "r-5"}));
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let app = app();
        let response = app
            .send(request(Method::GET, "/v1.0/nope").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_account_linking_flow() {
        let app = app();

        let response = app
            .send(
                request(
                    Method::GET,
                    "/oauth/authorize?response_type=code&client_id=yandex&state=xyz",
                )
                .body(Body::empty())
                .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .send(
                request(Method::POST, "/oauth/login")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("state=xyz&client_id=yandex"))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(location.starts_with("https://social.yandex.net/broker/redirect?code="));

        let url = url::Url::parse(&location).unwrap();
        let code = url
            .query_pairs()
            .find(|(k, _)| k == "code")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        let response = app
            .send(
                request(Method::POST, "/oauth/token")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(format!(
                        "grant_type=authorization_code&client_id=yandex&code={code}"
                    )))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let tokens = json_body(response).await;

        let access = tokens["access_token"].as_str().unwrap();
        let response = app
            .send(
                request(Method::POST, "/v1.0/user/unlink")
                    .header("X-Request-Id", "r-6")
                    .header(header::AUTHORIZATION, format!("Bearer {access}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
