use super::handlers::OAuthAppState;
use axum::{
    Form,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};

/// where yandex wants the code delivered when the request didn't say
const DEFAULT_REDIRECT_URI: &str = "https://social.yandex.net/broker/redirect";

/// there are no user accounts, everyone who links is the same household
const ANONYMOUS_USER: &str = "anonymous";

#[derive(Debug, Deserialize)]
pub struct AuthorizationRequest {
    pub response_type: String,
    pub client_id: String,
    pub state: String,
    pub scope: Option<String>,
    pub redirect_uri: Option<String>,
}

/// posted back by the login page
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub state: String,
    pub client_id: String,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
}

#[derive(Serialize)]
struct RedirectParams<'a> {
    code: &'a str,
    state: &'a str,
    client_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<&'a str>,
}

/// GET /oauth/authorize - checks the client and shows the login page
pub async fn authorize_handler(
    State(state): State<OAuthAppState>,
    Query(req): Query<AuthorizationRequest>,
) -> Response {
    tracing::info!(
        "Authorize page request: client_id={}, response_type={}, scope={:?}",
        req.client_id,
        req.response_type,
        req.scope
    );

    if !req.response_type.eq_ignore_ascii_case("code") {
        tracing::warn!("Unsupported response_type: {}", req.response_type);
        return (
            StatusCode::BAD_REQUEST,
            format!("Unsupported response_type: {}", req.response_type),
        )
            .into_response();
    }

    // validate redirect_uri BEFORE we redirect anywhere
    if !state
        .issuer
        .is_valid_client_redirect(&req.client_id, req.redirect_uri.as_deref().unwrap_or_default())
    {
        return (StatusCode::BAD_REQUEST, "Invalid client_id or redirect_uri").into_response();
    }

    let html = login_page(&req);
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'self'; style-src 'unsafe-inline'; form-action *"),
    );
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));

    (headers, Html(html)).into_response()
}

/// POST /oauth/login - issues a code and bounces back to the platform
pub async fn login_handler(
    State(state): State<OAuthAppState>,
    Form(form): Form<LoginForm>,
) -> Response {
    tracing::info!("Login request: client_id={}, state={}", form.client_id, form.state);

    // the form is just hidden fields, so anyone can post whatever they like here
    if !state
        .issuer
        .is_valid_client_redirect(&form.client_id, form.redirect_uri.as_deref().unwrap_or_default())
    {
        return (StatusCode::BAD_REQUEST, "Invalid client_id or redirect_uri").into_response();
    }

    let scope = form.scope.as_deref().filter(|s| !s.trim().is_empty());
    let code = match state.issuer.create_code(ANONYMOUS_USER, scope.unwrap_or_default()) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("Failed to create authorization code: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create authorization code")
                .into_response();
        }
    };

    let redirect_uri = form
        .redirect_uri
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .unwrap_or(DEFAULT_REDIRECT_URI);

    match build_redirect_url(redirect_uri, &code, &form.state, &form.client_id, scope) {
        Ok(url) => {
            tracing::info!(
                "Authorization granted for client_id={}, redirecting to {}",
                form.client_id,
                redirect_uri
            );
            Redirect::to(&url).into_response()
        }
        Err(e) => {
            tracing::error!("Failed to build redirect url: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to build redirect").into_response()
        }
    }
}

fn build_redirect_url(
    redirect_uri: &str,
    code: &str,
    state: &str,
    client_id: &str,
    scope: Option<&str>,
) -> Result<String, serde_urlencoded::ser::Error> {
    let query = serde_urlencoded::to_string(RedirectParams {
        code,
        state,
        client_id,
        scope,
    })?;
    let sep = if redirect_uri.contains('?') { '&' } else { '?' };
    Ok(format!("{redirect_uri}{sep}{query}"))
}

fn login_page(req: &AuthorizationRequest) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Link StingrayTV</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            max-width: 400px;
            margin: 100px auto;
            padding: 20px;
            text-align: center;
        }}
        h1 {{ color: #333; }}
        .client-id {{
            background: #f5f5f5;
            padding: 10px;
            border-radius: 4px;
            font-family: monospace;
            word-break: break-all;
        }}
        button {{
            margin-top: 30px;
            padding: 12px 24px;
            border: none;
            border-radius: 4px;
            cursor: pointer;
            font-size: 16px;
            background: #0066cc;
            color: white;
        }}
    </style>
</head>
<body>
    <h1>Link your receiver</h1>
    <p>The following application wants to control your StingrayTV receiver:</p>
    <div class="client-id">{client_id}</div>
    <form method="post" action="/oauth/login">
        <input type="hidden" name="state" value="{state}">
        <input type="hidden" name="client_id" value="{client_id}">
        <input type="hidden" name="redirect_uri" value="{redirect_uri}">
        <input type="hidden" name="scope" value="{scope}">
        <button type="submit">Link</button>
    </form>
</body>
</html>"#,
        client_id = html_escape(&req.client_id),
        state = html_escape(&req.state),
        redirect_uri = html_escape(req.redirect_uri.as_deref().unwrap_or_default()),
        scope = html_escape(req.scope.as_deref().unwrap_or_default()),
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthConfig, ClientConfig, TokenIssuer};
    use axum::{
        Router,
        body::Body,
        http::Request,
        routing::{get, post},
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(clients: Vec<ClientConfig>) -> Router {
        let issuer = Arc::new(TokenIssuer::new(&AuthConfig {
            jwt_secret: "test-secret-that-is-long-enough-for-hs256".to_string(),
            expires_in: 3600,
            clients,
        }));
        Router::new()
            .route("/oauth/authorize", get(authorize_handler))
            .route("/oauth/login", post(login_handler))
            .with_state(OAuthAppState { issuer })
    }

    fn yandex_only() -> Vec<ClientConfig> {
        vec![ClientConfig {
            client_id: "yandex".to_string(),
            redirect_uris: vec![DEFAULT_REDIRECT_URI.to_string()],
        }]
    }

    #[test]
    fn test_build_redirect_url() {
        let url = build_redirect_url(
            "https://social.yandex.net/broker/redirect",
            "abc.def.ghi",
            "st ate",
            "yandex",
            Some("smart-home"),
        )
        .unwrap();
        assert_eq!(
            url,
            "https://social.yandex.net/broker/redirect?code=abc.def.ghi&state=st+ate&client_id=yandex&scope=smart-home"
        );

        let url = build_redirect_url("https://x.example/cb?a=1", "c", "s", "id", None).unwrap();
        assert_eq!(url, "https://x.example/cb?a=1&code=c&state=s&client_id=id");
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("<a href=\"x\">&</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }

    #[tokio::test]
    async fn test_authorize_serves_login_page() {
        let response = app(yandex_only())
            .oneshot(
                Request::get(
                    "/oauth/authorize?response_type=code&client_id=yandex&state=xyz\
                     &redirect_uri=https%3A%2F%2Fsocial.yandex.net%2Fbroker%2Fredirect",
                )
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains(r#"name="state" value="xyz""#));
    }

    #[tokio::test]
    async fn test_authorize_rejects_bad_response_type() {
        let response = app(vec![])
            .oneshot(
                Request::get("/oauth/authorize?response_type=token&client_id=yandex&state=xyz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_authorize_rejects_unregistered_redirect() {
        let response = app(yandex_only())
            .oneshot(
                Request::get(
                    "/oauth/authorize?response_type=code&client_id=yandex&state=xyz\
                     &redirect_uri=https%3A%2F%2Fevil.example%2Fcb",
                )
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_login_redirects_with_code() {
        let response = app(vec![])
            .oneshot(
                Request::post("/oauth/login")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from(
                        "state=xyz&client_id=yandex&redirect_uri=https%3A%2F%2Fx.example%2Fcb&scope=",
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_redirection());
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://x.example/cb?code="));
        assert!(location.ends_with("&state=xyz&client_id=yandex"));
    }

    #[tokio::test]
    async fn test_login_defaults_to_yandex_broker() {
        let response = app(vec![])
            .oneshot(
                Request::post("/oauth/login")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from("state=xyz&client_id=yandex&scope=smart-home"))
                    .unwrap(),
            )
            .await
            .unwrap();

        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://social.yandex.net/broker/redirect?code="));
        assert!(location.ends_with("&scope=smart-home"));
    }
}
