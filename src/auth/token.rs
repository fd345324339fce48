use super::AuthConfig;
use super::clients::ClientRegistry;
use super::traits::{Claims, ClientValidator, TokenKind, TokenResponse};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use std::sync::Arc;
use uuid::Uuid;

const ISSUER: &str = "stingray-alice";

/// authorization codes are only good for five minutes
pub const CODE_TTL_SECS: i64 = 300;

/// refresh tokens outlive access tokens 168 times over, a week at the default
const REFRESH_TTL_FACTOR: u64 = 24 * 7;

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("client is not registered")]
    InvalidClient,
    #[error("invalid grant: {0}")]
    InvalidGrant(String),
    #[error("unsupported grant type")]
    UnsupportedGrantType,
    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

impl OAuthError {
    /// the `error` value from RFC 6749 section 5.2
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant(_) => "invalid_grant",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::Signing(_) => "server_error",
        }
    }
}

/// Stateless issuer for authorization codes, access tokens and refresh tokens.
///
/// Every token is an HS256 JWT carrying its own subject, scope, type and
/// expiry, so nothing is stored between issuing and redeeming. The flip side
/// is that an authorization code can be redeemed any number of times until
/// it expires: there is no record to mark it as used.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    expires_in: u64,
    clients: Arc<dyn ClientValidator + Send + Sync>,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_required_spec_claims(&["exp", "sub", "iat"]);
        validation.validate_exp = true;
        // a token is dead the second it expires, no grace period
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            expires_in: config.expires_in,
            clients: Arc::new(ClientRegistry::new(config.clients.clone())),
        }
    }

    pub fn create_code(&self, user_id: &str, scope: &str) -> Result<String, OAuthError> {
        let code = self.issue(user_id, scope, TokenKind::AuthorizationCode, CODE_TTL_SECS)?;
        tracing::info!("Generated authorization code for user {}", user_id);
        Ok(code)
    }

    pub fn is_valid_client(&self, client_id: &str) -> bool {
        self.clients.is_valid_client(client_id)
    }

    pub fn is_valid_client_redirect(&self, client_id: &str, redirect_uri: &str) -> bool {
        self.clients.is_valid_redirect(client_id, redirect_uri)
    }

    /// Trade an authorization code for an access + refresh token pair.
    pub fn consume_code(&self, code: &str) -> Result<TokenResponse, OAuthError> {
        let claims = self.verify(code, TokenKind::AuthorizationCode)?;

        let access = self.issue(&claims.sub, &claims.scope, TokenKind::Access, self.access_ttl())?;
        let refresh = self.issue(
            &claims.sub,
            &claims.scope,
            TokenKind::Refresh,
            self.access_ttl().saturating_mul(REFRESH_TTL_FACTOR as i64),
        )?;

        tracing::info!("Consumed authorization code for user {}", claims.sub);

        Ok(TokenResponse {
            access_token: access,
            refresh_token: Some(refresh),
            expires_in: self.expires_in,
            token_type: "Bearer".to_string(),
            scope: claims.scope,
            user_id: claims.sub,
        })
    }

    /// New access token from a refresh token. The refresh token itself is
    /// not rotated and stays valid until its own expiry.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, OAuthError> {
        let claims = self.verify(refresh_token, TokenKind::Refresh)?;
        let access = self.issue(&claims.sub, &claims.scope, TokenKind::Access, self.access_ttl())?;

        tracing::info!("Refreshed token for user {}", claims.sub);

        Ok(TokenResponse {
            access_token: access,
            refresh_token: None,
            expires_in: self.expires_in,
            token_type: "Bearer".to_string(),
            scope: claims.scope,
            user_id: claims.sub,
        })
    }

    /// Check a bearer token presented to the smart home API
    pub fn validate_access(&self, token: &str) -> Result<Claims, OAuthError> {
        self.verify(token, TokenKind::Access)
    }

    fn access_ttl(&self) -> i64 {
        i64::try_from(self.expires_in).unwrap_or(i64::MAX)
    }

    fn issue(
        &self,
        user_id: &str,
        scope: &str,
        kind: TokenKind,
        ttl_secs: i64,
    ) -> Result<String, OAuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            scope: scope.to_string(),
            kind,
            iat: now,
            exp: now.saturating_add(ttl_secs),
            jti: Uuid::new_v4().to_string(),
            iss: ISSUER.to_string(),
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, OAuthError> {
        Ok(encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)?)
    }

    fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, OAuthError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                tracing::warn!("Rejected {} token: {}", expected, e);
                OAuthError::InvalidGrant(e.to_string())
            })?
            .claims;

        if claims.kind != expected {
            tracing::warn!("Invalid token type: expected {}, got {}", expected, claims.kind);
            return Err(OAuthError::InvalidGrant(format!(
                "expected {} token, got {}",
                expected, claims.kind
            )));
        }

        Ok(claims)
    }
}
