use serde::{Deserialize, Serialize};
use std::fmt;

/// what a signed token is allowed to be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    AuthorizationCode,
    Access,
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthorizationCode => f.write_str("authorization_code"),
            Self::Access => f.write_str("access"),
            Self::Refresh => f.write_str("refresh"),
        }
    }
}

/// Claims carried by every token we hand out (codes included)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject (user id)
    pub scope: String,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub iat: i64, // Issued at
    pub exp: i64, // Expiration time
    pub jti: String,
    pub iss: String,
}

/// Lookup of configured OAuth clients. Both checks are permissive when
/// nothing is configured so a fresh install can be linked without setup.
pub trait ClientValidator {
    fn is_valid_client(&self, client_id: &str) -> bool;
    fn is_valid_redirect(&self, client_id: &str, redirect_uri: &str) -> bool;
}

/// Successful response body for POST /oauth/token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_in: u64, // seconds
    pub token_type: String,
    pub scope: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
}

impl GrantType {
    /// unknown grant types have to reach the handler so we can answer
    /// `unsupported_grant_type` instead of a form rejection
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "authorization_code" => Some(Self::AuthorizationCode),
            "refresh_token" => Some(Self::RefreshToken),
            _ => None,
        }
    }
}
