mod authorization_code;
mod clients;
mod handlers;
mod middleware;
mod token;
mod traits;

pub use authorization_code::{authorize_handler, login_handler};
pub use handlers::{OAuthAppState, oauth_token_handler};
pub use middleware::{AuthenticatedUser, bearer_auth_middleware};
pub use token::TokenIssuer;
pub use traits::TokenResponse;

use std::str::FromStr;

/// Configuration for the authentication system
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// access token lifetime in seconds
    pub expires_in: u64,
    pub clients: Vec<ClientConfig>,
}

/// one registered OAuth client, written as `client_id=uri1,uri2`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub client_id: String,
    pub redirect_uris: Vec<String>,
}

impl FromStr for ClientConfig {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (client_id, uris) = s
            .split_once('=')
            .ok_or_else(|| format!("expected client_id=redirect_uri[,redirect_uri...], got '{s}'"))?;

        let client_id = client_id.trim();
        if client_id.is_empty() {
            return Err("client_id cannot be empty".to_string());
        }

        let redirect_uris = uris
            .split(',')
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(|u| {
                url::Url::parse(u)
                    .map(|_| u.to_string())
                    .map_err(|e| format!("invalid redirect_uri '{u}': {e}"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if redirect_uris.is_empty() {
            return Err(format!("client '{client_id}' needs at least one redirect_uri"));
        }

        Ok(Self {
            client_id: client_id.to_string(),
            redirect_uris,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_client_config() {
        let client: ClientConfig =
            "yandex=https://social.yandex.net/broker/redirect, https://social.yandex.ru/broker/redirect"
                .parse()
                .unwrap();
        assert_eq!(client.client_id, "yandex");
        assert_eq!(
            client.redirect_uris,
            vec![
                "https://social.yandex.net/broker/redirect",
                "https://social.yandex.ru/broker/redirect"
            ]
        );
    }

    #[test]
    fn test_parse_client_config_errors() {
        assert!("no-equals-sign".parse::<ClientConfig>().is_err());
        assert!("=https://x.example/".parse::<ClientConfig>().is_err());
        assert!("yandex=".parse::<ClientConfig>().is_err());
        assert!("yandex=not a url".parse::<ClientConfig>().is_err());
    }
}
