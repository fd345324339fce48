use super::ClientConfig;
use super::traits::ClientValidator;
use std::collections::HashMap;

/// Static registry of OAuth clients and their allowed redirect URIs.
/// Loaded once from config, never changes at runtime.
pub struct ClientRegistry {
    /// map of client_id -> allowed redirect URIs
    clients: HashMap<String, Vec<String>>,
}

impl ClientRegistry {
    pub fn new(clients: Vec<ClientConfig>) -> Self {
        let clients = clients
            .into_iter()
            .map(|c| (c.client_id, c.redirect_uris))
            .collect::<HashMap<_, _>>();

        if clients.is_empty() {
            // no clients configured means anyone can link. handy for first setup,
            // less handy if this thing is exposed to the internet
            tracing::warn!("No OAuth clients configured, accepting any client_id and redirect_uri");
        }

        Self { clients }
    }

    fn permissive(&self) -> bool {
        self.clients.is_empty()
    }
}

impl ClientValidator for ClientRegistry {
    fn is_valid_client(&self, client_id: &str) -> bool {
        if self.permissive() {
            return true;
        }
        let known = self.clients.contains_key(client_id);
        if !known {
            tracing::warn!("Unknown client_id: {}", client_id);
        }
        known
    }

    fn is_valid_redirect(&self, client_id: &str, redirect_uri: &str) -> bool {
        if self.permissive() {
            return true;
        }
        let ok = self
            .clients
            .get(client_id)
            .is_some_and(|uris| uris.iter().any(|uri| uri == redirect_uri));
        if !ok {
            tracing::warn!(
                "redirect_uri '{}' is not registered for client '{}'",
                redirect_uri,
                client_id
            );
        }
        ok
    }
}
