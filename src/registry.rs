// ABOUTME: Client registration and authentication for the grant engine
// ABOUTME: Redirect-URI and scope validation, argon2id secret verification, status transitions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Credence Authors

use crate::config::AuthConfig;
use crate::crypto;
use crate::errors::{AuthError, AuthResult};
use crate::models::{
    Client, ClientRegistrationRequest, ClientStatus, RegisteredClient, ScopeSet,
};
use crate::store::AuthStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Registry of client applications: who they are, where they may be
/// redirected, and which scopes they may request.
pub struct ClientRegistry<S> {
    store: Arc<S>,
    config: Arc<AuthConfig>,
}

impl<S> Clone for ClientRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S: AuthStore> ClientRegistry<S> {
    #[must_use]
    pub fn new(store: Arc<S>, config: Arc<AuthConfig>) -> Self {
        Self { store, config }
    }

    /// Register a new client application.
    ///
    /// New clients start in `pending` status and cannot be used for
    /// grants until approved. The plaintext secret is returned exactly
    /// once; only its argon2id hash is stored.
    ///
    /// # Errors
    /// `Validation` when a redirect URI is not an acceptable absolute
    /// URI or a requested scope is outside the configured vocabulary.
    pub async fn register(
        &self,
        request: ClientRegistrationRequest,
    ) -> AuthResult<RegisteredClient> {
        if request.redirect_uris.is_empty() {
            return Err(AuthError::validation("at least one redirect_uri is required"));
        }
        for uri in &request.redirect_uris {
            if !is_acceptable_redirect_uri(uri) {
                return Err(AuthError::validation(format!("invalid redirect_uri: {uri}")));
            }
        }

        let allowed_scopes = ScopeSet::parse(&request.scope);
        if allowed_scopes.is_empty() {
            return Err(AuthError::validation("at least one scope is required"));
        }
        let unrecognized = allowed_scopes.difference(&self.config.scope_vocabulary);
        if !unrecognized.is_empty() {
            return Err(AuthError::validation(format!(
                "unrecognized scopes: {unrecognized}"
            )));
        }

        let client_id = format!("cl_{}", Uuid::new_v4().simple());
        let client_secret = crypto::generate_client_secret()?;
        let client_secret_hash = crypto::hash_client_secret(&client_secret)?;

        let client = Client {
            client_id: client_id.clone(),
            client_secret_hash,
            client_name: request.client_name,
            client_uri: request.client_uri,
            redirect_uris: request.redirect_uris.clone(),
            allowed_scopes: allowed_scopes.clone(),
            status: ClientStatus::Pending,
            developer_id: request.developer_id,
            created_at: Utc::now(),
        };
        self.store.store_client(&client).await?;

        info!(
            client_id = %client_id,
            developer_id = %request.developer_id,
            scopes = %allowed_scopes,
            "registered new client (pending approval)"
        );

        Ok(RegisteredClient {
            client_id,
            client_secret,
            status: ClientStatus::Pending,
            redirect_uris: request.redirect_uris,
            scope: allowed_scopes,
        })
    }

    /// Authenticate a client by id and secret.
    ///
    /// The raw secret is never logged or returned. Status is not
    /// checked here: callers that issue grants enforce `approved`
    /// separately, while revocation is allowed for any authenticated
    /// client.
    ///
    /// # Errors
    /// `InvalidClient` for an unknown id or a failed secret check.
    pub async fn authenticate(&self, client_id: &str, client_secret: &str) -> AuthResult<Client> {
        let Some(client) = self.store.get_client(client_id).await? else {
            warn!(client_id = %client_id, "authentication failed: unknown client");
            return Err(AuthError::InvalidClient);
        };
        if !crypto::verify_client_secret(client_secret, &client.client_secret_hash) {
            warn!(client_id = %client_id, "authentication failed: secret mismatch");
            return Err(AuthError::InvalidClient);
        }
        Ok(client)
    }

    /// Look up a client by id.
    pub async fn get(&self, client_id: &str) -> AuthResult<Option<Client>> {
        Ok(self.store.get_client(client_id).await?)
    }

    /// Exact string match against the registered URIs. No wildcard or
    /// subdomain matching: anything looser invites open-redirect abuse.
    #[must_use]
    pub fn validate_redirect(client: &Client, uri: &str) -> bool {
        client.redirect_uris.iter().any(|registered| registered == uri)
    }

    /// Check `requested ⊆ allowed` and return the granted set.
    ///
    /// # Errors
    /// `InvalidScope` naming the offending scopes when the request
    /// exceeds the client's allowance; there is no silent downgrade.
    pub fn validate_scopes(client: &Client, requested: &ScopeSet) -> AuthResult<ScopeSet> {
        let excess = requested.difference(&client.allowed_scopes);
        if excess.is_empty() {
            Ok(requested.clone())
        } else {
            Err(AuthError::InvalidScope(format!(
                "client {} is not allowed: {excess}",
                client.client_id
            )))
        }
    }

    /// Move a pending client to `approved`.
    ///
    /// # Errors
    /// `InvalidClient` when no such client exists.
    pub async fn approve(&self, client_id: &str) -> AuthResult<()> {
        if !self
            .store
            .update_client_status(client_id, ClientStatus::Approved)
            .await?
        {
            return Err(AuthError::InvalidClient);
        }
        info!(client_id = %client_id, "client approved");
        Ok(())
    }

    /// Mark a client `suspended`. Status change only; the engine runs
    /// the revocation cascade alongside this.
    ///
    /// # Errors
    /// `InvalidClient` when no such client exists.
    pub async fn suspend(&self, client_id: &str) -> AuthResult<()> {
        if !self
            .store
            .update_client_status(client_id, ClientStatus::Suspended)
            .await?
        {
            return Err(AuthError::InvalidClient);
        }
        warn!(client_id = %client_id, "client suspended");
        Ok(())
    }
}

/// Redirect URI rules: absolute URI, no fragment, no wildcard, https
/// except for localhost/loopback.
fn is_acceptable_redirect_uri(uri: &str) -> bool {
    if uri.trim().is_empty() || uri.contains('#') || uri.contains('*') {
        return false;
    }
    let Ok(parsed) = url::Url::parse(uri) else {
        return false;
    };
    let is_loopback = matches!(parsed.host_str(), Some("localhost" | "127.0.0.1"));
    match parsed.scheme() {
        "https" => true,
        "http" => is_loopback,
        _ => false,
    }
}
