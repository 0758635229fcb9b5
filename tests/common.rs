// ABOUTME: Shared helpers for integration tests
// ABOUTME: Engine construction, client registration, and full-grant shortcuts
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Credence Authors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs, dead_code)]

use credence::config::AuthConfig;
use credence::grant::GrantEngine;
use credence::models::{
    AuthorizeRequest, ClientRegistrationRequest, RegisteredClient, TokenRequest, TokenResponse,
};
use credence::store::MemoryStore;
use std::sync::Arc;
use uuid::Uuid;

pub const REDIRECT_URI: &str = "https://app.example.com/callback";

/// Fresh engine over a shared in-memory store. The store handle allows
/// tests to plant records directly (expired tokens, stale codes).
pub fn engine() -> (GrantEngine<MemoryStore>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let engine = GrantEngine::new(Arc::clone(&store), AuthConfig::default());
    (engine, store)
}

/// Register a client allowed `scope` and approve it.
pub async fn approved_client(
    engine: &GrantEngine<MemoryStore>,
    scope: &str,
) -> RegisteredClient {
    let registered = engine
        .registry()
        .register(ClientRegistrationRequest {
            redirect_uris: vec![REDIRECT_URI.to_string()],
            scope: scope.to_string(),
            client_name: Some("Test App".to_string()),
            client_uri: Some("https://app.example.com".to_string()),
            developer_id: Uuid::new_v4(),
        })
        .await
        .unwrap();
    engine.registry().approve(&registered.client_id).await.unwrap();
    registered
}

pub fn authorize_request(client_id: &str, scope: &str) -> AuthorizeRequest {
    AuthorizeRequest {
        response_type: "code".to_string(),
        client_id: client_id.to_string(),
        redirect_uri: REDIRECT_URI.to_string(),
        scope: Some(scope.to_string()),
        state: None,
        code_challenge: None,
        code_challenge_method: None,
    }
}

pub fn code_token_request(client: &RegisteredClient, code: &str) -> TokenRequest {
    TokenRequest {
        grant_type: "authorization_code".to_string(),
        client_id: client.client_id.clone(),
        client_secret: client.client_secret.clone(),
        code: Some(code.to_string()),
        redirect_uri: Some(REDIRECT_URI.to_string()),
        code_verifier: None,
        refresh_token: None,
    }
}

pub fn refresh_token_request(client: &RegisteredClient, refresh_token: &str) -> TokenRequest {
    TokenRequest {
        grant_type: "refresh_token".to_string(),
        client_id: client.client_id.clone(),
        client_secret: client.client_secret.clone(),
        code: None,
        redirect_uri: None,
        code_verifier: None,
        refresh_token: Some(refresh_token.to_string()),
    }
}

/// Run the whole authorization-code grant for a user and return the
/// token pair.
pub async fn full_grant(
    engine: &GrantEngine<MemoryStore>,
    client: &RegisteredClient,
    user_id: Uuid,
    scope: &str,
) -> TokenResponse {
    let auth = engine
        .authorize(authorize_request(&client.client_id, scope), user_id)
        .await
        .unwrap();
    engine
        .token(code_token_request(client, &auth.code))
        .await
        .unwrap()
}
