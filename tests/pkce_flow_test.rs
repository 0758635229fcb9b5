// ABOUTME: Integration tests for PKCE-protected authorization code flows
// ABOUTME: S256 and plain verification, missing and mismatched verifiers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Credence Authors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use credence::crypto;
use credence::errors::AuthError;
use uuid::Uuid;

// 43 unreserved characters, the RFC 7636 minimum.
const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";

#[tokio::test]
async fn s256_flow_round_trips() {
    let (engine, _) = common::engine();
    let client = common::approved_client(&engine, "read").await;

    let mut request = common::authorize_request(&client.client_id, "read");
    request.code_challenge = Some(crypto::s256_challenge(VERIFIER));
    request.code_challenge_method = Some("S256".to_string());
    let auth = engine.authorize(request, Uuid::new_v4()).await.unwrap();

    let mut token_request = common::code_token_request(&client, &auth.code);
    token_request.code_verifier = Some(VERIFIER.to_string());
    let tokens = engine.token(token_request).await.unwrap();
    assert!(!tokens.access_token.is_empty());
}

#[tokio::test]
async fn challenge_without_method_defaults_to_s256() {
    let (engine, _) = common::engine();
    let client = common::approved_client(&engine, "read").await;

    let mut request = common::authorize_request(&client.client_id, "read");
    request.code_challenge = Some(crypto::s256_challenge(VERIFIER));
    let auth = engine.authorize(request, Uuid::new_v4()).await.unwrap();

    let mut token_request = common::code_token_request(&client, &auth.code);
    token_request.code_verifier = Some(VERIFIER.to_string());
    assert!(engine.token(token_request).await.is_ok());
}

#[tokio::test]
async fn plain_method_compares_verbatim() {
    let (engine, _) = common::engine();
    let client = common::approved_client(&engine, "read").await;

    let mut request = common::authorize_request(&client.client_id, "read");
    request.code_challenge = Some(VERIFIER.to_string());
    request.code_challenge_method = Some("plain".to_string());
    let auth = engine.authorize(request, Uuid::new_v4()).await.unwrap();

    let mut token_request = common::code_token_request(&client, &auth.code);
    token_request.code_verifier = Some(VERIFIER.to_string());
    assert!(engine.token(token_request).await.is_ok());
}

#[tokio::test]
async fn wrong_verifier_burns_the_code() {
    let (engine, _) = common::engine();
    let client = common::approved_client(&engine, "read").await;

    let mut request = common::authorize_request(&client.client_id, "read");
    request.code_challenge = Some(crypto::s256_challenge(VERIFIER));
    request.code_challenge_method = Some("S256".to_string());
    let auth = engine.authorize(request, Uuid::new_v4()).await.unwrap();

    let mut bad = common::code_token_request(&client, &auth.code);
    bad.code_verifier = Some("wrong-verifier-wrong-verifier-wrong-verifier-00".to_string());
    let err = engine.token(bad).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant(_)));

    // The code was consumed by the failed attempt; the correct verifier
    // cannot resurrect it.
    let mut retry = common::code_token_request(&client, &auth.code);
    retry.code_verifier = Some(VERIFIER.to_string());
    let err = engine.token(retry).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant(_)));
}

#[tokio::test]
async fn missing_verifier_fails_when_challenge_was_issued() {
    let (engine, _) = common::engine();
    let client = common::approved_client(&engine, "read").await;

    let mut request = common::authorize_request(&client.client_id, "read");
    request.code_challenge = Some(crypto::s256_challenge(VERIFIER));
    request.code_challenge_method = Some("S256".to_string());
    let auth = engine.authorize(request, Uuid::new_v4()).await.unwrap();

    let err = engine
        .token(common::code_token_request(&client, &auth.code))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant(_)));
}

#[tokio::test]
async fn unsolicited_verifier_fails() {
    let (engine, _) = common::engine();
    let client = common::approved_client(&engine, "read").await;

    let auth = engine
        .authorize(common::authorize_request(&client.client_id, "read"), Uuid::new_v4())
        .await
        .unwrap();

    let mut token_request = common::code_token_request(&client, &auth.code);
    token_request.code_verifier = Some(VERIFIER.to_string());
    let err = engine.token(token_request).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant(_)));
}

#[tokio::test]
async fn malformed_pkce_parameters_are_rejected_at_authorize() {
    let (engine, _) = common::engine();
    let client = common::approved_client(&engine, "read").await;

    // Unknown method.
    let mut request = common::authorize_request(&client.client_id, "read");
    request.code_challenge = Some(crypto::s256_challenge(VERIFIER));
    request.code_challenge_method = Some("S512".to_string());
    let err = engine.authorize(request, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, AuthError::Validation(_)));

    // Method without a challenge.
    let mut request = common::authorize_request(&client.client_id, "read");
    request.code_challenge_method = Some("S256".to_string());
    let err = engine.authorize(request, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, AuthError::Validation(_)));

    // Challenge too short.
    let mut request = common::authorize_request(&client.client_id, "read");
    request.code_challenge = Some("short".to_string());
    let err = engine.authorize(request, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, AuthError::Validation(_)));
}
