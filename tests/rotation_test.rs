// ABOUTME: Integration tests for refresh token rotation and reuse detection
// ABOUTME: Chain revocation, standing grant invalidation, and race behavior
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Credence Authors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use chrono::{Duration, Utc};
use credence::errors::{AuthError, TokenInvalidReason};
use credence::models::{RefreshToken, ScopeSet};
use credence::store::AuthStore;
use uuid::Uuid;

// ============================================================================
// Rotation
// ============================================================================

#[tokio::test]
async fn refresh_replaces_the_token_pair() {
    let (engine, _) = common::engine();
    let client = common::approved_client(&engine, "read").await;
    let user = Uuid::new_v4();

    let first = common::full_grant(&engine, &client, user, "read").await;
    let second = engine
        .token(common::refresh_token_request(&client, &first.refresh_token))
        .await
        .unwrap();

    assert_ne!(second.refresh_token, first.refresh_token);
    assert_ne!(second.access_token, first.access_token);
    assert_eq!(second.scope.to_string(), "read");

    // The new access token validates; the old refresh token is spent.
    let info = engine.introspect(&second.access_token).await.unwrap();
    assert!(info.active);
    assert_eq!(info.user_id, Some(user));

    let err = engine
        .token(common::refresh_token_request(&client, &first.refresh_token))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ReuseDetected));
}

#[tokio::test]
async fn rotation_preserves_scope_across_generations() {
    let (engine, _) = common::engine();
    let client = common::approved_client(&engine, "read write").await;
    let user = Uuid::new_v4();

    let mut tokens = common::full_grant(&engine, &client, user, "read write").await;
    for _ in 0..3 {
        tokens = engine
            .token(common::refresh_token_request(&client, &tokens.refresh_token))
            .await
            .unwrap();
        assert_eq!(tokens.scope.to_string(), "read write");
    }
}

// ============================================================================
// Reuse detection
// ============================================================================

#[tokio::test]
async fn replaying_a_rotated_token_burns_the_whole_chain() {
    let (engine, _) = common::engine();
    let client = common::approved_client(&engine, "read").await;
    let user = Uuid::new_v4();

    let gen1 = common::full_grant(&engine, &client, user, "read").await;
    let gen2 = engine
        .token(common::refresh_token_request(&client, &gen1.refresh_token))
        .await
        .unwrap();
    let gen3 = engine
        .token(common::refresh_token_request(&client, &gen2.refresh_token))
        .await
        .unwrap();

    // Replay of generation 1 is the theft signal.
    let err = engine
        .token(common::refresh_token_request(&client, &gen1.refresh_token))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ReuseDetected));
    assert_eq!(err.oauth_code(), "invalid_grant");

    // The newest (legitimate) refresh token died with the chain.
    let err = engine
        .token(common::refresh_token_request(&client, &gen3.refresh_token))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant(_)));

    // So did the newest access token.
    let info = engine.introspect(&gen3.access_token).await.unwrap();
    assert!(!info.active);
    assert_eq!(info.reason, Some(TokenInvalidReason::Revoked));

    // And the standing grant: the user must consent again.
    let covered = engine
        .has_standing_grant(user, &client.client_id, &ScopeSet::parse("read"))
        .await
        .unwrap();
    assert!(!covered);
}

#[tokio::test]
async fn explicitly_revoked_token_is_not_reported_as_reuse() {
    let (engine, _) = common::engine();
    let client = common::approved_client(&engine, "read").await;

    let tokens = common::full_grant(&engine, &client, Uuid::new_v4(), "read").await;
    engine
        .revocation()
        .revoke_refresh_token(&tokens.refresh_token)
        .await
        .unwrap();

    let err = engine
        .token(common::refresh_token_request(&client, &tokens.refresh_token))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant(_)));
}

#[tokio::test]
async fn expired_superseded_token_is_invalid_grant_not_reuse() {
    let (engine, store) = common::engine();
    let client = common::approved_client(&engine, "read").await;
    let now = Utc::now();

    // A token that was rotated long ago and has since expired.
    store
        .store_refresh_token(&RefreshToken {
            token: "ancient-refresh".to_string(),
            access_token: "ancient-access".to_string(),
            user_id: Uuid::new_v4(),
            client_id: client.client_id.clone(),
            scope: ScopeSet::parse("read"),
            created_at: now - Duration::days(60),
            expires_at: now - Duration::days(30),
            revoked_at: Some(now - Duration::days(59)),
            superseded_by: Some("long-gone-successor".to_string()),
        })
        .await
        .unwrap();

    let err = engine
        .token(common::refresh_token_request(&client, "ancient-refresh"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant(_)));
}

// ============================================================================
// Ownership and races
// ============================================================================

#[tokio::test]
async fn refresh_token_is_bound_to_the_issuing_client() {
    let (engine, _) = common::engine();
    let client = common::approved_client(&engine, "read").await;
    let other = common::approved_client(&engine, "read").await;

    let tokens = common::full_grant(&engine, &client, Uuid::new_v4(), "read").await;
    let err = engine
        .token(common::refresh_token_request(&other, &tokens.refresh_token))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant(_)));
}

#[tokio::test]
async fn concurrent_refresh_has_exactly_one_winner() {
    let (engine, _) = common::engine();
    let client = common::approved_client(&engine, "read").await;

    let tokens = common::full_grant(&engine, &client, Uuid::new_v4(), "read").await;
    let request = common::refresh_token_request(&client, &tokens.refresh_token);

    let (a, b) = tokio::join!(engine.token(request.clone()), engine.token(request.clone()));
    let successes = usize::from(a.is_ok()) + usize::from(b.is_ok());
    assert_eq!(successes, 1, "exactly one concurrent refresh must win");
}
