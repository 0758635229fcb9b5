// ABOUTME: Opaque access and refresh token minting plus read-only validation
// ABOUTME: Validation never mutates state; it is the hot path for resource servers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Credence Authors

use crate::config::AuthConfig;
use crate::crypto;
use crate::errors::{AuthError, AuthResult, TokenInvalidReason};
use crate::models::{AccessToken, RefreshToken, ScopeSet};
use crate::store::AuthStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Entropy for token values: 32 bytes, 256 bits.
const TOKEN_BYTES: usize = 32;

/// What a valid access token is bound to.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub user_id: Uuid,
    pub client_id: String,
    pub scope: ScopeSet,
    pub expires_at: DateTime<Utc>,
}

/// Mints opaque access/refresh tokens and validates access tokens.
pub struct TokenIssuer<S> {
    store: Arc<S>,
    config: Arc<AuthConfig>,
}

impl<S> Clone for TokenIssuer<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S: AuthStore> TokenIssuer<S> {
    #[must_use]
    pub fn new(store: Arc<S>, config: Arc<AuthConfig>) -> Self {
        Self { store, config }
    }

    /// Mint and store an access token for a (user, client, scope)
    /// grant.
    pub async fn issue_access_token(
        &self,
        user_id: Uuid,
        client_id: &str,
        scope: ScopeSet,
    ) -> AuthResult<AccessToken> {
        let now = Utc::now();
        let token = AccessToken {
            token: crypto::generate_opaque_value(TOKEN_BYTES)?,
            user_id,
            client_id: client_id.to_string(),
            scope,
            created_at: now,
            expires_at: now + self.config.access_token_ttl,
            revoked_at: None,
        };
        self.store.store_access_token(&token).await?;
        debug!(client_id = %client_id, user_id = %user_id, "issued access token");
        Ok(token)
    }

    /// Mint and store the refresh token paired 1:1 with `access_token`,
    /// carrying the same (user, client, scope) binding with the longer
    /// TTL.
    pub async fn issue_refresh_token(&self, access_token: &AccessToken) -> AuthResult<RefreshToken> {
        let now = Utc::now();
        let token = RefreshToken {
            token: crypto::generate_opaque_value(TOKEN_BYTES)?,
            access_token: access_token.token.clone(),
            user_id: access_token.user_id,
            client_id: access_token.client_id.clone(),
            scope: access_token.scope.clone(),
            created_at: now,
            expires_at: now + self.config.refresh_token_ttl,
            revoked_at: None,
            superseded_by: None,
        };
        self.store.store_refresh_token(&token).await?;
        Ok(token)
    }

    /// Mint a refresh token record for a pre-generated value. Rotation
    /// needs the successor value before the successor record exists, so
    /// the value is generated first, CAS'd into the old token's link,
    /// and only then materialized here.
    pub async fn issue_refresh_token_with_value(
        &self,
        value: String,
        access_token: &AccessToken,
    ) -> AuthResult<RefreshToken> {
        let now = Utc::now();
        let token = RefreshToken {
            token: value,
            access_token: access_token.token.clone(),
            user_id: access_token.user_id,
            client_id: access_token.client_id.clone(),
            scope: access_token.scope.clone(),
            created_at: now,
            expires_at: now + self.config.refresh_token_ttl,
            revoked_at: None,
            superseded_by: None,
        };
        self.store.store_refresh_token(&token).await?;
        Ok(token)
    }

    /// Validate an access token.
    ///
    /// Read-only by contract: resource servers call this at high
    /// frequency and the check must never block on or contend with
    /// writers. Expiry is a wall-clock comparison at read time.
    ///
    /// # Errors
    /// `InvalidToken` with the reason: `unknown`, `revoked`, or
    /// `expired`, in that order of precedence.
    pub async fn validate(&self, token: &str) -> AuthResult<TokenInfo> {
        let Some(record) = self.store.get_access_token(token).await? else {
            return Err(AuthError::InvalidToken {
                reason: TokenInvalidReason::Unknown,
            });
        };
        if record.revoked_at.is_some() {
            return Err(AuthError::InvalidToken {
                reason: TokenInvalidReason::Revoked,
            });
        }
        if record.expires_at <= Utc::now() {
            return Err(AuthError::InvalidToken {
                reason: TokenInvalidReason::Expired,
            });
        }
        Ok(TokenInfo {
            user_id: record.user_id,
            client_id: record.client_id,
            scope: record.scope,
            expires_at: record.expires_at,
        })
    }
}
