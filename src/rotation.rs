// ABOUTME: Refresh-token rotation ledger with reuse detection
// ABOUTME: Successor-link CAS makes a stolen-then-replayed token detectable exactly once
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Credence Authors

use crate::crypto;
use crate::errors::{AuthError, AuthResult};
use crate::models::{AccessToken, Client, RefreshToken};
use crate::revocation::RevocationService;
use crate::store::{AuthStore, RefreshClaim};
use crate::tokens::TokenIssuer;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Entropy for refresh token values: 32 bytes, 256 bits.
const TOKEN_BYTES: usize = 32;

/// Tracks rotation chains and turns replay of a superseded token into
/// chain-wide invalidation.
///
/// Every refresh both advances and narrows the validity window: the old
/// token is revoked with its successor link set in one conditional
/// update, so a stolen token that is replayed later is detectable
/// exactly once, and that detection burns the whole chain.
pub struct RotationLedger<S> {
    store: Arc<S>,
    tokens: TokenIssuer<S>,
    revocation: RevocationService<S>,
}

impl<S> Clone for RotationLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            tokens: self.tokens.clone(),
            revocation: self.revocation.clone(),
        }
    }
}

impl<S: AuthStore> RotationLedger<S> {
    #[must_use]
    pub fn new(store: Arc<S>, tokens: TokenIssuer<S>, revocation: RevocationService<S>) -> Self {
        Self {
            store,
            tokens,
            revocation,
        }
    }

    /// Rotate a refresh token into a new access/refresh pair.
    ///
    /// The successor value is generated before the claim so that the
    /// CAS can record it: "set successor only if currently null" is the
    /// entire race story, and a caller that loses the race observes the
    /// already-rotated state.
    ///
    /// # Errors
    /// - `InvalidGrant` when the token is unknown, expired, explicitly
    ///   revoked, or owned by another client.
    /// - `ReuseDetected` when the token was already rotated. Before the
    ///   error returns, the whole rotation chain and the standing user
    ///   authorization are revoked.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        client: &Client,
    ) -> AuthResult<(AccessToken, RefreshToken)> {
        let successor_value = crypto::generate_opaque_value(TOKEN_BYTES)?;

        let claim = self
            .store
            .claim_refresh_token(refresh_token, &client.client_id, &successor_value, Utc::now())
            .await?;

        let old = match claim {
            RefreshClaim::Claimed(old) => old,
            RefreshClaim::AlreadyRotated(old) => {
                warn!(
                    client_id = %client.client_id,
                    user_id = %old.user_id,
                    "superseded refresh token replayed; revoking rotation chain and standing grant"
                );
                self.revocation.revoke_chain(&old.token).await?;
                self.revocation
                    .revoke_user_authorization(old.user_id, &old.client_id)
                    .await?;
                return Err(AuthError::ReuseDetected);
            }
            RefreshClaim::Missing => {
                warn!(
                    client_id = %client.client_id,
                    "refresh rejected: token unknown, expired, revoked, or not owned by client"
                );
                return Err(AuthError::invalid_grant(
                    "invalid or expired refresh token",
                ));
            }
        };

        let access = self
            .tokens
            .issue_access_token(old.user_id, &old.client_id, old.scope.clone())
            .await?;
        let refresh = self
            .tokens
            .issue_refresh_token_with_value(successor_value, &access)
            .await?;

        // Refresh exercises the standing grant; keep its timestamp live.
        self.store
            .touch_user_authorization(old.user_id, &old.client_id, Utc::now())
            .await?;

        info!(
            client_id = %client.client_id,
            user_id = %old.user_id,
            "rotated refresh token"
        );
        Ok((access, refresh))
    }
}
