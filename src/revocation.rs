// ABOUTME: Revocation of tokens, rotation chains, clients, and standing grants
// ABOUTME: Cascades are explicit traversals over ownership references, all idempotent
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Credence Authors

use crate::errors::AuthResult;
use crate::store::AuthStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Revokes credentials and walks ownership edges for cascades.
///
/// Every operation here is idempotent: revoking something already
/// revoked succeeds and leaves the original revocation timestamp.
pub struct RevocationService<S> {
    store: Arc<S>,
}

impl<S> Clone for RevocationService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: AuthStore> RevocationService<S> {
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Revoke an access token by value. Returns whether the token
    /// existed.
    pub async fn revoke_access_token(&self, token: &str) -> AuthResult<bool> {
        Ok(self.store.revoke_access_token(token, Utc::now()).await?)
    }

    /// Revoke a refresh token and the access token it was issued with;
    /// the pair is one credential. Returns whether the refresh token
    /// existed.
    pub async fn revoke_refresh_token(&self, token: &str) -> AuthResult<bool> {
        let now = Utc::now();
        let Some(record) = self.store.get_refresh_token(token).await? else {
            return Ok(false);
        };
        self.store.revoke_refresh_token(token, now).await?;
        self.store
            .revoke_access_token(&record.access_token, now)
            .await?;
        Ok(true)
    }

    /// Revoke every token in the rotation chain containing
    /// `refresh_token`: walk the successor links forward and the
    /// predecessor links backward, revoking each refresh token and its
    /// paired access token. The chain is forward-only by construction,
    /// so both walks terminate.
    ///
    /// Returns the number of refresh tokens revoked.
    pub async fn revoke_chain(&self, refresh_token: &str) -> AuthResult<u64> {
        let mut revoked = 0;

        // Forward walk, starting from the given token.
        let mut cursor = Some(refresh_token.to_string());
        while let Some(value) = cursor {
            let Some(record) = self.store.get_refresh_token(&value).await? else {
                break;
            };
            self.revoke_refresh_token(&value).await?;
            revoked += 1;
            cursor = record.superseded_by;
        }

        // Backward walk over predecessor links.
        let mut cursor = self.store.find_refresh_predecessor(refresh_token).await?;
        while let Some(record) = cursor {
            self.revoke_refresh_token(&record.token).await?;
            revoked += 1;
            cursor = self.store.find_refresh_predecessor(&record.token).await?;
        }

        warn!(revoked, "revoked refresh token rotation chain");
        Ok(revoked)
    }

    /// Cascade revocation to everything a client owns: outstanding
    /// authorization codes, access and refresh tokens, and standing
    /// user authorizations. Used when a client is suspended.
    pub async fn revoke_client(&self, client_id: &str) -> AuthResult<()> {
        let now = Utc::now();

        let codes = self.store.invalidate_codes_for_client(client_id).await?;

        let mut access = 0;
        for token in self.store.access_tokens_for_client(client_id).await? {
            self.store.revoke_access_token(&token.token, now).await?;
            access += 1;
        }

        let mut refresh = 0;
        for token in self.store.refresh_tokens_for_client(client_id).await? {
            self.store.revoke_refresh_token(&token.token, now).await?;
            refresh += 1;
        }

        let mut grants = 0;
        for grant in self.store.user_authorizations_for_client(client_id).await? {
            self.store
                .revoke_user_authorization(grant.user_id, client_id, now)
                .await?;
            grants += 1;
        }

        info!(
            client_id = %client_id,
            codes, access, refresh, grants,
            "revoked everything owned by client"
        );
        Ok(())
    }

    /// Revoke a user's standing grant to a client and every currently
    /// valid token issued under it.
    pub async fn revoke_user_authorization(
        &self,
        user_id: Uuid,
        client_id: &str,
    ) -> AuthResult<()> {
        let now = Utc::now();
        self.store
            .revoke_user_authorization(user_id, client_id, now)
            .await?;

        for token in self
            .store
            .access_tokens_for_grant(user_id, client_id)
            .await?
        {
            self.store.revoke_access_token(&token.token, now).await?;
        }
        for token in self
            .store
            .refresh_tokens_for_grant(user_id, client_id)
            .await?
        {
            self.store.revoke_refresh_token(&token.token, now).await?;
        }

        debug!(
            user_id = %user_id,
            client_id = %client_id,
            "revoked standing authorization and its tokens"
        );
        Ok(())
    }
}
