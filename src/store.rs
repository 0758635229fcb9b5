// ABOUTME: Storage seam for the engine: async trait plus in-memory arena implementation
// ABOUTME: All consuming operations are single conditional state transitions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Credence Authors

use crate::errors::StoreError;
use crate::models::{
    AccessToken, AuthorizationCode, Client, ClientStatus, RefreshToken, UserAuthorization,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

/// Outcome of the successor-CAS on a refresh token.
#[derive(Debug)]
pub enum RefreshClaim {
    /// The token was live and is now rotated: revoked with its successor
    /// link set, in one conditional update. Carries the claimed record.
    Claimed(RefreshToken),
    /// The successor link was already set: this token was rotated before,
    /// and presenting it again is reuse.
    AlreadyRotated(RefreshToken),
    /// Unknown, expired, explicitly revoked, or owned by another client.
    Missing,
}

/// Counters from an expiry sweep.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepStats {
    pub codes_removed: u64,
    pub access_tokens_removed: u64,
    pub refresh_tokens_removed: u64,
}

impl SweepStats {
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.codes_removed + self.access_tokens_removed + self.refresh_tokens_removed
    }
}

/// Backing store for clients, codes, tokens, and standing grants.
///
/// Records are an arena keyed by opaque values; ownership edges are
/// plain references (client id, user id, token value), so revocation
/// cascades are explicit traversals by the callers of this trait.
///
/// The two consuming operations, `consume_auth_code` and
/// `claim_refresh_token`, must be atomic with respect to concurrent
/// invocations on the same record: under a race exactly one caller
/// observes success. Reads never block writers on other records.
#[async_trait]
pub trait AuthStore: Send + Sync {
    // ── Clients ─────────────────────────────────────────────────────────

    async fn store_client(&self, client: &Client) -> Result<(), StoreError>;

    async fn get_client(&self, client_id: &str) -> Result<Option<Client>, StoreError>;

    /// Returns false when the client does not exist.
    async fn update_client_status(
        &self,
        client_id: &str,
        status: ClientStatus,
    ) -> Result<bool, StoreError>;

    // ── Authorization codes ─────────────────────────────────────────────

    async fn store_auth_code(&self, code: &AuthorizationCode) -> Result<(), StoreError>;

    /// Atomically mark the code used, but only if it is currently unused,
    /// unexpired at `now`, and bound to exactly this client and redirect
    /// URI. Returns the consumed record, or `None` when any condition
    /// fails, including when another caller won the race.
    async fn consume_auth_code(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthorizationCode>, StoreError>;

    /// Mark every outstanding code for a client as used (suspension
    /// cascade). Returns how many were invalidated.
    async fn invalidate_codes_for_client(&self, client_id: &str) -> Result<u64, StoreError>;

    // ── Access tokens ───────────────────────────────────────────────────

    async fn store_access_token(&self, token: &AccessToken) -> Result<(), StoreError>;

    async fn get_access_token(&self, token: &str) -> Result<Option<AccessToken>, StoreError>;

    /// Idempotent: revoking an already-revoked token succeeds and leaves
    /// its original revocation timestamp in place. Returns false only
    /// when no such token exists.
    async fn revoke_access_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn access_tokens_for_client(
        &self,
        client_id: &str,
    ) -> Result<Vec<AccessToken>, StoreError>;

    async fn access_tokens_for_grant(
        &self,
        user_id: Uuid,
        client_id: &str,
    ) -> Result<Vec<AccessToken>, StoreError>;

    // ── Refresh tokens ──────────────────────────────────────────────────

    async fn store_refresh_token(&self, token: &RefreshToken) -> Result<(), StoreError>;

    async fn get_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, StoreError>;

    /// The successor CAS: set the rotation link and revoke the token in
    /// one conditional update, but only if the token is live and owned
    /// by `client_id`. A token whose link is already set comes back as
    /// `AlreadyRotated`; expiry is checked before the link, so replaying
    /// an expired superseded token is `Missing`, not reuse.
    async fn claim_refresh_token(
        &self,
        token: &str,
        client_id: &str,
        successor: &str,
        now: DateTime<Utc>,
    ) -> Result<RefreshClaim, StoreError>;

    /// Idempotent, like `revoke_access_token`.
    async fn revoke_refresh_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// The token whose successor link points at `successor`, if any.
    /// Walking these links backward visits earlier chain members.
    async fn find_refresh_predecessor(
        &self,
        successor: &str,
    ) -> Result<Option<RefreshToken>, StoreError>;

    async fn refresh_tokens_for_client(
        &self,
        client_id: &str,
    ) -> Result<Vec<RefreshToken>, StoreError>;

    async fn refresh_tokens_for_grant(
        &self,
        user_id: Uuid,
        client_id: &str,
    ) -> Result<Vec<RefreshToken>, StoreError>;

    // ── User authorizations ─────────────────────────────────────────────

    async fn upsert_user_authorization(
        &self,
        grant: &UserAuthorization,
    ) -> Result<(), StoreError>;

    async fn get_user_authorization(
        &self,
        user_id: Uuid,
        client_id: &str,
    ) -> Result<Option<UserAuthorization>, StoreError>;

    /// Bump `updated_at`; used when a refresh exercises the standing
    /// grant. Returns false when no grant exists.
    async fn touch_user_authorization(
        &self,
        user_id: Uuid,
        client_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Idempotent revocation of the standing grant itself; token
    /// cascades are the caller's responsibility.
    async fn revoke_user_authorization(
        &self,
        user_id: Uuid,
        client_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn user_authorizations_for_client(
        &self,
        client_id: &str,
    ) -> Result<Vec<UserAuthorization>, StoreError>;

    // ── Maintenance ─────────────────────────────────────────────────────

    /// Delete expired codes and tokens. Purely an optimization: expiry
    /// is enforced by wall-clock comparison at read time, so correctness
    /// never depends on this running.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<SweepStats, StoreError>;
}

/// In-memory store over sharded concurrent maps.
///
/// `DashMap`'s entry API gives exclusive access to one record while it
/// is inspected and mutated, which is exactly the conditional-update
/// granularity the trait requires; contention is scoped to individual
/// code/token records, reads elsewhere proceed untouched.
#[derive(Default)]
pub struct MemoryStore {
    clients: DashMap<String, Client>,
    codes: DashMap<String, AuthorizationCode>,
    access_tokens: DashMap<String, AccessToken>,
    refresh_tokens: DashMap<String, RefreshToken>,
    user_authorizations: DashMap<(Uuid, String), UserAuthorization>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn store_client(&self, client: &Client) -> Result<(), StoreError> {
        self.clients
            .insert(client.client_id.clone(), client.clone());
        Ok(())
    }

    async fn get_client(&self, client_id: &str) -> Result<Option<Client>, StoreError> {
        Ok(self.clients.get(client_id).map(|c| c.clone()))
    }

    async fn update_client_status(
        &self,
        client_id: &str,
        status: ClientStatus,
    ) -> Result<bool, StoreError> {
        match self.clients.get_mut(client_id) {
            Some(mut client) => {
                client.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn store_auth_code(&self, code: &AuthorizationCode) -> Result<(), StoreError> {
        self.codes.insert(code.code.clone(), code.clone());
        Ok(())
    }

    async fn consume_auth_code(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthorizationCode>, StoreError> {
        let Some(mut entry) = self.codes.get_mut(code) else {
            return Ok(None);
        };
        if entry.used
            || entry.expires_at <= now
            || entry.client_id != client_id
            || entry.redirect_uri != redirect_uri
        {
            return Ok(None);
        }
        entry.used = true;
        Ok(Some(entry.clone()))
    }

    async fn invalidate_codes_for_client(&self, client_id: &str) -> Result<u64, StoreError> {
        let mut invalidated = 0;
        for mut entry in self.codes.iter_mut() {
            if entry.client_id == client_id && !entry.used {
                entry.used = true;
                invalidated += 1;
            }
        }
        Ok(invalidated)
    }

    async fn store_access_token(&self, token: &AccessToken) -> Result<(), StoreError> {
        self.access_tokens
            .insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn get_access_token(&self, token: &str) -> Result<Option<AccessToken>, StoreError> {
        Ok(self.access_tokens.get(token).map(|t| t.clone()))
    }

    async fn revoke_access_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        match self.access_tokens.get_mut(token) {
            Some(mut entry) => {
                if entry.revoked_at.is_none() {
                    entry.revoked_at = Some(now);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn access_tokens_for_client(
        &self,
        client_id: &str,
    ) -> Result<Vec<AccessToken>, StoreError> {
        Ok(self
            .access_tokens
            .iter()
            .filter(|t| t.client_id == client_id)
            .map(|t| t.clone())
            .collect())
    }

    async fn access_tokens_for_grant(
        &self,
        user_id: Uuid,
        client_id: &str,
    ) -> Result<Vec<AccessToken>, StoreError> {
        Ok(self
            .access_tokens
            .iter()
            .filter(|t| t.user_id == user_id && t.client_id == client_id)
            .map(|t| t.clone())
            .collect())
    }

    async fn store_refresh_token(&self, token: &RefreshToken) -> Result<(), StoreError> {
        self.refresh_tokens
            .insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn get_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, StoreError> {
        Ok(self.refresh_tokens.get(token).map(|t| t.clone()))
    }

    async fn claim_refresh_token(
        &self,
        token: &str,
        client_id: &str,
        successor: &str,
        now: DateTime<Utc>,
    ) -> Result<RefreshClaim, StoreError> {
        let Some(mut entry) = self.refresh_tokens.get_mut(token) else {
            return Ok(RefreshClaim::Missing);
        };
        if entry.client_id != client_id {
            return Ok(RefreshClaim::Missing);
        }
        if entry.expires_at <= now {
            return Ok(RefreshClaim::Missing);
        }
        if entry.superseded_by.is_some() {
            return Ok(RefreshClaim::AlreadyRotated(entry.clone()));
        }
        if entry.revoked_at.is_some() {
            return Ok(RefreshClaim::Missing);
        }
        entry.superseded_by = Some(successor.to_string());
        entry.revoked_at = Some(now);
        Ok(RefreshClaim::Claimed(entry.clone()))
    }

    async fn revoke_refresh_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        match self.refresh_tokens.get_mut(token) {
            Some(mut entry) => {
                if entry.revoked_at.is_none() {
                    entry.revoked_at = Some(now);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_refresh_predecessor(
        &self,
        successor: &str,
    ) -> Result<Option<RefreshToken>, StoreError> {
        Ok(self
            .refresh_tokens
            .iter()
            .find(|t| t.superseded_by.as_deref() == Some(successor))
            .map(|t| t.clone()))
    }

    async fn refresh_tokens_for_client(
        &self,
        client_id: &str,
    ) -> Result<Vec<RefreshToken>, StoreError> {
        Ok(self
            .refresh_tokens
            .iter()
            .filter(|t| t.client_id == client_id)
            .map(|t| t.clone())
            .collect())
    }

    async fn refresh_tokens_for_grant(
        &self,
        user_id: Uuid,
        client_id: &str,
    ) -> Result<Vec<RefreshToken>, StoreError> {
        Ok(self
            .refresh_tokens
            .iter()
            .filter(|t| t.user_id == user_id && t.client_id == client_id)
            .map(|t| t.clone())
            .collect())
    }

    async fn upsert_user_authorization(
        &self,
        grant: &UserAuthorization,
    ) -> Result<(), StoreError> {
        self.user_authorizations.insert(
            (grant.user_id, grant.client_id.clone()),
            grant.clone(),
        );
        Ok(())
    }

    async fn get_user_authorization(
        &self,
        user_id: Uuid,
        client_id: &str,
    ) -> Result<Option<UserAuthorization>, StoreError> {
        Ok(self
            .user_authorizations
            .get(&(user_id, client_id.to_string()))
            .map(|g| g.clone()))
    }

    async fn touch_user_authorization(
        &self,
        user_id: Uuid,
        client_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        match self
            .user_authorizations
            .get_mut(&(user_id, client_id.to_string()))
        {
            Some(mut grant) => {
                grant.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_user_authorization(
        &self,
        user_id: Uuid,
        client_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        match self
            .user_authorizations
            .get_mut(&(user_id, client_id.to_string()))
        {
            Some(mut grant) => {
                if grant.revoked_at.is_none() {
                    grant.revoked_at = Some(now);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn user_authorizations_for_client(
        &self,
        client_id: &str,
    ) -> Result<Vec<UserAuthorization>, StoreError> {
        Ok(self
            .user_authorizations
            .iter()
            .filter(|g| g.client_id == client_id)
            .map(|g| g.clone())
            .collect())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<SweepStats, StoreError> {
        let codes_before = self.codes.len();
        self.codes.retain(|_, c| !c.used && c.expires_at > now);
        let access_before = self.access_tokens.len();
        self.access_tokens.retain(|_, t| t.expires_at > now);
        let refresh_before = self.refresh_tokens.len();
        self.refresh_tokens.retain(|_, t| t.expires_at > now);

        Ok(SweepStats {
            codes_removed: codes_before.saturating_sub(self.codes.len()) as u64,
            access_tokens_removed: access_before.saturating_sub(self.access_tokens.len()) as u64,
            refresh_tokens_removed: refresh_before.saturating_sub(self.refresh_tokens.len())
                as u64,
        })
    }
}
