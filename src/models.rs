// ABOUTME: Core entities and wire types for the credential issuance engine
// ABOUTME: Clients, codes, tokens, standing grants, scope sets, and PKCE types
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Credence Authors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// An ordered set of scope names, parsed from and formatted as the
/// space-separated RFC 6749 wire form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSet(BTreeSet<String>);

impl ScopeSet {
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Parse a space-separated scope string. Empty and duplicate entries
    /// collapse away.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        Self(
            raw.split_whitespace()
                .map(std::string::ToString::to_string)
                .collect(),
        )
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    #[must_use]
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.0.is_subset(&other.0)
    }

    /// Scopes present here but not in `other`.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        Self(self.0.difference(&other.0).cloned().collect())
    }

    /// Set union, used when later consents widen a standing grant.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self(self.0.union(&other.0).cloned().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl std::fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for scope in &self.0 {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(scope)?;
            first = false;
        }
        Ok(())
    }
}

impl FromIterator<String> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for ScopeSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ScopeSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// PKCE code challenge method (RFC 7636).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PkceMethod {
    /// The verifier is the challenge, compared verbatim.
    #[serde(rename = "plain")]
    Plain,
    /// SHA-256 transformation, base64url-encoded without padding.
    #[serde(rename = "S256")]
    S256,
}

impl PkceMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::S256 => "S256",
        }
    }

    /// Parse the wire form; anything other than `plain` or `S256` is
    /// rejected.
    #[must_use]
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw {
            "plain" => Some(Self::Plain),
            "S256" => Some(Self::S256),
            _ => None,
        }
    }
}

impl std::fmt::Display for PkceMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// PKCE parameters bound to an authorization code at issuance.
#[derive(Debug, Clone)]
pub struct PkceParams {
    pub challenge: String,
    pub method: PkceMethod,
}

/// Registration lifecycle status of a client application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    /// Registered but not yet reviewed; cannot be used for grants.
    Pending,
    Approved,
    Suspended,
    Rejected,
}

impl ClientStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Suspended => "suspended",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered client application.
///
/// Only the argon2id hash of the client secret is ever stored; the
/// plaintext secret exists only in the registration response.
#[derive(Debug, Clone)]
pub struct Client {
    pub client_id: String,
    pub client_secret_hash: String,
    pub client_name: Option<String>,
    pub client_uri: Option<String>,
    pub redirect_uris: Vec<String>,
    pub allowed_scopes: ScopeSet,
    pub status: ClientStatus,
    /// Identity of the developer account that owns this registration.
    pub developer_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A single-use authorization code.
#[derive(Debug, Clone)]
pub struct AuthorizationCode {
    pub code: String,
    pub user_id: Uuid,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: ScopeSet,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<PkceMethod>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Flips to true exactly once, in the same conditional update that
    /// validates the exchange.
    pub used: bool,
}

/// An opaque access token presented to resource servers.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub user_id: Uuid,
    pub client_id: String,
    pub scope: ScopeSet,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

/// A long-lived refresh token, linked 1:1 to the access token it was
/// issued alongside and forward-linked to the token that superseded it.
#[derive(Debug, Clone)]
pub struct RefreshToken {
    pub token: String,
    /// Value of the access token minted in the same issuance.
    pub access_token: String,
    pub user_id: Uuid,
    pub client_id: String,
    pub scope: ScopeSet,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    /// Forward rotation link, set at most once. A revoked token with a
    /// successor was rotated; presenting it again is reuse.
    pub superseded_by: Option<String>,
}

impl RefreshToken {
    /// Live means: not expired at `now`, not revoked, not superseded.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now && self.revoked_at.is_none() && self.superseded_by.is_none()
    }
}

/// Standing grant of a user to a client for a scope set, independent of
/// any single token pair. Created at first consent, widened on later
/// consents, touched on refresh, destroyed on explicit revoke.
#[derive(Debug, Clone)]
pub struct UserAuthorization {
    pub user_id: Uuid,
    pub client_id: String,
    pub scope: ScopeSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl UserAuthorization {
    /// Whether this grant currently covers `requested`.
    #[must_use]
    pub fn covers(&self, requested: &ScopeSet, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none()
            && self.expires_at.is_none_or(|exp| exp > now)
            && requested.is_subset_of(&self.scope)
    }
}

// ============================================================================
// Wire types
// ============================================================================

/// Client registration request.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientRegistrationRequest {
    /// Redirect URIs for the authorization code flow; each must be an
    /// absolute URI.
    pub redirect_uris: Vec<String>,
    /// Scopes the client wants to be allowed to request, space-separated.
    pub scope: String,
    pub client_name: Option<String>,
    pub client_uri: Option<String>,
    /// Developer account registering the client.
    pub developer_id: Uuid,
}

/// Client registration response. The only place the plaintext secret
/// ever appears.
#[derive(Debug, Serialize)]
pub struct RegisteredClient {
    pub client_id: String,
    pub client_secret: String,
    pub status: ClientStatus,
    pub redirect_uris: Vec<String>,
    pub scope: ScopeSet,
}

/// Authorization request (the authorize endpoint's inputs).
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeRequest {
    /// Response type; only `code` is supported.
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: String,
    /// Requested scopes, space-separated. Required; there is no implicit
    /// default grant.
    pub scope: Option<String>,
    /// Opaque CSRF token, echoed back verbatim.
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    /// `plain` or `S256`; defaults to `S256` when a challenge is present.
    pub code_challenge_method: Option<String>,
}

/// Authorization response: the code and the echoed state.
#[derive(Debug, Serialize)]
pub struct AuthorizeResponse {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Token endpoint request, covering both grant types.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    /// `authorization_code` or `refresh_token`.
    pub grant_type: String,
    pub client_id: String,
    pub client_secret: String,
    /// Authorization code (`authorization_code` grant).
    pub code: Option<String>,
    /// Must match the redirect used at authorize time.
    pub redirect_uri: Option<String>,
    /// PKCE verifier (`authorization_code` grant).
    pub code_verifier: Option<String>,
    /// Refresh token (`refresh_token` grant).
    pub refresh_token: Option<String>,
}

/// Token endpoint response.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Always "Bearer".
    pub token_type: String,
    /// Seconds until the access token expires.
    pub expires_in: i64,
    pub scope: ScopeSet,
    pub refresh_token: String,
}

/// Introspection response for resource servers (internal validation
/// call). Inactive tokens carry only the reason.
#[derive(Debug, Serialize)]
pub struct Introspection {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<ScopeSet>,
    /// Unix timestamp of expiry, when active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<crate::errors::TokenInvalidReason>,
}

/// Revocation request: a token of either kind plus client credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct RevocationRequest {
    pub token: String,
    pub client_id: String,
    pub client_secret: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_set_parses_and_orders() {
        let scopes = ScopeSet::parse("write  read read");
        assert_eq!(scopes.len(), 2);
        assert_eq!(scopes.to_string(), "read write");
    }

    #[test]
    fn scope_subset_rules() {
        let allowed = ScopeSet::parse("read write");
        assert!(ScopeSet::parse("read").is_subset_of(&allowed));
        assert!(ScopeSet::parse("").is_subset_of(&allowed));
        assert!(!ScopeSet::parse("read admin").is_subset_of(&allowed));
        assert_eq!(
            ScopeSet::parse("read admin").difference(&allowed).to_string(),
            "admin"
        );
    }

    #[test]
    fn pkce_method_wire_forms() {
        assert_eq!(PkceMethod::from_wire("S256"), Some(PkceMethod::S256));
        assert_eq!(PkceMethod::from_wire("plain"), Some(PkceMethod::Plain));
        assert_eq!(PkceMethod::from_wire("s256"), None);
    }
}
