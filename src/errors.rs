// ABOUTME: Error taxonomy for the credential issuance and validation engine
// ABOUTME: Typed, recoverable errors with RFC 6749 wire-code mapping
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Credence Authors

use serde::Serialize;
use thiserror::Error;

/// Result alias used throughout the engine.
pub type AuthResult<T> = Result<T, AuthError>;

/// Why an access token failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenInvalidReason {
    /// No token with this value exists.
    Unknown,
    /// The token existed but its expiry timestamp has passed.
    Expired,
    /// The token was revoked, directly or through a cascade.
    Revoked,
}

impl TokenInvalidReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
        }
    }
}

impl std::fmt::Display for TokenInvalidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transient failure of the backing store.
///
/// Kept distinct from the grant-level taxonomy: "token not found" and
/// "storage unreachable" must never collapse into the same error, or
/// auditability of security decisions is lost. Callers may retry with
/// backoff.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors returned by the grant engine and its components.
///
/// Every variant is a structured, recoverable value returned to the
/// immediate caller; the engine never terminates the process on any of
/// these. `ReuseDetected` is a security event and carries a cascading
/// revocation side effect before it is returned.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown client, bad secret, or a client in a status that cannot
    /// be used for grants.
    #[error("client authentication failed")]
    InvalidClient,

    /// Bad, expired, or already-used authorization code or refresh
    /// token; redirect or PKCE mismatch at exchange time.
    #[error("invalid grant: {0}")]
    InvalidGrant(String),

    /// Requested scopes exceed what the client is allowed.
    #[error("invalid scope: {0}")]
    InvalidScope(String),

    /// A superseded refresh token was presented again. Treated as a
    /// token-theft signal; the whole rotation chain and the standing
    /// user authorization are revoked before this is returned.
    #[error("refresh token reuse detected")]
    ReuseDetected,

    /// Access-token validation failure, with the reason a resource
    /// server needs for its introspection response.
    #[error("invalid token: {reason}")]
    InvalidToken { reason: TokenInvalidReason },

    /// Malformed registration or request input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Transient storage failure, eligible for caller-side retry.
    #[error(transparent)]
    Storage(#[from] StoreError),

    /// Infrastructure failure inside the engine itself (e.g. the system
    /// RNG refusing to produce bytes). Not part of the grant taxonomy.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// RFC 6749 error code for the wire.
    ///
    /// `ReuseDetected` deliberately maps to `invalid_grant`: the caller
    /// that replayed a stolen token gets no confirmation that the theft
    /// was noticed. The distinction lives in logs and in the revocation
    /// side effect, not on the wire.
    #[must_use]
    pub const fn oauth_code(&self) -> &'static str {
        match self {
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant(_) | Self::ReuseDetected => "invalid_grant",
            Self::InvalidScope(_) => "invalid_scope",
            Self::InvalidToken { .. } => "invalid_token",
            Self::Validation(_) => "invalid_request",
            Self::Storage(_) => "temporarily_unavailable",
            Self::Internal(_) => "server_error",
        }
    }

    /// Whether the caller may retry the same request unchanged.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    pub(crate) fn invalid_grant(description: impl Into<String>) -> Self {
        Self::InvalidGrant(description.into())
    }

    pub(crate) fn validation(description: impl Into<String>) -> Self {
        Self::Validation(description.into())
    }

    pub(crate) fn internal(description: impl Into<String>) -> Self {
        Self::Internal(description.into())
    }
}
