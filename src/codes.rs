// ABOUTME: Authorization code issuance and single-use exchange
// ABOUTME: Atomic consumption with PKCE verification after the consuming update
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Credence Authors

use crate::config::AuthConfig;
use crate::crypto;
use crate::errors::{AuthError, AuthResult};
use crate::models::{AuthorizationCode, PkceMethod, PkceParams, ScopeSet};
use crate::store::AuthStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Entropy for code values: 32 bytes, 256 bits.
const CODE_BYTES: usize = 32;

/// Issues single-use authorization codes and exchanges them for the
/// (user, scope) binding they carry.
pub struct CodeIssuer<S> {
    store: Arc<S>,
    config: Arc<AuthConfig>,
}

impl<S> Clone for CodeIssuer<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S: AuthStore> CodeIssuer<S> {
    #[must_use]
    pub fn new(store: Arc<S>, config: Arc<AuthConfig>) -> Self {
        Self { store, config }
    }

    /// Issue a code bound to a user, client, redirect URI, scope set,
    /// and optional PKCE challenge.
    ///
    /// # Errors
    /// `Validation` for a malformed PKCE challenge; `Internal` if the
    /// RNG fails; `Storage` on store failure.
    pub async fn issue(
        &self,
        user_id: Uuid,
        client_id: &str,
        redirect_uri: &str,
        scope: ScopeSet,
        pkce: Option<PkceParams>,
    ) -> AuthResult<AuthorizationCode> {
        if let Some(ref params) = pkce {
            // Challenge length mirrors the verifier rules (RFC 7636 4.2).
            if params.challenge.len() < 43 || params.challenge.len() > 128 {
                return Err(AuthError::validation(
                    "code_challenge must be between 43 and 128 characters",
                ));
            }
            if params.method == PkceMethod::Plain {
                warn!(
                    client_id = %client_id,
                    "issuing code with plain PKCE method; S256 is strongly preferred"
                );
            }
        }

        let now = Utc::now();
        let auth_code = AuthorizationCode {
            code: crypto::generate_opaque_value(CODE_BYTES)?,
            user_id,
            client_id: client_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
            scope,
            code_challenge: pkce.as_ref().map(|p| p.challenge.clone()),
            code_challenge_method: pkce.as_ref().map(|p| p.method),
            created_at: now,
            expires_at: now + self.config.code_ttl,
            used: false,
        };
        self.store.store_auth_code(&auth_code).await?;

        info!(
            client_id = %client_id,
            user_id = %user_id,
            pkce = auth_code.code_challenge.is_some(),
            "issued authorization code"
        );
        Ok(auth_code)
    }

    /// Exchange a code for its (user, scope) binding.
    ///
    /// Consumption is one conditional update: the code flips to used
    /// only if it is currently unused, unexpired, and bound to exactly
    /// this client and redirect URI, so two concurrent exchanges resolve
    /// to exactly one success. PKCE is verified after consumption; a
    /// failed verifier does not resurrect the code.
    ///
    /// # Errors
    /// `InvalidGrant` when the code is unknown, used, expired, bound to
    /// another client or redirect URI, or the PKCE verifier fails.
    pub async fn exchange(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> AuthResult<(Uuid, ScopeSet)> {
        let consumed = self
            .store
            .consume_auth_code(code, client_id, redirect_uri, Utc::now())
            .await?
            .ok_or_else(|| {
                warn!(
                    client_id = %client_id,
                    "code exchange rejected: unknown, used, expired, or mismatched binding"
                );
                AuthError::invalid_grant("invalid or expired authorization code")
            })?;

        Self::verify_pkce(&consumed, client_id, code_verifier)?;

        debug!(
            client_id = %client_id,
            user_id = %consumed.user_id,
            "authorization code exchanged"
        );
        Ok((consumed.user_id, consumed.scope))
    }

    fn verify_pkce(
        consumed: &AuthorizationCode,
        client_id: &str,
        code_verifier: Option<&str>,
    ) -> AuthResult<()> {
        match (&consumed.code_challenge, code_verifier) {
            (Some(challenge), Some(verifier)) => {
                if !crypto::is_valid_pkce_verifier(verifier) {
                    return Err(AuthError::invalid_grant(
                        "code_verifier must be 43-128 unreserved characters",
                    ));
                }
                let method = consumed.code_challenge_method.unwrap_or(PkceMethod::S256);
                if crypto::pkce_challenge_matches(method, challenge, verifier) {
                    Ok(())
                } else {
                    warn!(
                        client_id = %client_id,
                        method = %method,
                        "PKCE verification failed: verifier does not match stored challenge"
                    );
                    Err(AuthError::invalid_grant("invalid code_verifier"))
                }
            }
            (Some(_), None) => Err(AuthError::invalid_grant(
                "code_verifier is required: this code was issued with a PKCE challenge",
            )),
            (None, Some(_)) => Err(AuthError::invalid_grant(
                "code_verifier provided but no code_challenge was issued",
            )),
            (None, None) => Ok(()),
        }
    }
}
