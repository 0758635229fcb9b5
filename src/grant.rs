// ABOUTME: Grant engine orchestrating registry, codes, tokens, rotation, and revocation
// ABOUTME: Implements the authorization-code and refresh grants end to end
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Credence Authors

use crate::codes::CodeIssuer;
use crate::config::AuthConfig;
use crate::errors::{AuthError, AuthResult};
use crate::models::{
    AccessToken, AuthorizeRequest, AuthorizeResponse, Client, ClientStatus, Introspection,
    PkceMethod, PkceParams, RefreshToken, RevocationRequest, ScopeSet, TokenRequest,
    TokenResponse, UserAuthorization,
};
use crate::registry::ClientRegistry;
use crate::revocation::RevocationService;
use crate::rotation::RotationLedger;
use crate::store::AuthStore;
use crate::tokens::TokenIssuer;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// The orchestrator for the authorization-code and refresh grants.
///
/// Per grant, the state machine is
/// `requested -> code_issued -> exchanged -> tokens_issued`, with
/// `expired` and `revoked` absorbing; each refresh replaces the token
/// pair (`tokens_issued -> tokens_issued`) or, on reuse detection,
/// terminates the chain (`tokens_issued -> revoked`). All state lives
/// in the injected store; the engine itself is stateless and cheap to
/// clone.
pub struct GrantEngine<S> {
    config: Arc<AuthConfig>,
    store: Arc<S>,
    registry: ClientRegistry<S>,
    codes: CodeIssuer<S>,
    tokens: TokenIssuer<S>,
    rotation: RotationLedger<S>,
    revocation: RevocationService<S>,
}

impl<S> Clone for GrantEngine<S> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            store: Arc::clone(&self.store),
            registry: self.registry.clone(),
            codes: self.codes.clone(),
            tokens: self.tokens.clone(),
            rotation: self.rotation.clone(),
            revocation: self.revocation.clone(),
        }
    }
}

impl<S: AuthStore> GrantEngine<S> {
    #[must_use]
    pub fn new(store: Arc<S>, config: AuthConfig) -> Self {
        let config = Arc::new(config);
        let registry = ClientRegistry::new(Arc::clone(&store), Arc::clone(&config));
        let codes = CodeIssuer::new(Arc::clone(&store), Arc::clone(&config));
        let tokens = TokenIssuer::new(Arc::clone(&store), Arc::clone(&config));
        let revocation = RevocationService::new(Arc::clone(&store));
        let rotation = RotationLedger::new(Arc::clone(&store), tokens.clone(), revocation.clone());
        Self {
            config,
            store,
            registry,
            codes,
            tokens,
            rotation,
            revocation,
        }
    }

    /// Client registration and lifecycle operations.
    #[must_use]
    pub fn registry(&self) -> &ClientRegistry<S> {
        &self.registry
    }

    /// Direct revocation operations (admin surface).
    #[must_use]
    pub fn revocation(&self) -> &RevocationService<S> {
        &self.revocation
    }

    /// Handle an authorization request for an authenticated, consenting
    /// user. Session handling and the consent screen are the caller's;
    /// by the time this runs, `user_id` has said yes to `scope`.
    ///
    /// Issues a single-use code and upserts the user's standing
    /// authorization: first consent creates it, later consents widen it.
    /// The opaque `state` value is echoed back verbatim.
    ///
    /// # Errors
    /// `InvalidClient` for unknown or non-approved clients,
    /// `Validation` for malformed request shape (response type,
    /// unregistered redirect, PKCE parameters, missing scope),
    /// `InvalidScope` when the request exceeds the client's allowance.
    pub async fn authorize(
        &self,
        request: AuthorizeRequest,
        user_id: Uuid,
    ) -> AuthResult<AuthorizeResponse> {
        let client = self.grant_capable_client(&request.client_id).await?;

        if request.response_type != "code" {
            return Err(AuthError::validation(
                "only the 'code' response_type is supported",
            ));
        }
        if !ClientRegistry::<S>::validate_redirect(&client, &request.redirect_uri) {
            warn!(
                client_id = %client.client_id,
                "authorize rejected: redirect_uri is not registered"
            );
            return Err(AuthError::validation("redirect_uri is not registered"));
        }

        let requested = request
            .scope
            .as_deref()
            .map(ScopeSet::parse)
            .unwrap_or_default();
        if requested.is_empty() {
            return Err(AuthError::validation("scope is required"));
        }
        let granted = ClientRegistry::<S>::validate_scopes(&client, &requested)?;

        let pkce = Self::parse_pkce(&request)?;

        self.record_consent(user_id, &client.client_id, &granted)
            .await?;

        let code = self
            .codes
            .issue(
                user_id,
                &client.client_id,
                &request.redirect_uri,
                granted,
                pkce,
            )
            .await?;

        Ok(AuthorizeResponse {
            code: code.code,
            state: request.state,
        })
    }

    /// Whether a live standing authorization already covers `scope`,
    /// for the external consent layer's skip-consent decision.
    pub async fn has_standing_grant(
        &self,
        user_id: Uuid,
        client_id: &str,
        scope: &ScopeSet,
    ) -> AuthResult<bool> {
        Ok(self
            .store
            .get_user_authorization(user_id, client_id)
            .await?
            .is_some_and(|grant| grant.covers(scope, Utc::now())))
    }

    /// Token endpoint: dispatch on `grant_type`.
    ///
    /// Client credentials are validated for every grant type before
    /// anything else is looked at.
    ///
    /// # Errors
    /// `InvalidClient`, `InvalidGrant`, `ReuseDetected`, or
    /// `Validation` per the component that rejects the request.
    pub async fn token(&self, request: TokenRequest) -> AuthResult<TokenResponse> {
        let client = self
            .registry
            .authenticate(&request.client_id, &request.client_secret)
            .await?;
        if client.status != ClientStatus::Approved {
            warn!(
                client_id = %client.client_id,
                status = %client.status,
                "token request rejected: client is not approved"
            );
            return Err(AuthError::InvalidClient);
        }

        match request.grant_type.as_str() {
            "authorization_code" => self.authorization_code_grant(&client, request).await,
            "refresh_token" => self.refresh_token_grant(&client, request).await,
            other => Err(AuthError::validation(format!(
                "unsupported grant_type: {other}"
            ))),
        }
    }

    /// Introspection for resource servers. Read-only; never mutates
    /// token state.
    pub async fn introspect(&self, access_token: &str) -> AuthResult<Introspection> {
        match self.tokens.validate(access_token).await {
            Ok(info) => Ok(Introspection {
                active: true,
                user_id: Some(info.user_id),
                client_id: Some(info.client_id),
                scope: Some(info.scope),
                exp: Some(info.expires_at.timestamp()),
                reason: None,
            }),
            Err(AuthError::InvalidToken { reason }) => Ok(Introspection {
                active: false,
                user_id: None,
                client_id: None,
                scope: None,
                exp: None,
                reason: Some(reason),
            }),
            Err(other) => Err(other),
        }
    }

    /// Revocation endpoint. Authenticates the client, then always
    /// reports success whether or not the token existed, so callers
    /// cannot probe for live token values. A token owned by a different
    /// client is treated as nonexistent.
    ///
    /// # Errors
    /// `InvalidClient` on bad credentials; `Storage` when the store is
    /// unreachable (transient failures are never masked as success).
    pub async fn revoke(&self, request: RevocationRequest) -> AuthResult<()> {
        let client = self
            .registry
            .authenticate(&request.client_id, &request.client_secret)
            .await?;

        if let Some(token) = self.store.get_access_token(&request.token).await? {
            if token.client_id == client.client_id {
                self.revocation.revoke_access_token(&request.token).await?;
                info!(client_id = %client.client_id, "access token revoked by client");
            }
            return Ok(());
        }
        if let Some(token) = self.store.get_refresh_token(&request.token).await? {
            if token.client_id == client.client_id {
                self.revocation.revoke_refresh_token(&request.token).await?;
                info!(client_id = %client.client_id, "refresh token revoked by client");
            }
            return Ok(());
        }

        debug!(client_id = %client.client_id, "revocation for nonexistent token");
        Ok(())
    }

    /// Suspend a client and cascade revocation to everything it owns.
    pub async fn suspend_client(&self, client_id: &str) -> AuthResult<()> {
        self.registry.suspend(client_id).await?;
        self.revocation.revoke_client(client_id).await?;
        Ok(())
    }

    /// Spawn the optional periodic expiry sweep. Correctness never
    /// depends on it; expiry is enforced at read time.
    #[must_use]
    pub fn spawn_expiry_sweep(&self, period: std::time::Duration) -> tokio::task::JoinHandle<()>
    where
        S: 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match store.sweep_expired(Utc::now()).await {
                    Ok(stats) if stats.total() > 0 => {
                        debug!(
                            codes = stats.codes_removed,
                            access = stats.access_tokens_removed,
                            refresh = stats.refresh_tokens_removed,
                            "expiry sweep removed stale records"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "expiry sweep failed; will retry next period"),
                }
            }
        })
    }

    // ── Grant handlers ──────────────────────────────────────────────────

    async fn authorization_code_grant(
        &self,
        client: &Client,
        request: TokenRequest,
    ) -> AuthResult<TokenResponse> {
        let code = request
            .code
            .ok_or_else(|| AuthError::validation("missing code"))?;
        let redirect_uri = request
            .redirect_uri
            .ok_or_else(|| AuthError::validation("missing redirect_uri"))?;

        let (user_id, scope) = self
            .codes
            .exchange(
                &code,
                &client.client_id,
                &redirect_uri,
                request.code_verifier.as_deref(),
            )
            .await?;

        let access = self
            .tokens
            .issue_access_token(user_id, &client.client_id, scope)
            .await?;
        let refresh = self.tokens.issue_refresh_token(&access).await?;

        info!(
            client_id = %client.client_id,
            user_id = %user_id,
            "authorization code exchanged for token pair"
        );
        Ok(self.token_response(access, refresh))
    }

    async fn refresh_token_grant(
        &self,
        client: &Client,
        request: TokenRequest,
    ) -> AuthResult<TokenResponse> {
        let value = request
            .refresh_token
            .ok_or_else(|| AuthError::validation("missing refresh_token"))?;
        let (access, refresh) = self.rotation.refresh(&value, client).await?;
        Ok(self.token_response(access, refresh))
    }

    fn token_response(&self, access: AccessToken, refresh: RefreshToken) -> TokenResponse {
        TokenResponse {
            access_token: access.token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_ttl.num_seconds(),
            scope: access.scope,
            refresh_token: refresh.token,
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    async fn grant_capable_client(&self, client_id: &str) -> AuthResult<Client> {
        let Some(client) = self.store.get_client(client_id).await? else {
            warn!(client_id = %client_id, "authorize rejected: unknown client");
            return Err(AuthError::InvalidClient);
        };
        if client.status != ClientStatus::Approved {
            warn!(
                client_id = %client_id,
                status = %client.status,
                "authorize rejected: client is not approved"
            );
            return Err(AuthError::InvalidClient);
        }
        Ok(client)
    }

    fn parse_pkce(request: &AuthorizeRequest) -> AuthResult<Option<PkceParams>> {
        match (&request.code_challenge, &request.code_challenge_method) {
            (Some(challenge), method) => {
                let method = match method.as_deref() {
                    None => PkceMethod::S256,
                    Some(raw) => PkceMethod::from_wire(raw).ok_or_else(|| {
                        AuthError::validation(format!(
                            "unsupported code_challenge_method: {raw}"
                        ))
                    })?,
                };
                Ok(Some(PkceParams {
                    challenge: challenge.clone(),
                    method,
                }))
            }
            (None, Some(_)) => Err(AuthError::validation(
                "code_challenge_method requires a code_challenge",
            )),
            (None, None) => Ok(None),
        }
    }

    /// First consent creates the standing grant; later consents widen
    /// it. A previously revoked grant is replaced by a fresh one rather
    /// than resurrected with its old scope set.
    async fn record_consent(
        &self,
        user_id: Uuid,
        client_id: &str,
        granted: &ScopeSet,
    ) -> AuthResult<()> {
        let now = Utc::now();
        let existing = self.store.get_user_authorization(user_id, client_id).await?;

        let grant = match existing {
            Some(previous) if previous.revoked_at.is_none() => UserAuthorization {
                scope: previous.scope.union(granted),
                updated_at: now,
                ..previous
            },
            _ => UserAuthorization {
                user_id,
                client_id: client_id.to_string(),
                scope: granted.clone(),
                created_at: now,
                updated_at: now,
                expires_at: None,
                revoked_at: None,
            },
        };
        self.store.upsert_user_authorization(&grant).await?;
        Ok(())
    }
}
