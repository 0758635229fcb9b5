// ABOUTME: Deployment configuration for credential lifetimes and scope vocabulary
// ABOUTME: Environment-variable parsing with validated fallbacks
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Credence Authors

use crate::models::ScopeSet;
use anyhow::{bail, Context, Result};
use chrono::Duration;
use std::env;
use tracing::{info, warn};

/// Environment variable names.
const ENV_CODE_TTL: &str = "CREDENCE_CODE_TTL_SECS";
const ENV_ACCESS_TTL: &str = "CREDENCE_ACCESS_TOKEN_TTL_SECS";
const ENV_REFRESH_TTL: &str = "CREDENCE_REFRESH_TOKEN_TTL_SECS";
const ENV_SCOPES: &str = "CREDENCE_SCOPES";

/// Engine configuration: credential lifetimes and the recognized scope
/// vocabulary. Injected at construction; there is no ambient global.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Authorization code lifetime. Codes are single-use and short-lived.
    pub code_ttl: Duration,
    /// Access token lifetime.
    pub access_token_ttl: Duration,
    /// Refresh token lifetime; long relative to access tokens.
    pub refresh_token_ttl: Duration,
    /// The full set of scope names clients may register for.
    pub scope_vocabulary: ScopeSet,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            code_ttl: Duration::minutes(10),
            access_token_ttl: Duration::hours(1),
            refresh_token_ttl: Duration::days(30),
            scope_vocabulary: ScopeSet::parse("read write profile"),
        }
    }
}

impl AuthConfig {
    /// Load configuration from the environment, falling back to defaults
    /// for unset variables.
    ///
    /// # Errors
    /// Returns an error if a TTL variable is present but unparseable or
    /// non-positive, or if the scope vocabulary is empty.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let code_ttl = parse_ttl(ENV_CODE_TTL, defaults.code_ttl)?;
        let access_token_ttl = parse_ttl(ENV_ACCESS_TTL, defaults.access_token_ttl)?;
        let refresh_token_ttl = parse_ttl(ENV_REFRESH_TTL, defaults.refresh_token_ttl)?;

        let scope_vocabulary = match env::var(ENV_SCOPES) {
            Ok(raw) => ScopeSet::parse(&raw),
            Err(_) => defaults.scope_vocabulary,
        };
        if scope_vocabulary.is_empty() {
            bail!("{ENV_SCOPES} must name at least one scope");
        }

        if refresh_token_ttl <= access_token_ttl {
            warn!(
                "refresh token TTL ({refresh_token_ttl}) is not longer than access token TTL \
                 ({access_token_ttl}); rotation narrows nothing with this configuration"
            );
        }

        let config = Self {
            code_ttl,
            access_token_ttl,
            refresh_token_ttl,
            scope_vocabulary,
        };
        info!(
            code_ttl_secs = config.code_ttl.num_seconds(),
            access_token_ttl_secs = config.access_token_ttl.num_seconds(),
            refresh_token_ttl_secs = config.refresh_token_ttl.num_seconds(),
            scopes = %config.scope_vocabulary,
            "loaded engine configuration"
        );
        Ok(config)
    }
}

fn parse_ttl(var: &str, default: Duration) -> Result<Duration> {
    match env::var(var) {
        Ok(raw) => {
            let secs: i64 = raw
                .parse()
                .with_context(|| format!("{var} must be an integer number of seconds"))?;
            if secs <= 0 {
                bail!("{var} must be positive, got {secs}");
            }
            Ok(Duration::seconds(secs))
        }
        Err(_) => Ok(default),
    }
}
