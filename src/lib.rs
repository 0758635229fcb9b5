// ABOUTME: Main library entry point for the Credence credential engine
// ABOUTME: Exposes client registration, code issuance, token lifecycle, and revocation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Credence Authors

#![deny(unsafe_code)]

//! # Credence
//!
//! A credential issuance and validation engine for the `OAuth2`
//! authorization-code and refresh grants, designed to be embedded
//! behind any transport.
//!
//! ## Features
//!
//! - **Client registry**: registration, secret verification, approval
//!   lifecycle
//! - **Single-use authorization codes**: atomic consumption, optional
//!   PKCE (`plain` and `S256`)
//! - **Opaque token pairs**: short-lived access tokens with rotating
//!   refresh tokens and reuse detection
//! - **Cascading revocation**: rotation chains, per-client, and
//!   per-user-grant cascades
//! - **Pluggable storage**: everything persists through the
//!   [`store::AuthStore`] trait; [`store::MemoryStore`] ships in-crate
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use credence::config::AuthConfig;
//! use credence::grant::GrantEngine;
//! use credence::store::MemoryStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AuthConfig::from_env()?;
//!     let engine = GrantEngine::new(Arc::new(MemoryStore::new()), config);
//!     let _sweeper = engine.spawn_expiry_sweep(std::time::Duration::from_secs(300));
//!     Ok(())
//! }
//! ```

// ── Public API ──────────────────────────────────────────────────────────

/// Authorization code issuance and single-use exchange
pub mod codes;

/// Runtime configuration loaded from the environment
pub mod config;

/// Random value generation, secret hashing, and PKCE verification
pub mod crypto;

/// Error taxonomy shared across the engine
pub mod errors;

/// Grant engine orchestrating the full authorization and token flows
pub mod grant;

/// Structured logging setup
pub mod logging;

/// Domain entities and wire-facing request/response types
pub mod models;

/// Client registration and lifecycle management
pub mod registry;

/// Token, chain, client, and user-grant revocation
pub mod revocation;

/// Refresh token rotation with reuse detection
pub mod rotation;

/// Storage abstraction and the in-memory reference store
pub mod store;

/// Access and refresh token minting and validation
pub mod tokens;

pub use errors::{AuthError, AuthResult};
pub use grant::GrantEngine;
pub use store::{AuthStore, MemoryStore};
