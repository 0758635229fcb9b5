// ABOUTME: Cryptographic primitives for opaque credentials and PKCE
// ABOUTME: CSPRNG value generation, argon2id secret hashing, constant-time comparison
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Credence Authors

use crate::errors::{AuthError, AuthResult};
use crate::models::PkceMethod;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose, Engine as _};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Generate a URL-safe opaque value with `bytes` bytes of entropy.
///
/// Codes and tokens use 32 bytes (256 bits), comfortably above the
/// 128-bit floor the exchange protocol requires.
///
/// # Errors
/// Returns an error if the system RNG fails; the engine cannot mint
/// credentials securely without working randomness.
pub fn generate_opaque_value(bytes: usize) -> AuthResult<String> {
    let rng = SystemRandom::new();
    let mut buf = vec![0u8; bytes];
    rng.fill(&mut buf).map_err(|e| {
        tracing::error!(error = ?e, "system RNG failure while generating opaque value");
        AuthError::internal("system RNG failure")
    })?;
    Ok(general_purpose::URL_SAFE_NO_PAD.encode(&buf))
}

/// Generate a client secret: 256 bits of entropy, standard base64.
pub fn generate_client_secret() -> AuthResult<String> {
    let rng = SystemRandom::new();
    let mut secret = [0u8; 32];
    rng.fill(&mut secret).map_err(|e| {
        tracing::error!(error = ?e, "system RNG failure while generating client secret");
        AuthError::internal("system RNG failure")
    })?;
    Ok(general_purpose::STANDARD.encode(secret))
}

/// Hash a client secret for storage using argon2id with a random salt.
pub fn hash_client_secret(secret: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| AuthError::internal(format!("argon2 hashing failed: {e}")))?;
    Ok(hash.to_string())
}

/// Verify a presented secret against a stored argon2id PHC string.
///
/// Returns false on any failure, including an unparseable stored hash;
/// the caller maps that to `InvalidClient` without detail.
#[must_use]
pub fn verify_client_secret(secret: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        tracing::error!("stored client secret hash is not a valid PHC string");
        return false;
    };
    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok()
}

/// Compute the S256 challenge for a verifier: base64url(sha256(verifier)),
/// no padding.
#[must_use]
pub fn s256_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Whether `verifier` satisfies the stored `challenge` under `method`.
/// Comparison is constant-time for both methods.
#[must_use]
pub fn pkce_challenge_matches(method: PkceMethod, challenge: &str, verifier: &str) -> bool {
    let computed = match method {
        PkceMethod::S256 => s256_challenge(verifier),
        PkceMethod::Plain => verifier.to_string(),
    };
    computed.as_bytes().ct_eq(challenge.as_bytes()).into()
}

/// RFC 7636 verifier format: 43-128 characters from the unreserved set.
#[must_use]
pub fn is_valid_pkce_verifier(verifier: &str) -> bool {
    (43..=128).contains(&verifier.len())
        && verifier
            .chars()
            .all(|c| matches!(c, 'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '.' | '_' | '~'))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn opaque_values_are_distinct_and_padded_right() {
        let a = generate_opaque_value(32).unwrap();
        let b = generate_opaque_value(32).unwrap();
        assert_ne!(a, b);
        // 32 bytes -> 43 base64url chars, no padding
        assert_eq!(a.len(), 43);
        assert!(!a.contains('='));
    }

    #[test]
    fn secret_hash_round_trip() {
        let secret = generate_client_secret().unwrap();
        let hash = hash_client_secret(&secret).unwrap();
        assert!(verify_client_secret(&secret, &hash));
        assert!(!verify_client_secret("not-the-secret", &hash));
        assert!(!hash.contains(&secret));
    }

    #[test]
    fn s256_known_vector() {
        // Test vector from RFC 7636 appendix B.
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            s256_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
        assert!(pkce_challenge_matches(
            PkceMethod::S256,
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM",
            verifier
        ));
    }

    #[test]
    fn plain_method_compares_verbatim() {
        let verifier = "a".repeat(43);
        assert!(pkce_challenge_matches(PkceMethod::Plain, &verifier, &verifier));
        assert!(!pkce_challenge_matches(PkceMethod::Plain, &verifier, "b"));
    }

    #[test]
    fn verifier_format_rules() {
        assert!(is_valid_pkce_verifier(&"a".repeat(43)));
        assert!(is_valid_pkce_verifier(&"a".repeat(128)));
        assert!(!is_valid_pkce_verifier(&"a".repeat(42)));
        assert!(!is_valid_pkce_verifier(&"a".repeat(129)));
        assert!(!is_valid_pkce_verifier(&format!("{}!", "a".repeat(43))));
    }
}
