//! Key Ring
//!
//! Thread-safe registry of signing keys by key id. Builds the
//! `SigningIdentity` for a request and verifies credentials against
//! whichever registered key their `kid` header names.

use std::collections::HashMap;

use jsonwebtoken::{decode_header, Algorithm};
use parking_lot::RwLock;

use crate::auth::claims::ClaimMap;
use crate::auth::jwt::Verifier;
use crate::auth::keys::{AlgorithmFamily, KeyMaterial, SigningIdentity, Validity};
use crate::error::{TokenError, VerifyError};

#[derive(Debug, Clone)]
struct KeyEntry {
    material: KeyMaterial,
    algorithm: Algorithm,
}

#[derive(Debug, Default)]
pub struct KeyRing {
    keys: RwLock<HashMap<String, KeyEntry>>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a key.
    ///
    /// # Errors
    /// Returns `TokenError::KeyResolution` if the algorithm is unsupported or
    /// does not match the material's family
    pub fn add_key(
        &self,
        key_id: impl Into<String>,
        material: KeyMaterial,
        algorithm: Algorithm,
    ) -> Result<(), TokenError> {
        let family = AlgorithmFamily::of(algorithm)?;
        if family != material.family() {
            return Err(TokenError::KeyResolution(format!(
                "{:?} requires {} key material",
                algorithm, family
            )));
        }

        let key_id = key_id.into();
        tracing::debug!(key_id = %key_id, family = %family, "Signing key registered");
        self.keys
            .write()
            .insert(key_id, KeyEntry { material, algorithm });
        Ok(())
    }

    pub fn add_hmac_key(
        &self,
        key_id: impl Into<String>,
        secret: impl Into<Vec<u8>>,
    ) -> Result<(), TokenError> {
        self.add_key(
            key_id,
            KeyMaterial::Hmac {
                secret: secret.into(),
            },
            Algorithm::HS256,
        )
    }

    pub fn add_rsa_key(
        &self,
        key_id: impl Into<String>,
        private_pem: impl Into<Vec<u8>>,
        public_pem: impl Into<Vec<u8>>,
    ) -> Result<(), TokenError> {
        self.add_key(
            key_id,
            KeyMaterial::Rsa {
                private_pem: private_pem.into(),
                public_pem: public_pem.into(),
            },
            Algorithm::RS256,
        )
    }

    pub fn remove_key(&self, key_id: &str) -> bool {
        self.keys.write().remove(key_id).is_some()
    }

    pub fn contains(&self, key_id: &str) -> bool {
        self.keys.read().contains_key(key_id)
    }

    /// Signing identity for `key_id` with the given lifetimes.
    ///
    /// # Errors
    /// Returns `TokenError::KeyResolution` if no key has this id
    pub fn identity(&self, key_id: &str, validity: Validity) -> Result<SigningIdentity, TokenError> {
        let entry = self
            .keys
            .read()
            .get(key_id)
            .cloned()
            .ok_or_else(|| TokenError::KeyResolution(format!("key does not exist: {}", key_id)))?;

        Ok(SigningIdentity::new(key_id, entry.material, entry.algorithm).with_validity(validity))
    }

    /// Verify `token` with the key named by its `kid` header.
    ///
    /// # Errors
    /// `VerifyError::Invalid` for a missing or unknown `kid` or a registered
    /// key whose material does not resolve, otherwise as `Verifier::verify`
    pub fn verify(&self, token: &str) -> Result<ClaimMap, VerifyError> {
        let header = decode_header(token)?;
        let key_id = header
            .kid
            .ok_or_else(|| VerifyError::Invalid("token has no key id".to_string()))?;

        let identity = self
            .identity(&key_id, Validity::default())
            .map_err(|_| VerifyError::Invalid(format!("unknown key id: {}", key_id)))?;
        let key = identity.resolve().map_err(|e| {
            tracing::error!(key_id = %key_id, error = %e, "Registered key failed to resolve");
            VerifyError::Invalid(format!("key {} is unusable: {}", key_id, e))
        })?;

        Verifier::new(key).verify(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::AccessClaims;
    use crate::auth::jwt::sign_claims;

    const PRIVATE_PEM: &[u8] = include_bytes!("../../tests/fixtures/rsa_private.pem");
    const PUBLIC_PEM: &[u8] = include_bytes!("../../tests/fixtures/rsa_public.pem");

    fn ring() -> KeyRing {
        let ring = KeyRing::new();
        ring.add_hmac_key("key1", "sdfsdfsdfsdfasdfdsfasdfsdfasdf").unwrap();
        ring.add_rsa_key("rsa1", PRIVATE_PEM, PUBLIC_PEM).unwrap();
        ring
    }

    fn sign_with(ring: &KeyRing, key_id: &str) -> String {
        let key = ring.identity(key_id, Validity::default()).unwrap().resolve().unwrap();
        sign_claims(&key, &AccessClaims::new("alice", "iss", "aud", "", None, 600)).unwrap()
    }

    #[test]
    fn test_identity_lookup() {
        let ring = ring();
        let identity = ring.identity("rsa1", Validity::new(900, 0)).unwrap();

        assert_eq!(identity.key_id(), "rsa1");
        assert_eq!(identity.algorithm(), Algorithm::RS256);
        assert_eq!(identity.validity(), Validity::new(900, 0));
    }

    #[test]
    fn test_unknown_key_id() {
        assert!(matches!(
            ring().identity("missing", Validity::default()),
            Err(TokenError::KeyResolution(_))
        ));
    }

    #[test]
    fn test_verify_picks_key_by_kid() {
        let ring = ring();

        assert_eq!(ring.verify(&sign_with(&ring, "key1")).unwrap()["sub"], "alice");
        assert_eq!(ring.verify(&sign_with(&ring, "rsa1")).unwrap()["sub"], "alice");
    }

    #[test]
    fn test_removed_key_no_longer_verifies() {
        let ring = ring();
        let token = sign_with(&ring, "key1");

        assert!(ring.remove_key("key1"));
        assert!(!ring.contains("key1"));
        assert!(matches!(ring.verify(&token), Err(VerifyError::Invalid(_))));
    }

    #[test]
    fn test_broken_key_not_reported_as_unknown() {
        let ring = KeyRing::new();
        ring.add_rsa_key("rsa1", "garbage", "garbage").unwrap();
        let key = SigningIdentity::rsa("rsa1", PRIVATE_PEM, PUBLIC_PEM, Algorithm::RS256)
            .resolve()
            .unwrap();
        let token = sign_claims(&key, &AccessClaims::new("alice", "iss", "aud", "", None, 600)).unwrap();

        match ring.verify(&token) {
            Err(VerifyError::Invalid(reason)) => {
                assert!(reason.contains("unusable"), "{}", reason);
                assert!(!reason.contains("unknown key id"));
            }
            other => panic!("Expected invalid error, got {:?}", other),
        }
    }

    #[test]
    fn test_mismatched_algorithm_rejected() {
        let ring = KeyRing::new();
        let result = ring.add_key(
            "key1",
            KeyMaterial::Hmac {
                secret: b"secret".to_vec(),
            },
            Algorithm::RS256,
        );

        assert!(matches!(result, Err(TokenError::KeyResolution(_))));
    }
}
