//! JWT Signing and Verification
//!
//! Signing embeds the signing identity's key id in the JOSE header so a
//! verifier holding several keys can pick the right one. Verification
//! pins the algorithm family before the key is ever used, and reports an
//! expired-but-otherwise-valid token separately from every other failure.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, encode, Header, Validation};
use serde::Serialize;

use crate::auth::claims::ClaimMap;
use crate::auth::keys::{AlgorithmFamily, ResolvedKey};
use crate::error::{TokenError, VerifyError};

/// Sign `claims` with `key`, stamping the key id into the header.
///
/// # Errors
/// Returns `TokenError::Signing` if the key is verification-only or the
/// signer rejects the key or the claims
pub fn sign_claims<T: Serialize>(key: &ResolvedKey, claims: &T) -> Result<String, TokenError> {
    let encoding_key = key.encoding_key().ok_or_else(|| {
        TokenError::Signing(format!("key {} has no private part", key.key_id()))
    })?;

    let mut header = Header::new(key.algorithm());
    header.kid = Some(key.key_id().to_string());

    encode(&header, claims, encoding_key)
        .map_err(|e| TokenError::Signing(format!("failed to sign token: {}", e)))
}

/// Validates credentials signed by one key.
#[derive(Debug, Clone)]
pub struct Verifier {
    key: ResolvedKey,
    issuer: Option<String>,
    audience: Option<String>,
}

impl Verifier {
    pub fn new(key: ResolvedKey) -> Self {
        Self {
            key,
            issuer: None,
            audience: None,
        }
    }

    /// Require the `iss` claim to equal `issuer`.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Require the `aud` claim to equal `audience`.
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn family(&self) -> AlgorithmFamily {
        self.key.family()
    }

    /// Parse and validate `token`, returning its claims.
    ///
    /// # Errors
    /// - `VerifyError::Invalid` for a malformed token, a header algorithm
    ///   outside this verifier's family, a bad signature, or a failed
    ///   issuer/audience/required-claim check
    /// - `VerifyError::Expired` when everything checks out except `exp`
    pub fn verify(&self, token: &str) -> Result<ClaimMap, VerifyError> {
        let header = decode_header(token)?;

        // An HS* token presented to an RSA verifier (or the reverse) must be
        // rejected here, before any key is handed to the decoder.
        match AlgorithmFamily::of(header.alg) {
            Ok(family) if family == self.key.family() => {}
            _ => {
                return Err(VerifyError::Invalid(format!(
                    "unexpected signing method: {:?}",
                    header.alg
                )))
            }
        }

        let mut validation = self.validation();
        match decode::<ClaimMap>(token, self.key.decoding_key(), &validation) {
            Ok(data) => Ok(data.claims),
            Err(err) if matches!(err.kind(), ErrorKind::ExpiredSignature) => {
                // The signature already verified; re-run every other check
                // with expiry disabled to recover trustworthy claims.
                validation.validate_exp = false;
                let data = decode::<ClaimMap>(token, self.key.decoding_key(), &validation)?;
                Err(VerifyError::Expired {
                    claims: data.claims,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(self.key.algorithm());
        validation.algorithms = self.key.family().algorithms();
        validation.leeway = 0;
        validation.validate_exp = true;

        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        validation
    }
}

/// One-shot verification with a resolved key and no issuer/audience pinning.
pub fn verify_token(token: &str, key: &ResolvedKey) -> Result<ClaimMap, VerifyError> {
    Verifier::new(key.clone()).verify(token)
}
