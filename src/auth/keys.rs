//! Signing Identity and Key Resolution
//!
//! A `SigningIdentity` names the key id, key material, algorithm and token
//! lifetimes used for one request. Resolution turns the raw material into
//! jsonwebtoken encoding/decoding keys for the algorithm's family.

use std::fmt;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};

use crate::error::TokenError;

/// Default access token lifetime (10 minutes)
pub const DEFAULT_ACCESS_EXPIRES_IN: i64 = 10 * 60;
/// Default refresh token lifetime (1 hour)
pub const DEFAULT_REFRESH_EXPIRES_IN: i64 = 60 * 60;
/// Longest lifetime accepted for either token (10 years)
pub const MAX_LIFETIME_SECONDS: i64 = 10 * 365 * 24 * 60 * 60;

/// Token lifetimes in seconds.
///
/// A non-positive `refresh_expires_in` disables refresh tokens entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub struct Validity {
    pub access_expires_in: i64,
    pub refresh_expires_in: i64,
}

impl Validity {
    pub fn new(access_expires_in: i64, refresh_expires_in: i64) -> Self {
        Self {
            access_expires_in,
            refresh_expires_in,
        }
    }

    pub fn issues_refresh_tokens(&self) -> bool {
        self.refresh_expires_in > 0
    }

    /// # Errors
    /// Returns `TokenError::InvalidLifetime` unless the access lifetime is in
    /// `1..=MAX_LIFETIME_SECONDS` and the refresh lifetime is at most
    /// `MAX_LIFETIME_SECONDS`
    pub fn check(&self) -> Result<(), TokenError> {
        if !(1..=MAX_LIFETIME_SECONDS).contains(&self.access_expires_in) {
            return Err(TokenError::InvalidLifetime(format!(
                "access token lifetime out of range: {}",
                self.access_expires_in
            )));
        }
        if self.refresh_expires_in > MAX_LIFETIME_SECONDS {
            return Err(TokenError::InvalidLifetime(format!(
                "refresh token lifetime out of range: {}",
                self.refresh_expires_in
            )));
        }
        Ok(())
    }
}

impl Default for Validity {
    fn default() -> Self {
        Self::new(DEFAULT_ACCESS_EXPIRES_IN, DEFAULT_REFRESH_EXPIRES_IN)
    }
}

/// Algorithm families this engine signs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmFamily {
    Hmac,
    Rsa,
}

impl AlgorithmFamily {
    /// Classify an algorithm by its JOSE name prefix: `HS*` is HMAC, `RS*`
    /// is RSA PKCS#1 v1.5. Anything else is unsupported.
    pub fn of(algorithm: Algorithm) -> Result<Self, TokenError> {
        let name = format!("{:?}", algorithm);
        if name.starts_with("HS") {
            Ok(AlgorithmFamily::Hmac)
        } else if name.starts_with("RS") {
            Ok(AlgorithmFamily::Rsa)
        } else {
            Err(TokenError::KeyResolution(format!(
                "unsupported signing algorithm: {}",
                name
            )))
        }
    }

    /// Every algorithm of this family a verifier will accept.
    pub fn algorithms(self) -> Vec<Algorithm> {
        match self {
            AlgorithmFamily::Hmac => vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512],
            AlgorithmFamily::Rsa => vec![Algorithm::RS256, Algorithm::RS384, Algorithm::RS512],
        }
    }
}

impl fmt::Display for AlgorithmFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlgorithmFamily::Hmac => write!(f, "HMAC"),
            AlgorithmFamily::Rsa => write!(f, "RSA"),
        }
    }
}

/// Raw key material, tagged by family.
#[derive(Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    Hmac {
        secret: Vec<u8>,
    },
    /// PEM encoded keys. The private key may be PKCS#1 or PKCS#8, the public
    /// key a `PUBLIC KEY` or `RSA PUBLIC KEY` block.
    Rsa {
        private_pem: Vec<u8>,
        public_pem: Vec<u8>,
    },
}

impl KeyMaterial {
    pub fn family(&self) -> AlgorithmFamily {
        match self {
            KeyMaterial::Hmac { .. } => AlgorithmFamily::Hmac,
            KeyMaterial::Rsa { .. } => AlgorithmFamily::Rsa,
        }
    }
}

// Key bytes never reach logs or panic messages.
impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMaterial::Hmac { .. } => f.write_str("KeyMaterial::Hmac { .. }"),
            KeyMaterial::Rsa { .. } => f.write_str("KeyMaterial::Rsa { .. }"),
        }
    }
}

/// Key id, key material, algorithm and lifetimes for one request.
#[derive(Debug, Clone)]
pub struct SigningIdentity {
    key_id: String,
    material: KeyMaterial,
    algorithm: Algorithm,
    validity: Validity,
}

impl SigningIdentity {
    pub fn new(key_id: impl Into<String>, material: KeyMaterial, algorithm: Algorithm) -> Self {
        Self {
            key_id: key_id.into(),
            material,
            algorithm,
            validity: Validity::default(),
        }
    }

    pub fn hmac(key_id: impl Into<String>, secret: impl Into<Vec<u8>>, algorithm: Algorithm) -> Self {
        Self::new(
            key_id,
            KeyMaterial::Hmac {
                secret: secret.into(),
            },
            algorithm,
        )
    }

    pub fn rsa(
        key_id: impl Into<String>,
        private_pem: impl Into<Vec<u8>>,
        public_pem: impl Into<Vec<u8>>,
        algorithm: Algorithm,
    ) -> Self {
        Self::new(
            key_id,
            KeyMaterial::Rsa {
                private_pem: private_pem.into(),
                public_pem: public_pem.into(),
            },
            algorithm,
        )
    }

    pub fn with_validity(mut self, validity: Validity) -> Self {
        self.validity = validity;
        self
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn material(&self) -> &KeyMaterial {
        &self.material
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn validity(&self) -> Validity {
        self.validity
    }

    /// Resolve the key material into signing and verification keys.
    pub fn resolve(&self) -> Result<ResolvedKey, TokenError> {
        resolve_key(self)
    }
}

/// Key material parsed for one algorithm family.
///
/// A key built from a public key alone verifies but cannot sign.
#[derive(Clone)]
pub struct ResolvedKey {
    key_id: String,
    algorithm: Algorithm,
    family: AlgorithmFamily,
    encoding: Option<EncodingKey>,
    decoding: DecodingKey,
}

impl ResolvedKey {
    /// Verification-only key from an RSA public key PEM.
    ///
    /// # Errors
    /// Returns `TokenError::KeyResolution` if `algorithm` is not `RS*` or the
    /// PEM is not a public key
    pub fn rsa_public(
        key_id: impl Into<String>,
        algorithm: Algorithm,
        public_pem: &[u8],
    ) -> Result<Self, TokenError> {
        let family = AlgorithmFamily::of(algorithm)?;
        if family != AlgorithmFamily::Rsa {
            return Err(TokenError::KeyResolution(format!(
                "{:?} cannot verify with an RSA public key",
                algorithm
            )));
        }

        Ok(Self {
            key_id: key_id.into(),
            algorithm,
            family,
            encoding: None,
            decoding: rsa_decoding_key(public_pem)?,
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn family(&self) -> AlgorithmFamily {
        self.family
    }

    /// `None` for a verification-only key.
    pub fn encoding_key(&self) -> Option<&EncodingKey> {
        self.encoding.as_ref()
    }

    pub fn can_sign(&self) -> bool {
        self.encoding.is_some()
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }
}

impl fmt::Debug for ResolvedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedKey")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .field("family", &self.family)
            .field("can_sign", &self.can_sign())
            .finish_non_exhaustive()
    }
}

/// Turn a signing identity into usable keys.
///
/// # Errors
/// Returns `TokenError::KeyResolution` if:
/// - the algorithm is neither `HS*` nor `RS*`
/// - the key material belongs to a different family than the algorithm
/// - a PEM block fails to decode or holds the wrong kind of key
pub fn resolve_key(identity: &SigningIdentity) -> Result<ResolvedKey, TokenError> {
    let family = AlgorithmFamily::of(identity.algorithm)?;

    if family != identity.material.family() {
        return Err(TokenError::KeyResolution(format!(
            "{:?} requires {} key material, got {}",
            identity.algorithm,
            family,
            identity.material.family()
        )));
    }

    let (encoding, decoding) = match &identity.material {
        KeyMaterial::Hmac { secret } => {
            if secret.is_empty() {
                return Err(TokenError::KeyResolution("empty HMAC secret".to_string()));
            }
            (
                EncodingKey::from_secret(secret),
                DecodingKey::from_secret(secret),
            )
        }
        KeyMaterial::Rsa {
            private_pem,
            public_pem,
        } => {
            expect_pem_label(private_pem, &["RSA PRIVATE KEY", "PRIVATE KEY"])?;
            let encoding = EncodingKey::from_rsa_pem(private_pem).map_err(|e| {
                TokenError::KeyResolution(format!("error parsing RSA private key: {}", e))
            })?;
            (encoding, rsa_decoding_key(public_pem)?)
        }
    };

    Ok(ResolvedKey {
        key_id: identity.key_id.clone(),
        algorithm: identity.algorithm,
        family,
        encoding: Some(encoding),
        decoding,
    })
}

fn rsa_decoding_key(public_pem: &[u8]) -> Result<DecodingKey, TokenError> {
    expect_pem_label(public_pem, &["PUBLIC KEY", "RSA PUBLIC KEY"])?;
    DecodingKey::from_rsa_pem(public_pem)
        .map_err(|e| TokenError::KeyResolution(format!("error parsing RSA public key: {}", e)))
}

/// jsonwebtoken classifies PEM blocks loosely, so the block label is
/// checked first.
fn expect_pem_label(pem: &[u8], accepted: &[&str]) -> Result<(), TokenError> {
    let text = std::str::from_utf8(pem)
        .map_err(|_| TokenError::KeyResolution("PEM data is not UTF-8".to_string()))?;

    let label = text
        .split("-----BEGIN ")
        .nth(1)
        .and_then(|rest| rest.split("-----").next())
        .ok_or_else(|| {
            TokenError::KeyResolution("failed to decode PEM block".to_string())
        })?;

    if accepted.contains(&label) {
        Ok(())
    } else {
        Err(TokenError::KeyResolution(format!(
            "unexpected PEM block type: {}",
            label
        )))
    }
}
