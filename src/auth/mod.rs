//! Credential issuance and renewal
//!
//! Key resolution, claims construction, JWT signing and verification,
//! refresh handle derivation, and the issue / renew / password-grant
//! operations of `TokenService`.

mod claims;
mod issuance;
mod jwt;
mod key_ring;
mod keys;
mod password_grant;
pub(crate) mod refresh_token;
mod renewal;

pub use claims::{AccessClaims, ClaimMap, IdentityClaims, IdentityProfile, StandardClaims, TokenClaims};
pub use issuance::{CredentialBundle, TokenService, TOKEN_TYPE};
pub use jwt::{sign_claims, verify_token, Verifier};
pub use key_ring::KeyRing;
pub use keys::{
    resolve_key, AlgorithmFamily, KeyMaterial, ResolvedKey, SigningIdentity, Validity,
    DEFAULT_ACCESS_EXPIRES_IN, DEFAULT_REFRESH_EXPIRES_IN,
};
pub use password_grant::{AuthenticatedOwner, PasswordGrantRequest, PASSWORD_GRANT_TYPE};
pub use refresh_token::{decode_handle, derive_record_id, encode_handle};
