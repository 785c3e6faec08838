//! Refresh Token Handles
//!
//! A refresh token is an opaque handle derived from the access token it was
//! issued with:
//! - the record id is a name-based (v5) UUID of the access token bytes
//! - the handle handed to clients is the record id, base64url encoded without padding
//! - the durable store keys rows by the SHA-256 of the record id, never the id itself
//!
//! Derivation is deterministic. Two identical access tokens (same claims,
//! same second) produce the same handle.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::TokenError;

/// Namespace for refresh handle ids.
const REFRESH_HANDLE_NAMESPACE: Uuid = Uuid::from_u128(0x5c1f_0a3e_8d2b_4b7e_9a61_3f0c_2d4e_7b18);

/// Derive the renewal record id for an access token.
pub fn derive_record_id(access_token: &str) -> String {
    Uuid::new_v5(&REFRESH_HANDLE_NAMESPACE, access_token.as_bytes()).to_string()
}

/// Encode a record id into the handle given to the client.
pub fn encode_handle(record_id: &str) -> String {
    URL_SAFE_NO_PAD.encode(record_id.as_bytes())
}

/// Decode a client-presented handle back into a record id.
///
/// Padded input is tolerated.
///
/// # Errors
/// Returns `TokenError::HandleDecode` if the handle is not base64url or does
/// not decode to a record id this engine could have issued
pub fn decode_handle(handle: &str) -> Result<String, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(handle.trim_end_matches('='))
        .map_err(|e| TokenError::HandleDecode(format!("failed to decode token: {}", e)))?;

    let record_id = String::from_utf8(bytes)
        .map_err(|_| TokenError::HandleDecode("handle is not valid UTF-8".to_string()))?;

    Uuid::parse_str(&record_id)
        .map_err(|_| TokenError::HandleDecode("handle does not name a record".to_string()))?;

    Ok(record_id)
}

/// Hash a record id using SHA-256
///
/// Never store plaintext handles in the database.
pub(crate) fn hash_record_id(record_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(record_id.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Short, non-reversible tag for log lines.
pub(crate) fn log_tag(record_id: &str) -> String {
    hash_record_id(record_id)[..12].to_string()
}
