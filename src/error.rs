//! Error Handling Module
//!
//! One taxonomy for the whole engine:
//! 1. Store errors (lookup misses, backend I/O, cancellation)
//! 2. Verification errors (the expired-vs-invalid split renewal branches on)
//! 3. The unified `TokenError` every public operation returns
//! 4. HTTP response mapping for the transport layer in front of the engine

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use thiserror::Error;

use crate::auth::ClaimMap;

/// ============================================================================
/// 1. STORE ERRORS
/// ============================================================================

/// Failures surfaced by a `TokenStore` backend.
///
/// `NotFound` is expected and recoverable by the caller. Every other
/// variant is fatal to the request but not to the process.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("renewal record not found: {0}")]
    NotFound(String),

    #[error("token store I/O failure: {0}")]
    Io(String),

    #[error("token store operation cancelled")]
    Cancelled,

    #[error("token store deadline exceeded")]
    DeadlineExceeded,
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("no matching row".to_string()),
            other => StoreError::Io(other.to_string()),
        }
    }
}

/// ============================================================================
/// 2. VERIFICATION ERRORS
/// ============================================================================

/// Result of a failed verification.
///
/// `Expired` is only produced once the signature, algorithm and every other
/// claim check have passed, so the carried claims are trustworthy.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("token expired")]
    Expired { claims: ClaimMap },
}

impl From<jsonwebtoken::errors::Error> for VerifyError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidToken => VerifyError::Invalid("malformed token".to_string()),
            ErrorKind::InvalidSignature => VerifyError::Invalid("bad signature".to_string()),
            ErrorKind::InvalidAlgorithm => {
                VerifyError::Invalid("algorithm not accepted".to_string())
            }
            ErrorKind::InvalidIssuer => VerifyError::Invalid("issuer mismatch".to_string()),
            ErrorKind::InvalidAudience => VerifyError::Invalid("audience mismatch".to_string()),
            ErrorKind::MissingRequiredClaim(claim) => {
                VerifyError::Invalid(format!("missing claim: {}", claim))
            }
            _ => VerifyError::Invalid(err.to_string()),
        }
    }
}

/// ============================================================================
/// 3. UNIFIED TOKEN ERROR
/// ============================================================================

#[derive(Debug, Error)]
pub enum TokenError {
    /// Bad or missing key material.
    #[error("key resolution failed: {0}")]
    KeyResolution(String),

    /// The signer rejected the claims or the key.
    #[error("signing failed: {0}")]
    Signing(String),

    /// A configured token lifetime is outside the accepted range.
    #[error("invalid token lifetime: {0}")]
    InvalidLifetime(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The presented renewal handle is not a handle this engine issued.
    #[error("malformed renewal handle: {0}")]
    HandleDecode(String),

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    /// The renewal window of the handle has closed. Terminal for that handle.
    #[error("renewal handle expired")]
    RenewalExpired,

    #[error("unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    #[error("invalid resource owner credentials")]
    InvalidCredentials,
}

impl TokenError {
    /// Machine-readable code, following RFC 6749 section 5.2 where one applies.
    pub fn code(&self) -> &'static str {
        match self {
            TokenError::KeyResolution(_)
            | TokenError::Signing(_)
            | TokenError::InvalidLifetime(_) => "server_error",
            TokenError::Store(StoreError::NotFound(_)) => "invalid_grant",
            TokenError::Store(_) => "temporarily_unavailable",
            TokenError::HandleDecode(_) | TokenError::RenewalExpired => "invalid_grant",
            TokenError::InvalidCredentials => "invalid_grant",
            TokenError::TokenInvalid(_) => "invalid_token",
            TokenError::UnsupportedGrantType(_) => "unsupported_grant_type",
        }
    }

    /// Description safe to hand back to a client. Internal details stay in the logs.
    fn public_description(&self) -> String {
        match self {
            TokenError::KeyResolution(_)
            | TokenError::Signing(_)
            | TokenError::InvalidLifetime(_) => "Token service misconfigured".to_string(),
            TokenError::Store(StoreError::NotFound(_)) => "Unknown refresh token".to_string(),
            TokenError::Store(_) => "Token storage temporarily unavailable".to_string(),
            other => other.to_string(),
        }
    }
}

/// ============================================================================
/// 4. HTTP RESPONSE MAPPING
/// ============================================================================

/// OAuth2-shaped error body.
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_description: String,
    /// Correlates the response with the server-side log line.
    pub error_id: String,
}

impl ResponseError for TokenError {
    fn status_code(&self) -> StatusCode {
        match self {
            TokenError::KeyResolution(_)
            | TokenError::Signing(_)
            | TokenError::InvalidLifetime(_) => StatusCode::INTERNAL_SERVER_ERROR,
            TokenError::Store(StoreError::NotFound(_)) => StatusCode::BAD_REQUEST,
            TokenError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            TokenError::TokenInvalid(_) => StatusCode::UNAUTHORIZED,
            TokenError::HandleDecode(_)
            | TokenError::RenewalExpired
            | TokenError::UnsupportedGrantType(_)
            | TokenError::InvalidCredentials => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error_id = uuid::Uuid::new_v4().to_string();
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error_id = %error_id, error = %self, "Token request failed");
        } else {
            tracing::warn!(error_id = %error_id, error = %self, "Token request rejected");
        }

        HttpResponse::build(status).json(ErrorResponse {
            error: self.code().to_string(),
            error_description: self.public_description(),
            error_id,
        })
    }
}
