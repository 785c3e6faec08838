//! Renewal Protocol
//!
//! Exchanges a refresh handle for a fresh access token. The previous access
//! token must still verify under the signing key; being expired is the only
//! failure tolerated. The handle is returned unchanged and the renewal window
//! of its record is never extended.

use chrono::Utc;

use crate::auth::claims::{refresh_timestamps, ClaimMap};
use crate::auth::issuance::{CredentialBundle, TokenService};
use crate::auth::jwt::{sign_claims, Verifier};
use crate::auth::keys::SigningIdentity;
use crate::auth::refresh_token::{decode_handle, log_tag};
use crate::context::RequestContext;
use crate::error::{TokenError, VerifyError};

impl TokenService {
    /// Renew the access token (and identity token, if one was issued) behind
    /// `refresh_token`.
    ///
    /// # Errors
    /// - `TokenError::HandleDecode` if `refresh_token` is malformed
    /// - `TokenError::Store` with `StoreError::NotFound` for an unknown handle
    /// - `TokenError::RenewalExpired` once the record's renewal window has closed
    /// - `TokenError::TokenInvalid` if a stored token fails verification for
    ///   any reason other than expiry
    /// - `TokenError::InvalidLifetime` if the identity's lifetimes are out of range
    /// - `TokenError::KeyResolution` / `TokenError::Signing` from re-signing
    pub async fn renew(
        &self,
        ctx: &RequestContext,
        identity: &SigningIdentity,
        refresh_token: &str,
    ) -> Result<CredentialBundle, TokenError> {
        let record_id = decode_handle(refresh_token)?;
        let tag = log_tag(&record_id);

        let record = self.store().get(ctx, &record_id).await.map_err(|e| {
            tracing::warn!(record = %tag, error = %e, "Renewal record lookup failed");
            TokenError::from(e)
        })?;

        let now = Utc::now();
        if record.is_expired_at(now) {
            tracing::info!(record = %tag, expiry = %record.expiry, "Refresh token expired");
            return Err(TokenError::RenewalExpired);
        }

        let validity = identity.validity();
        validity.check()?;
        let key = identity.resolve()?;
        let verifier = Verifier::new(key.clone());

        let mut access_claims = verified_claims(&verifier, &record.access_token).map_err(|e| {
            tracing::warn!(record = %tag, error = %e, "Stored access token failed verification");
            e
        })?;
        let id_claims = match &record.id_token {
            Some(token) => Some(verified_claims(&verifier, token).map_err(|e| {
                tracing::warn!(record = %tag, error = %e, "Stored identity token failed verification");
                e
            })?),
            None => None,
        };

        let lifetime = validity.access_expires_in;
        let issued_at = now.timestamp();
        refresh_timestamps(&mut access_claims, issued_at, lifetime);

        let mut bundle = CredentialBundle::new(sign_claims(&key, &access_claims)?, lifetime);
        if let Some(mut id_claims) = id_claims {
            refresh_timestamps(&mut id_claims, issued_at, lifetime);
            bundle.id_token = Some(sign_claims(&key, &id_claims)?);
        }

        self.store()
            .update(ctx, &record_id, &bundle.access_token, bundle.id_token.as_deref())
            .await?;

        let subject = access_claims
            .get("sub")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        tracing::info!(
            record = %tag,
            subject = %subject,
            key_id = %identity.key_id(),
            "Token renewed"
        );

        bundle.refresh_token = Some(refresh_token.to_string());
        Ok(bundle)
    }
}

/// Claims of a stored token, accepting it if it is valid or merely expired.
fn verified_claims(verifier: &Verifier, token: &str) -> Result<ClaimMap, TokenError> {
    match verifier.verify(token) {
        Ok(claims) => Ok(claims),
        Err(VerifyError::Expired { claims }) => Ok(claims),
        Err(VerifyError::Invalid(reason)) => Err(TokenError::TokenInvalid(reason)),
    }
}
