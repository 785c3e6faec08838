//! Token Issuance
//!
//! Resolves the signing key, signs the access (and optional identity) claims,
//! and persists renewal state when refresh tokens are enabled. Issuance either
//! returns a complete bundle or fails; nothing partial is handed back.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::claims::TokenClaims;
use crate::auth::jwt::sign_claims;
use crate::auth::keys::SigningIdentity;
use crate::auth::refresh_token::{derive_record_id, encode_handle, log_tag};
use crate::context::RequestContext;
use crate::error::TokenError;
use crate::store::{RenewalRecord, TokenStore};

pub const TOKEN_TYPE: &str = "Bearer";

/// Token response body (RFC 6749 section 5.1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialBundle {
    pub access_token: String,
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

impl CredentialBundle {
    pub(crate) fn new(access_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            token_type: TOKEN_TYPE.to_string(),
            id_token: None,
            refresh_token: None,
            expires_in,
        }
    }
}

/// Issues and renews credentials against one token store.
///
/// Holds no per-subject state. Cloning is cheap and clones share the store.
#[derive(Clone)]
pub struct TokenService {
    store: Arc<dyn TokenStore>,
}

impl TokenService {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// Sign `claims` with `identity` and, if refresh tokens are enabled,
    /// persist a renewal record for the new access token.
    ///
    /// # Errors
    /// - `TokenError::InvalidLifetime` if the identity's lifetimes are out of range
    /// - `TokenError::KeyResolution` if the identity's key material is unusable
    /// - `TokenError::Signing` if signing fails
    /// - `TokenError::Store` if the renewal record cannot be written
    pub async fn issue(
        &self,
        ctx: &RequestContext,
        identity: &SigningIdentity,
        claims: &TokenClaims,
    ) -> Result<CredentialBundle, TokenError> {
        let validity = identity.validity();
        validity.check().map_err(|e| {
            tracing::error!(key_id = %identity.key_id(), error = %e, "Token lifetimes rejected");
            e
        })?;

        let key = identity.resolve().map_err(|e| {
            tracing::error!(key_id = %identity.key_id(), error = %e, "Signing key unusable");
            e
        })?;

        let access_token = sign_claims(&key, &claims.access)?;
        let mut bundle = CredentialBundle::new(access_token, validity.access_expires_in);

        if let Some(identity_claims) = &claims.identity {
            bundle.id_token = Some(sign_claims(&key, identity_claims)?);
        }

        if validity.issues_refresh_tokens() {
            let expiry = TimeDelta::try_seconds(validity.refresh_expires_in)
                .and_then(|window| Utc::now().checked_add_signed(window))
                .ok_or_else(|| {
                    TokenError::InvalidLifetime(format!(
                        "refresh token lifetime out of range: {}",
                        validity.refresh_expires_in
                    ))
                })?;

            let record_id = derive_record_id(&bundle.access_token);
            let record = RenewalRecord {
                record_id: record_id.clone(),
                access_token: bundle.access_token.clone(),
                id_token: bundle.id_token.clone(),
                expiry,
            };

            self.store.store(ctx, &record).await.map_err(|e| {
                tracing::error!(
                    subject = %claims.access.subject(),
                    error = %e,
                    "Failed to persist renewal record"
                );
                TokenError::from(e)
            })?;

            tracing::debug!(record = %log_tag(&record_id), expiry = %record.expiry, "Renewal record stored");
            bundle.refresh_token = Some(encode_handle(&record_id));
        }

        tracing::info!(
            subject = %claims.access.subject(),
            key_id = %identity.key_id(),
            refreshable = bundle.refresh_token.is_some(),
            "Token issued"
        );

        Ok(bundle)
    }
}
