//! Resource Owner Password Credentials Grant (RFC 6749 section 4.3)
//!
//! Checking the password is the caller's job: `password_grant` hands the
//! request to an authenticator callback and issues tokens only if it
//! accepts the resource owner.

use serde::Deserialize;

use crate::auth::claims::{AccessClaims, IdentityProfile, TokenClaims};
use crate::auth::issuance::{CredentialBundle, TokenService};
use crate::auth::keys::SigningIdentity;
use crate::context::RequestContext;
use crate::error::TokenError;

pub const PASSWORD_GRANT_TYPE: &str = "password";

/// Token request form fields
#[derive(Deserialize, Clone)]
pub struct PasswordGrantRequest {
    pub grant_type: String,
    pub username: String,
    pub password: String,
    /// Becomes the `aud` claim
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub scope: String,
}

impl std::fmt::Debug for PasswordGrantRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordGrantRequest")
            .field("grant_type", &self.grant_type)
            .field("username", &self.username)
            .field("client_id", &self.client_id)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// What the authenticator learned about an accepted resource owner.
#[derive(Debug, Clone, Default)]
pub struct AuthenticatedOwner {
    pub roles: Option<Vec<String>>,
    /// Set to also issue an identity token.
    pub profile: Option<IdentityProfile>,
}

impl TokenService {
    /// Run the password grant.
    ///
    /// # Arguments
    /// * `issuer` - Value for the `iss` claim, usually the public origin of the server
    /// * `request` - Parsed token request
    /// * `authenticate` - Checks username and password; returns
    ///   `Err(TokenError::InvalidCredentials)` to reject
    ///
    /// # Errors
    /// - `TokenError::UnsupportedGrantType` unless `grant_type` is `password`
    /// - whatever `authenticate` returns
    /// - any error from `TokenService::issue`
    pub async fn password_grant<F>(
        &self,
        ctx: &RequestContext,
        identity: &SigningIdentity,
        issuer: &str,
        request: &PasswordGrantRequest,
        authenticate: F,
    ) -> Result<CredentialBundle, TokenError>
    where
        F: FnOnce(&str, &str) -> Result<AuthenticatedOwner, TokenError>,
    {
        if request.grant_type != PASSWORD_GRANT_TYPE {
            tracing::warn!(grant_type = %request.grant_type, "Unsupported grant type");
            return Err(TokenError::UnsupportedGrantType(request.grant_type.clone()));
        }

        let owner = authenticate(&request.username, &request.password).map_err(|e| {
            tracing::warn!(username = %request.username, error = %e, "Resource owner rejected");
            e
        })?;

        let access = AccessClaims::new(
            &request.username,
            issuer,
            &request.client_id,
            &request.scope,
            owner.roles,
            identity.validity().access_expires_in,
        );
        let mut claims = TokenClaims::new(access);
        if let Some(profile) = owner.profile {
            claims = claims.with_identity(profile);
        }

        self.issue(ctx, identity, &claims).await
    }
}
