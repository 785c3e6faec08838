//! JWT Claims structures
//!
//! Access claims carry the registered claims plus scope and roles. Identity
//! claims copy the registered claims of an access claim set and add the
//! OpenID Connect profile attributes supplied by the caller.

use serde::{Deserialize, Serialize};

/// Claim payload as parsed back out of a verified credential.
pub type ClaimMap = serde_json::Map<String, serde_json::Value>;

/// Registered claims (RFC 7519) shared by access and identity credentials.
///
/// Invariant: `exp == iat + lifetime` (saturating), with `iat` taken fresh on every
/// issuance and renewal.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct StandardClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    /// Issued at (Unix timestamp, seconds)
    pub iat: i64,
    /// Expiration time (Unix timestamp, seconds)
    pub exp: i64,
}

impl StandardClaims {
    pub fn new(subject: &str, issuer: &str, audience: &str, lifetime_seconds: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            iss: issuer.to_string(),
            aud: audience.to_string(),
            sub: subject.to_string(),
            iat: now,
            exp: now.saturating_add(lifetime_seconds),
        }
    }
}

/// Claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AccessClaims {
    #[serde(flatten)]
    pub standard: StandardClaims,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

impl AccessClaims {
    /// Build access claims issued now and expiring `lifetime_seconds` later.
    ///
    /// # Arguments
    /// * `subject` - Resource owner identifier
    /// * `issuer` - Issuer identifier
    /// * `audience` - Client the token is meant for
    /// * `scope` - Space separated scope string, may be empty
    /// * `roles` - Ordered role list, omitted from the token when `None`
    /// * `lifetime_seconds` - Access token lifetime
    pub fn new(
        subject: &str,
        issuer: &str,
        audience: &str,
        scope: &str,
        roles: Option<Vec<String>>,
        lifetime_seconds: i64,
    ) -> Self {
        Self {
            standard: StandardClaims::new(subject, issuer, audience, lifetime_seconds),
            scope: scope.to_string(),
            roles,
        }
    }

    pub fn subject(&self) -> &str {
        &self.standard.sub
    }
}

/// Profile attributes for an identity token, provided by whoever
/// authenticated the resource owner.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct IdentityProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
}

/// Claims for identity tokens
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct IdentityClaims {
    #[serde(flatten)]
    pub standard: StandardClaims,
    #[serde(flatten)]
    pub profile: IdentityProfile,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

impl IdentityClaims {
    /// Copy issuer, audience, subject, timestamps, scope and roles from
    /// `access` and attach `profile`.
    pub fn from_access(access: &AccessClaims, profile: IdentityProfile) -> Self {
        Self {
            standard: access.standard.clone(),
            profile,
            scope: access.scope.clone(),
            roles: access.roles.clone(),
        }
    }
}

/// The claim sets for one issuance request.
///
/// Built by the caller for each request and handed to the issuer; nothing
/// about a subject's identity claims is remembered between requests.
#[derive(Debug, Clone)]
pub struct TokenClaims {
    pub access: AccessClaims,
    pub identity: Option<IdentityClaims>,
}

impl TokenClaims {
    pub fn new(access: AccessClaims) -> Self {
        Self {
            access,
            identity: None,
        }
    }

    /// Attach an identity claim set derived from the access claims.
    pub fn with_identity(mut self, profile: IdentityProfile) -> Self {
        self.identity = Some(IdentityClaims::from_access(&self.access, profile));
        self
    }
}

/// Overwrite `iat`/`exp` in a parsed claim map, leaving every other claim untouched.
pub(crate) fn refresh_timestamps(claims: &mut ClaimMap, issued_at: i64, lifetime_seconds: i64) {
    claims.insert("iat".to_string(), issued_at.into());
    claims.insert("exp".to_string(), issued_at.saturating_add(lifetime_seconds).into());
}
