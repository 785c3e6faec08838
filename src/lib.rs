//! Issues, signs and renews bearer credentials.
//!
//! `TokenService` turns a `SigningIdentity` and a claim set into an access
//! token, an optional identity token and an opaque refresh handle, and later
//! exchanges that handle for a fresh access token. Renewal state lives in a
//! `TokenStore`, either in memory or in Postgres.

pub mod auth;
pub mod configuration;
pub mod context;
pub mod error;
pub mod store;
pub mod telemetry;

pub use auth::{CredentialBundle, SigningIdentity, TokenClaims, TokenService};
pub use context::RequestContext;
pub use error::{StoreError, TokenError, VerifyError};
pub use store::{MemoryTokenStore, PgTokenStore, RenewalRecord, TokenStore};
