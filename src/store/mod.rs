//! Token Store
//!
//! Persistence for renewal records, keyed by renewal record id. The engine
//! never deletes records; expiry is checked lazily at renewal time and any
//! eviction is left to the backend.

mod memory;
mod postgres;

pub use memory::MemoryTokenStore;
pub use postgres::PgTokenStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::context::RequestContext;
use crate::error::StoreError;

/// Renewal state for one refresh handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewalRecord {
    /// Decoded refresh handle (see `auth::decode_handle`).
    pub record_id: String,
    /// Access token most recently issued under this handle
    pub access_token: String,
    /// Identity token most recently issued under this handle, if any
    pub id_token: Option<String>,
    /// End of the renewal window. Never moved by a renewal.
    pub expiry: DateTime<Utc>,
}

impl RenewalRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry
    }
}

/// Storage backend for renewal records.
///
/// Every operation takes the caller's `RequestContext`. Backends doing I/O
/// must honor its cancellation signal and deadline.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Prepare the backend. Idempotent.
    async fn create(&self, ctx: &RequestContext) -> Result<(), StoreError>;

    /// Persist a new record, replacing any record with the same id.
    async fn store(&self, ctx: &RequestContext, record: &RenewalRecord) -> Result<(), StoreError>;

    /// # Errors
    /// `StoreError::NotFound` if no record has this id
    async fn get(&self, ctx: &RequestContext, record_id: &str) -> Result<RenewalRecord, StoreError>;

    /// Replace the tokens of an existing record. Id and expiry are untouched.
    ///
    /// # Errors
    /// `StoreError::NotFound` if no record has this id
    async fn update(
        &self,
        ctx: &RequestContext,
        record_id: &str,
        access_token: &str,
        id_token: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Release backend resources.
    async fn close(&self);
}
