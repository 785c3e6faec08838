//! In-memory token store.
//!
//! One mutex guards the whole map, so every operation serializes against
//! every other. Read-after-write is consistent within the process. Records
//! are lost when the process exits.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{RenewalRecord, TokenStore};
use crate::context::RequestContext;
use crate::error::StoreError;

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    records: Mutex<HashMap<String, RenewalRecord>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn create(&self, _ctx: &RequestContext) -> Result<(), StoreError> {
        Ok(())
    }

    async fn store(&self, _ctx: &RequestContext, record: &RenewalRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .insert(record.record_id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, _ctx: &RequestContext, record_id: &str) -> Result<RenewalRecord, StoreError> {
        self.records
            .lock()
            .get(record_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("token info not found".to_string()))
    }

    async fn update(
        &self,
        _ctx: &RequestContext,
        record_id: &str,
        access_token: &str,
        id_token: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut records = self.records.lock();
        let record = records
            .get_mut(record_id)
            .ok_or_else(|| StoreError::NotFound("token info not found".to_string()))?;

        record.access_token = access_token.to_string();
        record.id_token = id_token.map(str::to_string);
        Ok(())
    }

    async fn close(&self) {
        self.records.lock().clear();
    }
}
