//! Postgres token store.
//!
//! Rows are keyed by the SHA-256 digest of the record id, so a database
//! dump does not hand out usable refresh tokens. Every query runs under the
//! caller's `RequestContext`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::{RenewalRecord, TokenStore};
use crate::auth::refresh_token::{hash_record_id, log_tag};
use crate::configuration::DatabaseSettings;
use crate::context::RequestContext;
use crate::error::StoreError;

#[derive(Debug, Clone)]
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool for `settings`.
    ///
    /// # Errors
    /// Returns `StoreError::Io` if the database cannot be reached
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self, StoreError> {
        tracing::info!(
            host = %settings.host,
            database = %settings.database_name,
            "Connecting token store to Postgres"
        );

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .connect(&settings.connection_string())
            .await
            .map_err(|e| {
                tracing::error!("Failed to create connection pool: {}", e);
                StoreError::Io(format!("failed to connect to database: {}", e))
            })?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn create(&self, ctx: &RequestContext) -> Result<(), StoreError> {
        ctx.run(async {
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS oauth_access_tokens (
                    id BIGSERIAL PRIMARY KEY,
                    resource_owner_id TEXT NOT NULL UNIQUE,
                    access_token TEXT NOT NULL,
                    id_token TEXT,
                    expiry TIMESTAMPTZ NOT NULL
                )
                "#,
            )
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Io(format!("failed to create table: {}", e)))?;
            Ok(())
        })
        .await
    }

    async fn store(&self, ctx: &RequestContext, record: &RenewalRecord) -> Result<(), StoreError> {
        let key = hash_record_id(&record.record_id);

        ctx.run(async {
            sqlx::query(
                r#"
                INSERT INTO oauth_access_tokens (resource_owner_id, access_token, id_token, expiry)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (resource_owner_id)
                DO UPDATE SET access_token = EXCLUDED.access_token,
                              id_token = EXCLUDED.id_token,
                              expiry = EXCLUDED.expiry
                "#,
            )
            .bind(&key)
            .bind(&record.access_token)
            .bind(&record.id_token)
            .bind(record.expiry)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Io(format!("failed to store token info: {}", e)))?;
            Ok(())
        })
        .await
    }

    async fn get(&self, ctx: &RequestContext, record_id: &str) -> Result<RenewalRecord, StoreError> {
        let key = hash_record_id(record_id);

        let row = ctx
            .run(async {
                sqlx::query_as::<_, (String, Option<String>, DateTime<Utc>)>(
                    r#"
                    SELECT access_token, id_token, expiry
                    FROM oauth_access_tokens
                    WHERE resource_owner_id = $1
                    "#,
                )
                .bind(&key)
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::from)
            })
            .await?;

        match row {
            Some((access_token, id_token, expiry)) => Ok(RenewalRecord {
                record_id: record_id.to_string(),
                access_token,
                id_token,
                expiry,
            }),
            None => {
                tracing::debug!(record = %log_tag(record_id), "Renewal record not found in database");
                Err(StoreError::NotFound("token info not found".to_string()))
            }
        }
    }

    async fn update(
        &self,
        ctx: &RequestContext,
        record_id: &str,
        access_token: &str,
        id_token: Option<&str>,
    ) -> Result<(), StoreError> {
        let key = hash_record_id(record_id);

        let result = ctx
            .run(async {
                sqlx::query(
                    r#"
                    UPDATE oauth_access_tokens
                    SET access_token = $1, id_token = $2
                    WHERE resource_owner_id = $3
                    "#,
                )
                .bind(access_token)
                .bind(id_token)
                .bind(&key)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Io(format!("failed to update token info: {}", e)))
            })
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("token info not found".to_string()));
        }
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
