use std::str::FromStr;

use config::ConfigError;
use jsonwebtoken::Algorithm;

use crate::auth::Validity;
use crate::auth::{DEFAULT_ACCESS_EXPIRES_IN, DEFAULT_REFRESH_EXPIRES_IN};
use crate::error::TokenError;

#[derive(serde::Deserialize, Clone, Debug)]
pub struct Settings {
    pub tokens: TokenSettings,
    /// Absent means renewal records live in memory only.
    #[serde(default)]
    pub database: Option<DatabaseSettings>,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }
}

/// Token issuance settings
#[derive(serde::Deserialize, Clone, Debug)]
pub struct TokenSettings {
    pub issuer: String,
    pub audience: String,
    pub key_id: String,
    /// JOSE algorithm name, e.g. "HS256" or "RS256"
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry: i64, // seconds (e.g., 900 for 15 minutes)
    #[serde(default = "default_refresh_token_expiry")]
    pub refresh_token_expiry: i64, // seconds, 0 disables refresh tokens
}

fn default_algorithm() -> String {
    "HS256".to_string()
}

fn default_access_token_expiry() -> i64 {
    DEFAULT_ACCESS_EXPIRES_IN
}

fn default_refresh_token_expiry() -> i64 {
    DEFAULT_REFRESH_EXPIRES_IN
}

impl TokenSettings {
    /// # Errors
    /// Returns `TokenError::InvalidLifetime` if either lifetime is out of range
    pub fn validity(&self) -> Result<Validity, TokenError> {
        let validity = Validity::new(self.access_token_expiry, self.refresh_token_expiry);
        validity.check()?;
        Ok(validity)
    }

    /// # Errors
    /// Returns `TokenError::KeyResolution` for an unknown algorithm name
    pub fn algorithm(&self) -> Result<Algorithm, TokenError> {
        Algorithm::from_str(&self.algorithm).map_err(|_| {
            TokenError::KeyResolution(format!("unknown signing algorithm: {}", self.algorithm))
        })
    }
}

/// Load settings from an optional `configuration` file, overridden by
/// `APP__`-prefixed environment variables (e.g. `APP__TOKENS__ISSUER`).
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;
    settings.try_deserialize::<Settings>()
}
