//! Application configuration management.

use serde::Deserialize;

use crate::error::AppResult;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// JWT configuration.
    pub jwt: JwtSettings,
    /// Wallet projection configuration.
    #[serde(default)]
    pub wallet: WalletConfig,
    /// Collection settlement configuration.
    #[serde(default)]
    pub settlement: SettlementConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// JWT configuration for verifying identity-provider tokens.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtSettings {
    /// Shared secret used to verify token signatures.
    pub secret: String,
    /// Lifetime of tokens minted by [`crate::JwtService::issue`], in seconds.
    #[serde(default = "default_token_expiry")]
    pub token_expiry_secs: u64,
}

fn default_token_expiry() -> u64 {
    900 // 15 minutes
}

/// Wallet projection (write-through cache) configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// Maximum number of projects whose entry sets are cached.
    #[serde(default = "default_projection_capacity")]
    pub projection_capacity: u64,
    /// Seconds before a cached projection is refetched from the store.
    #[serde(default = "default_projection_ttl")]
    pub projection_ttl_secs: u64,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            projection_capacity: default_projection_capacity(),
            projection_ttl_secs: default_projection_ttl(),
        }
    }
}

fn default_projection_capacity() -> u64 {
    1_000
}

fn default_projection_ttl() -> u64 {
    60
}

/// Collection settlement configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SettlementConfig {
    /// Crop types whose closed collections produce Harvest/Sale records.
    #[serde(default = "default_harvest_sale_crop_types")]
    pub harvest_sale_crop_types: Vec<String>,
    /// Maximum number of collections kept as last-known state for the offline path.
    #[serde(default = "default_collection_cache_capacity")]
    pub collection_cache_capacity: u64,
    /// Seconds a last-known collection stays usable by the offline path.
    #[serde(default = "default_collection_cache_ttl")]
    pub collection_cache_ttl_secs: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            harvest_sale_crop_types: default_harvest_sale_crop_types(),
            collection_cache_capacity: default_collection_cache_capacity(),
            collection_cache_ttl_secs: default_collection_cache_ttl(),
        }
    }
}

fn default_harvest_sale_crop_types() -> Vec<String> {
    vec!["french_beans".to_string(), "tomatoes".to_string()]
}

fn default_collection_cache_capacity() -> u64 {
    500
}

fn default_collection_cache_ttl() -> u64 {
    86_400 // 1 day
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if configuration cannot be loaded.
    pub fn load() -> AppResult<Self> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(
                config::Environment::with_prefix("MAVUNO")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("settlement.harvest_sale_crop_types")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_environment() {
        temp_env::with_vars(
            [
                ("MAVUNO__DATABASE__URL", Some("postgres://localhost/mavuno_test")),
                ("MAVUNO__JWT__SECRET", Some("test-secret")),
                ("MAVUNO__SERVER__PORT", Some("9090")),
                (
                    "MAVUNO__SETTLEMENT__HARVEST_SALE_CROP_TYPES",
                    Some("french_beans,avocado"),
                ),
            ],
            || {
                let config = AppConfig::load().unwrap();
                assert_eq!(config.database.url, "postgres://localhost/mavuno_test");
                assert_eq!(config.jwt.secret, "test-secret");
                assert_eq!(config.server.port, 9090);
                assert_eq!(config.server.host, "0.0.0.0");
                assert_eq!(
                    config.settlement.harvest_sale_crop_types,
                    vec!["french_beans".to_string(), "avocado".to_string()]
                );
            },
        );
    }

    #[test]
    fn test_defaults_apply() {
        temp_env::with_vars(
            [
                ("MAVUNO__DATABASE__URL", Some("postgres://localhost/mavuno_test")),
                ("MAVUNO__JWT__SECRET", Some("test-secret")),
            ],
            || {
                let config = AppConfig::load().unwrap();
                assert_eq!(config.database.max_connections, 10);
                assert_eq!(config.jwt.token_expiry_secs, 900);
                assert_eq!(config.wallet.projection_capacity, 1_000);
                assert_eq!(config.settlement.collection_cache_capacity, 500);
                assert!(
                    config
                        .settlement
                        .harvest_sale_crop_types
                        .contains(&"french_beans".to_string())
                );
            },
        );
    }

    #[test]
    fn test_missing_database_url_fails() {
        temp_env::with_vars(
            [
                ("MAVUNO__DATABASE__URL", None::<&str>),
                ("MAVUNO__JWT__SECRET", Some("test-secret")),
            ],
            || {
                assert!(AppConfig::load().is_err());
            },
        );
    }
}
