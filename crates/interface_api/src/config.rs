//! API configuration

use serde::Deserialize;

use infra_db::DatabaseConfig;

/// API configuration
///
/// Loaded from `API_*` environment variables, e.g. `API_PORT=9000`. Pool
/// settings nest under `database` with a double underscore, e.g.
/// `API_DATABASE__MAX_CONNECTIONS=20`. Unset fields keep their `Default`
/// values.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Connection pool settings
    pub database: DatabaseConfig,
    /// Log level
    pub log_level: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database: DatabaseConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl ApiConfig {
    /// Loads configuration from environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix("API")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.server_addr(), "0.0.0.0:8080");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_partial_source_keeps_defaults() {
        let config: ApiConfig = config::Config::builder()
            .set_override("port", 9000)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.database, DatabaseConfig::default());
    }

    #[test]
    fn test_nested_database_settings() {
        let config: ApiConfig = config::Config::builder()
            .set_override("database.max_connections", 25)
            .unwrap()
            .set_override("database.lock_timeout_ms", 1500)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.database.max_connections, 25);
        assert_eq!(config.database.lock_timeout().as_millis(), 1500);
        assert_eq!(config.database.url, "postgres://localhost/case_billing");
    }
}
