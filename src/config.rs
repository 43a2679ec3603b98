use config::ConfigError;
use secrecy::Secret;
use serde::{de::DeserializeOwned, Deserialize};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_CONNECTIONS: u32 = 20;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: Secret<String>,
    pub host: String,
    pub port: u16,
    pub database_max_connections: u32,

    // Browser frontend origin, if one is served separately
    pub cors_allowed_origin: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        Self::from_source(&config)
    }

    fn from_source(config: &config::Config) -> Result<Self, ConfigError> {
        let database_max_connections =
            get_or(config, "database_max_connections", DEFAULT_MAX_CONNECTIONS)?;
        if database_max_connections == 0 {
            return Err(ConfigError::Message(
                "database_max_connections must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            database_url: Secret::new(config.get("database_url")?),
            host: get_or(config, "host", DEFAULT_HOST.to_string())?,
            port: get_or(config, "port", DEFAULT_PORT)?,
            database_max_connections,

            cors_allowed_origin: get_or(config, "cors_allowed_origin", None)?,
        })
    }
}

/// Reads `key`, falling back to `default` only when it is absent
fn get_or<T: DeserializeOwned>(
    config: &config::Config,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match config.get::<T>(key) {
        Err(ConfigError::NotFound(_)) => Ok(default),
        other => other,
    }
}
