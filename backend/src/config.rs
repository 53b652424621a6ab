use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use dotenvy::dotenv;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebConfig {
    pub addr: String,
    pub port: u16,
    pub cors_origin: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    /// bcrypt work factor for stored passwords.
    pub bcrypt_cost: u32,
    /// Random bytes per login token; the key is their hex encoding.
    pub token_bytes: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub web: WebConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            web: WebConfig {
                addr: "127.0.0.1".to_string(),
                port: 8080,
                cors_origin: "http://localhost:5173".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://bookshelf.db?mode=rwc".to_string(),
                max_connections: 5,
            },
            auth: AuthConfig {
                bcrypt_cost: bcrypt::DEFAULT_COST,
                token_bytes: 20,
            },
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, figment::Error> {
        dotenv().ok();

        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file("Config.toml")) // For non-sensitive defaults
            .merge(Env::prefixed("APP_").split("__")) // e.g., APP_DATABASE__URL
            .extract()?;

        tracing::info!(
            addr = %config.web.addr,
            port = config.web.port,
            "Configuration loaded successfully"
        );

        Ok(config)
    }
}
