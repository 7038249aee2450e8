use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::collab::CollabLimits;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins, comma separated
    pub cors_origins: Option<String>,

    /// JWT secret used to verify bearer credentials
    pub auth_jwt_secret: Option<String>,

    /// Admission control
    #[serde(default = "default_max_members_per_room")]
    pub max_members_per_room: usize,
    #[serde(default = "default_max_rooms_per_user")]
    pub max_rooms_per_user: usize,

    /// How often empty rooms are dropped
    #[serde(default = "default_sweep_interval")]
    pub empty_room_sweep_interval_seconds: u64,

    /// Per-connection outbound queue length
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    /// Coordinator command queue length
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        Self::from_vars(std::env::vars())
    }

    /// Build configuration from an explicit set of variables.
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        match envy::from_iter::<_, Config>(vars) {
            Ok(config) => {
                info!("✅ Configuration loaded successfully");
                Ok(config)
            }
            Err(e) => {
                error!("❌ Failed to load configuration: {}", e);
                Err(ConfigError::EnvError(e))
            }
        }
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }

    pub fn limits(&self) -> CollabLimits {
        CollabLimits {
            max_members_per_room: self.max_members_per_room,
            max_rooms_per_user: self.max_rooms_per_user,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.empty_room_sweep_interval_seconds.max(1))
    }

    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            cors_origins: None,
            auth_jwt_secret: None,
            max_members_per_room: default_max_members_per_room(),
            max_rooms_per_user: default_max_rooms_per_user(),
            empty_room_sweep_interval_seconds: default_sweep_interval(),
            outbound_buffer: default_outbound_buffer(),
            command_buffer: default_command_buffer(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvError(#[from] envy::Error),
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_max_members_per_room() -> usize {
    10
}

fn default_max_rooms_per_user() -> usize {
    5
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_outbound_buffer() -> usize {
    256
}

fn default_command_buffer() -> usize {
    1024
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let config = Config::from_vars(Vec::new()).unwrap();
        assert_eq!(config.server_address(), "0.0.0.0:3000");
        assert_eq!(config.limits(), CollabLimits::default());
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
        assert_eq!(config.outbound_buffer, 256);
        assert!(config.auth_jwt_secret.is_none());
        assert!(config.is_development());
    }

    #[test]
    fn test_overrides_from_env() {
        let config = Config::from_vars(vars(&[
            ("PORT", "8080"),
            ("MAX_MEMBERS_PER_ROOM", "3"),
            ("MAX_ROOMS_PER_USER", "2"),
            ("EMPTY_ROOM_SWEEP_INTERVAL_SECONDS", "5"),
            ("AUTH_JWT_SECRET", "s3cret"),
            ("CORS_ORIGINS", "https://a.example, https://b.example,"),
            ("ENVIRONMENT", "prod"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.limits().max_members_per_room, 3);
        assert_eq!(config.limits().max_rooms_per_user, 2);
        assert_eq!(config.sweep_interval(), Duration::from_secs(5));
        assert_eq!(config.auth_jwt_secret.as_deref(), Some("s3cret"));
        assert_eq!(
            config.cors_origin_list(),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert!(!config.is_development());
    }

    #[test]
    fn test_invalid_number_is_an_error() {
        assert!(Config::from_vars(vars(&[("MAX_ROOMS_PER_USER", "many")])).is_err());
    }
}
