use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::relay::DEFAULT_ROOM;
use crate::{RelayError, RelayResult};

/// Prefix of the environment variables read by [`Config::load`]
pub const ENV_PREFIX: &str = "DOCRELAY_";

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Room joined by clients that do not name one
    #[serde(default = "default_room")]
    pub default_room: String,

    /// Comma separated CORS origins, any origin when unset or `*`
    pub cors_origins: Option<String>,
}

impl Config {
    /// Load configuration from `DOCRELAY_*` environment variables, reading a
    /// `.env` file first if there is one
    pub fn load() -> RelayResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// Build the configuration from explicit variables
    pub fn from_vars<I>(vars: I) -> RelayResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars = vars.into_iter().filter_map(|(key, value)| {
            key.strip_prefix(ENV_PREFIX)
                .map(|name| (name.to_lowercase(), value))
        });

        match envy::from_iter::<_, Config>(vars) {
            Ok(config) => {
                info!("Configuration loaded");
                Ok(config)
            }
            Err(e) => {
                error!("Failed to load configuration: {}", e);
                Err(RelayError::Config(e.to_string()))
            }
        }
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Explicit CORS origins, or None when any origin is allowed
    pub fn allowed_origins(&self) -> Option<Vec<String>> {
        let origins: Vec<String> = self
            .cors_origins
            .as_deref()?
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();

        if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
            None
        } else {
            Some(origins)
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            default_room: default_room(),
            cors_origins: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_room() -> String {
    DEFAULT_ROOM.to_string()
}
