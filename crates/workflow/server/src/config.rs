//! Configuration for workflowd

use crate::error::{ServerError, ServerResult};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use workflow_engine::EngineConfig;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowdConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Engine tuning
    #[serde(default)]
    pub engine: EngineConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Definitions to load at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<PathBuf>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            enable_cors: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl WorkflowdConfig {
    /// Layer defaults, an optional file and `WORKFLOW_*` environment variables
    ///
    /// Nested keys use a double underscore:
    /// `WORKFLOW_ENGINE__MAX_AUTOMATIC_CHAIN=8`.
    pub fn load(path: Option<&str>) -> ServerResult<Self> {
        Self::layered(path).map_err(|e| match path {
            Some(path) => ServerError::Config(format!("{}: {}", path, e)),
            None => ServerError::Config(e.to_string()),
        })
    }

    fn layered(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&WorkflowdConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("WORKFLOW")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WorkflowdConfig::default();
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert!(config.server.enable_cors);
        assert_eq!(config.engine.max_automatic_chain, 16);
        assert_eq!(config.logging.level, "info");
        assert!(config.seed.is_none());
    }

    #[test]
    fn test_file_layer_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("workflowd-test-{}.yaml", std::process::id()));
        std::fs::write(
            &path,
            "server:\n  listen_addr: \"0.0.0.0:9090\"\nengine:\n  commit_retries: 7\n",
        )
        .unwrap();

        let config = WorkflowdConfig::load(path.to_str()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.server.listen_addr.port(), 9090);
        assert_eq!(config.engine.commit_retries, 7);
        assert_eq!(config.engine.max_automatic_chain, 16);
    }

    #[test]
    fn test_missing_file_is_a_config_error() {
        match WorkflowdConfig::load(Some("/nonexistent/workflowd.toml")) {
            Err(ServerError::Config(msg)) => assert!(msg.contains("/nonexistent/workflowd.toml")),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_value_is_a_config_error() {
        let path =
            std::env::temp_dir().join(format!("workflowd-bad-{}.yaml", std::process::id()));
        std::fs::write(&path, "server:\n  listen_addr: \"not an address\"\n").unwrap();

        let result = WorkflowdConfig::load(path.to_str());
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(ServerError::Config(_))));
    }
}
