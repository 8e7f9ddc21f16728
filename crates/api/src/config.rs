use serde::Deserialize;
use std::net::SocketAddr;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub workflows: WorkflowJobConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Allowed CORS origins; empty allows any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Empty selects the in-memory stores.
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty()
    }

    pub fn pool_config(&self) -> persistence::db::DatabaseConfig {
        persistence::db::DatabaseConfig {
            url: self.url.clone(),
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            connect_timeout_secs: self.connect_timeout_secs,
            idle_timeout_secs: self.idle_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Scheduled-message dispatcher.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Delay between the end of one pass and the start of the next.
    #[serde(default = "default_dispatch_interval")]
    pub interval_secs: u64,

    /// Maximum due messages handled in one pass.
    #[serde(default = "default_dispatch_batch_size")]
    pub batch_size: i64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_dispatch_interval(),
            batch_size: default_dispatch_batch_size(),
        }
    }
}

/// Workflow scheduler.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowJobConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_workflow_interval")]
    pub interval_secs: u64,

    /// Maximum customers addressed by one execution.
    #[serde(default = "default_audience_limit")]
    pub audience_limit: i64,

    /// Maximum workflows picked up per pass.
    #[serde(default = "default_workflow_batch_size")]
    pub batch_size: i64,
}

impl Default for WorkflowJobConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_workflow_interval(),
            audience_limit: default_audience_limit(),
            batch_size: default_workflow_batch_size(),
        }
    }
}

/// Outbound SMS gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// `console` logs instead of sending; `http` calls the remote gateway.
    #[serde(default = "default_gateway_provider")]
    pub provider: String,

    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub api_secret: String,

    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            provider: default_gateway_provider(),
            base_url: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            timeout_secs: default_gateway_timeout(),
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    5
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_true() -> bool {
    true
}
fn default_dispatch_interval() -> u64 {
    60
}
fn default_dispatch_batch_size() -> i64 {
    1000
}
fn default_workflow_interval() -> u64 {
    60
}
fn default_audience_limit() -> i64 {
    1000
}
fn default_workflow_batch_size() -> i64 {
    100
}
fn default_gateway_provider() -> String {
    "console".to_string()
}
fn default_gateway_timeout() -> u64 {
    10
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with CRM__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("CRM").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration for testing with custom overrides.
    ///
    /// Defaults are embedded so tests do not depend on the config directory.
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "0.0.0.0"
            port = 8080
            request_timeout_secs = 30

            [database]
            url = ""
            max_connections = 20
            min_connections = 5
            connect_timeout_secs = 10
            idle_timeout_secs = 600

            [logging]
            level = "info"
            format = "json"

            [dispatch]
            enabled = false
            interval_secs = 60
            batch_size = 1000

            [workflows]
            enabled = false
            interval_secs = 60
            audience_limit = 1000
            batch_size = 100

            [gateway]
            provider = "console"
            timeout_secs = 10
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.server.host.parse::<std::net::IpAddr>().is_err() {
            return Err(ConfigValidationError::InvalidValue(format!(
                "Server host '{}' is not an IP address",
                self.server.host
            )));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        if self.dispatch.interval_secs == 0 || self.workflows.interval_secs == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Job interval_secs must be positive".to_string(),
            ));
        }

        if self.dispatch.batch_size <= 0 || self.workflows.batch_size <= 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Job batch_size must be positive".to_string(),
            ));
        }

        if self.workflows.audience_limit <= 0 {
            return Err(ConfigValidationError::InvalidValue(
                "workflows.audience_limit must be positive".to_string(),
            ));
        }

        match self.gateway.provider.as_str() {
            "console" => {}
            "http" => {
                if self.gateway.base_url.is_empty() {
                    return Err(ConfigValidationError::MissingRequired(
                        "CRM__GATEWAY__BASE_URL must be set for the http gateway".to_string(),
                    ));
                }
                if self.gateway.api_key.is_empty() || self.gateway.api_secret.is_empty() {
                    return Err(ConfigValidationError::MissingRequired(
                        "CRM__GATEWAY__API_KEY and CRM__GATEWAY__API_SECRET must be set for the http gateway"
                            .to_string(),
                    ));
                }
            }
            other => {
                return Err(ConfigValidationError::InvalidValue(format!(
                    "Unknown gateway provider '{}'",
                    other
                )))
            }
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        // validate() guarantees an IP host
        let ip = self
            .server
            .host
            .parse()
            .unwrap_or(std::net::IpAddr::from([0, 0, 0, 0]));
        SocketAddr::new(ip, self.server.port)
    }
}
