use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub engine: EngineConfig,
    pub monday: Option<MondaySettings>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let submission_threshold = env::var("APP_SUBMISSION_THRESHOLD")
            .unwrap_or_else(|_| "90".to_string())
            .parse::<u8>()
            .ok()
            .filter(|value| *value <= 100)
            .ok_or(ConfigError::InvalidThreshold)?;

        let application_base_url = env::var("APP_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .trim_end_matches('/')
            .to_string();

        let default_promotion =
            env::var("APP_PROMOTION").unwrap_or_else(|_| "Katapult 2025".to_string());

        let effect_timeout_secs = env::var("APP_EFFECT_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u64>()
            .ok()
            .filter(|value| *value > 0)
            .ok_or(ConfigError::InvalidTimeout)?;

        let dossier_dir =
            PathBuf::from(env::var("APP_DOSSIER_DIR").unwrap_or_else(|_| "dossiers".to_string()));

        let monday = MondaySettings::from_env();

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            engine: EngineConfig {
                submission_threshold,
                application_base_url,
                default_promotion,
                effect_timeout: Duration::from_secs(effect_timeout_secs),
                dossier_dir,
            },
            monday,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Tunables for the candidature workflow engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Minimum completion percentage required before an applicant may submit.
    pub submission_threshold: u8,
    /// Public base URL used to build application links in outbound email.
    pub application_base_url: String,
    /// Cohort assigned to candidatures created without an explicit promotion.
    pub default_promotion: String,
    /// Ceiling applied to each side effect before it is abandoned.
    pub effect_timeout: Duration,
    /// Directory where rendered dossiers are written.
    pub dossier_dir: PathBuf,
}

/// Credentials and board coordinates for the Monday.com sync.
///
/// Present only when both the API token and the board id are configured;
/// otherwise the service falls back to a local CRM stub.
#[derive(Debug, Clone)]
pub struct MondaySettings {
    pub api_url: String,
    pub api_token: String,
    pub board_id: String,
}

impl MondaySettings {
    fn from_env() -> Option<Self> {
        let api_token = env::var("MONDAY_API_TOKEN").ok().filter(|v| !v.is_empty())?;
        let board_id = env::var("MONDAY_BOARD_ID").ok().filter(|v| !v.is_empty())?;
        let api_url = env::var("MONDAY_API_URL")
            .unwrap_or_else(|_| "https://api.monday.com/v2".to_string());

        Some(Self {
            api_url,
            api_token,
            board_id,
        })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidThreshold,
    InvalidTimeout,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidThreshold => {
                write!(
                    f,
                    "APP_SUBMISSION_THRESHOLD must be an integer between 0 and 100"
                )
            }
            ConfigError::InvalidTimeout => {
                write!(f, "APP_EFFECT_TIMEOUT_SECS must be a positive integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidThreshold
            | ConfigError::InvalidTimeout => None,
        }
    }
}
