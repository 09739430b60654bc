use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

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
    pub scoring: ScoringConfig,
    pub store: StoreConfig,
    pub intake: IntakeConfig,
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

        let scoring = ScoringConfig {
            base_url: non_empty_var("SCORING_SERVICE_URL"),
            timeout: timeout_var("SCORING_TIMEOUT_SECS")?,
        };

        let store = StoreConfig::from_parts(
            non_empty_var("SUPABASE_URL"),
            non_empty_var("SUPABASE_ANON_KEY"),
            env::var("STORE_TABLE").unwrap_or_else(|_| "loans".to_string()),
            timeout_var("STORE_TIMEOUT_SECS")?,
        )?;

        let intake = IntakeConfig {
            enforce_ranges: flag_var("INTAKE_ENFORCE_RANGES", true)?,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            scoring,
            store,
            intake,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn timeout_var(name: &'static str) -> Result<Duration, ConfigError> {
    match non_empty_var(name) {
        None => Ok(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        Some(raw) => match raw.parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
            _ => Err(ConfigError::InvalidTimeout { var: name }),
        },
    }
}

fn flag_var(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match non_empty_var(name) {
        None => Ok(default),
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidFlag { var: name }),
        },
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

/// Remote scoring service location. `None` selects the built-in rule-based scorer.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub base_url: Option<String>,
    pub timeout: Duration,
}

/// Durable store settings. Without a REST endpoint the service keeps records in memory.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub rest: Option<RestStoreConfig>,
    pub table: String,
    pub timeout: Duration,
}

impl StoreConfig {
    fn from_parts(
        url: Option<String>,
        api_key: Option<String>,
        table: String,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let rest = match url {
            None => None,
            Some(url) => {
                if !url.starts_with("https://") {
                    return Err(ConfigError::InsecureStoreUrl { url });
                }
                let api_key = api_key.ok_or(ConfigError::MissingStoreKey)?;
                Some(RestStoreConfig { url, api_key })
            }
        };

        Ok(Self {
            rest,
            table,
            timeout,
        })
    }
}

#[derive(Clone)]
pub struct RestStoreConfig {
    pub url: String,
    pub api_key: String,
}

impl fmt::Debug for RestStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestStoreConfig")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Core intake policy switches.
#[derive(Debug, Clone, Copy)]
pub struct IntakeConfig {
    pub enforce_ranges: bool,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidTimeout { var: &'static str },
    InvalidFlag { var: &'static str },
    InsecureStoreUrl { url: String },
    MissingStoreKey,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidTimeout { var } => {
                write!(f, "{var} must be a positive number of seconds")
            }
            ConfigError::InvalidFlag { var } => write!(f, "{var} must be true or false"),
            ConfigError::InsecureStoreUrl { url } => {
                write!(f, "SUPABASE_URL must start with 'https://', got: {url}")
            }
            ConfigError::MissingStoreKey => {
                write!(f, "SUPABASE_ANON_KEY is required when SUPABASE_URL is set")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
