use std::collections::BTreeSet;
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::dispatch::{DispatchSettings, DEFAULT_JOB_TTL_SECS};

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

/// Top-level configuration for the dispatch service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub dispatch: DispatchConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "7001".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            dispatch: DispatchConfig::from_env()?,
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

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Inputs to the dispatch service that come from the operator, not the worker.
#[derive(Debug, Clone, Default)]
pub struct DispatchConfig {
    pub model_reference: Option<PathBuf>,
    pub trusted_workers: BTreeSet<String>,
    pub unsafe_ips: Vec<IpAddr>,
    pub job_ttl_secs: u32,
}

impl DispatchConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let model_reference = env::var("HORDE_MODEL_REFERENCE")
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);

        let trusted_workers: BTreeSet<String> = env::var("HORDE_TRUSTED_WORKERS")
            .map(|raw| split_list(&raw).map(str::to_string).collect())
            .unwrap_or_default();

        let unsafe_ips = match env::var("HORDE_UNSAFE_IPS") {
            Ok(raw) => split_list(&raw)
                .map(|value| {
                    value.parse().map_err(|source| ConfigError::InvalidUnsafeIp {
                        value: value.to_string(),
                        source,
                    })
                })
                .collect::<Result<Vec<IpAddr>, _>>()?,
            Err(_) => Vec::new(),
        };

        let job_ttl_secs = match env::var("HORDE_JOB_TTL") {
            Ok(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|ttl| *ttl > 0)
                .ok_or(ConfigError::InvalidJobTtl)?,
            Err(_) => DEFAULT_JOB_TTL_SECS,
        };

        Ok(Self {
            model_reference,
            trusted_workers,
            unsafe_ips,
            job_ttl_secs,
        })
    }

    pub fn settings(&self) -> DispatchSettings {
        DispatchSettings {
            trusted_workers: self.trusted_workers.clone(),
            job_ttl_secs: self.job_ttl_secs,
        }
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|item| !item.is_empty())
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost {
        source: std::net::AddrParseError,
    },
    InvalidUnsafeIp {
        value: String,
        source: std::net::AddrParseError,
    },
    InvalidJobTtl,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidUnsafeIp { value, .. } => {
                write!(f, "HORDE_UNSAFE_IPS entry '{value}' is not an IP address")
            }
            ConfigError::InvalidJobTtl => {
                write!(f, "HORDE_JOB_TTL must be a positive number of seconds")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidJobTtl => None,
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidUnsafeIp { source, .. } => Some(source),
        }
    }
}
