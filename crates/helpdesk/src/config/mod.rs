use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::requests::{UserProfile, UserRole};

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
    pub helpdesk: HelpdeskConfig,
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

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            helpdesk: HelpdeskConfig::from_env()?,
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

/// Timeouts, background cadences, and seed data for the request workflow.
#[derive(Debug, Clone)]
pub struct HelpdeskConfig {
    pub store_timeout: Duration,
    pub notification_poll_interval: Duration,
    pub reminder_window: chrono::Duration,
    pub reminder_sweep_interval: Duration,
    pub signed_url_ttl: Duration,
    pub holidays_csv: Option<PathBuf>,
    /// Base URL attachments are served from. Without it signed links are unavailable.
    pub storage_base_url: Option<String>,
    pub admins: Vec<UserProfile>,
}

impl Default for HelpdeskConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(15),
            notification_poll_interval: Duration::from_secs(120),
            reminder_window: chrono::Duration::hours(24),
            reminder_sweep_interval: Duration::from_secs(900),
            signed_url_ttl: Duration::from_secs(3600),
            holidays_csv: None,
            storage_base_url: None,
            admins: Vec::new(),
        }
    }
}

impl HelpdeskConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let admins = match env::var("HELPDESK_ADMINS") {
            Ok(raw) => parse_admins(&raw)?,
            Err(_) => defaults.admins,
        };

        Ok(Self {
            store_timeout: Duration::from_secs(positive_secs("HELPDESK_STORE_TIMEOUT_SECS", 15)?),
            notification_poll_interval: Duration::from_secs(positive_secs(
                "HELPDESK_NOTIFICATION_POLL_SECS",
                120,
            )?),
            reminder_window: positive_hours(
                "HELPDESK_REMINDER_WINDOW_HOURS",
                defaults.reminder_window,
            )?,
            reminder_sweep_interval: Duration::from_secs(positive_secs(
                "HELPDESK_REMINDER_SWEEP_SECS",
                900,
            )?),
            signed_url_ttl: Duration::from_secs(positive_secs(
                "HELPDESK_SIGNED_URL_TTL_SECS",
                3600,
            )?),
            holidays_csv: env::var("HELPDESK_HOLIDAYS_CSV")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from),
            storage_base_url: env::var("HELPDESK_STORAGE_URL")
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            admins,
        })
    }
}

fn positive_secs(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(var) {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(ConfigError::InvalidDuration { var, value: raw }),
        },
        Err(_) => Ok(default),
    }
}

fn positive_hours(
    var: &'static str,
    default: chrono::Duration,
) -> Result<chrono::Duration, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|hours| *hours > 0)
            .and_then(chrono::Duration::try_hours)
            .ok_or(ConfigError::InvalidDuration { var, value: raw }),
        Err(_) => Ok(default),
    }
}

/// `id:name:email` entries separated by `;`.
fn parse_admins(raw: &str) -> Result<Vec<UserProfile>, ConfigError> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let mut parts = entry.splitn(3, ':').map(str::trim);
            match (parts.next(), parts.next(), parts.next()) {
                (Some(id), Some(name), Some(email))
                    if !id.is_empty() && !name.is_empty() && email.contains('@') =>
                {
                    Ok(UserProfile {
                        id: id.to_string(),
                        name: name.to_string(),
                        email: email.to_string(),
                        role: UserRole::Admin,
                    })
                }
                _ => Err(ConfigError::InvalidAdminEntry(entry.to_string())),
            }
        })
        .collect()
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidDuration { var: &'static str, value: String },
    InvalidAdminEntry(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidDuration { var, value } => {
                write!(f, "{} must be a positive whole number (got '{}')", var, value)
            }
            ConfigError::InvalidAdminEntry(entry) => write!(
                f,
                "HELPDESK_ADMINS entry '{}' must look like id:name:email",
                entry
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidDuration { .. }
            | ConfigError::InvalidAdminEntry(_) => None,
        }
    }
}
