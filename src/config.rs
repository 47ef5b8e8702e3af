/// Configuration management for the Crewgate service
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub email: Option<EmailConfig>,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub identity_db: PathBuf,
}

/// Authentication configuration
///
/// The quick-login policy has two independent thresholds: the eligibility
/// window opened by a full login, and the idle cutoff measured from the
/// session's last activity. Both are named here so the boundary checks are
/// single comparisons rather than inferred from timestamps ad hoc.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Access token lifetime in hours
    pub access_token_ttl_hours: i64,
    /// Refresh token lifetime in days
    pub refresh_token_ttl_days: i64,
    /// Quick-login eligibility window in days, opened by a full login
    pub quick_login_window_days: i64,
    /// Quick-login idle cutoff in hours since last session activity
    pub quick_login_idle_hours: i64,
    /// Email verification code lifetime in minutes
    pub verification_code_ttl_minutes: i64,
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_url: String,
    pub from_address: String,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Requests per second for credential endpoints (scan, login, quick login)
    pub credential_rps: u32,
    /// Requests per second for everything else
    pub general_rps: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> CoreResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("CREWGATE_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("CREWGATE_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| CoreError::Validation("Invalid port number".to_string()))?;
        let version = env::var("CREWGATE_VERSION")
            .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

        let data_directory: PathBuf = env::var("CREWGATE_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let identity_db = env::var("CREWGATE_IDENTITY_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("identity.sqlite"));

        let jwt_secret = env::var("CREWGATE_JWT_SECRET")
            .map_err(|_| CoreError::Validation("JWT secret required".to_string()))?;

        let access_token_ttl_hours = parse_env_i64("CREWGATE_ACCESS_TOKEN_TTL_HOURS", 24);
        let refresh_token_ttl_days = parse_env_i64("CREWGATE_REFRESH_TOKEN_TTL_DAYS", 7);
        let quick_login_window_days = parse_env_i64("CREWGATE_QUICK_LOGIN_WINDOW_DAYS", 30);
        let quick_login_idle_hours = parse_env_i64("CREWGATE_QUICK_LOGIN_IDLE_HOURS", 24);
        let verification_code_ttl_minutes =
            parse_env_i64("CREWGATE_VERIFICATION_CODE_TTL_MINUTES", 10);

        let email = if let Ok(smtp_url) = env::var("CREWGATE_EMAIL_SMTP_URL") {
            Some(EmailConfig {
                smtp_url,
                from_address: env::var("CREWGATE_EMAIL_FROM_ADDRESS")
                    .unwrap_or_else(|_| format!("noreply@{}", hostname)),
            })
        } else {
            None
        };

        let rate_limit_enabled = env::var("CREWGATE_RATE_LIMITS_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);
        let credential_rps = env::var("CREWGATE_RATE_LIMIT_CREDENTIAL_RPS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .unwrap_or(5);
        let general_rps = env::var("CREWGATE_RATE_LIMIT_GENERAL_RPS")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .unwrap_or(100);

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            storage: StorageConfig {
                data_directory,
                identity_db,
            },
            authentication: AuthConfig {
                jwt_secret,
                access_token_ttl_hours,
                refresh_token_ttl_days,
                quick_login_window_days,
                quick_login_idle_hours,
                verification_code_ttl_minutes,
            },
            email,
            rate_limit: RateLimitConfig {
                enabled: rate_limit_enabled,
                credential_rps,
                general_rps,
            },
            logging: LoggingConfig { level: log_level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> CoreResult<()> {
        if self.service.hostname.is_empty() {
            return Err(CoreError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(CoreError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.authentication.quick_login_window_days <= 0
            || self.authentication.quick_login_idle_hours <= 0
        {
            return Err(CoreError::Validation(
                "Quick login thresholds must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_env_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
impl ServerConfig {
    /// Minimal configuration for tests
    pub fn for_tests() -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "localhost".to_string(),
                port: 8080,
                version: "0.1.0".to_string(),
            },
            storage: StorageConfig {
                data_directory: PathBuf::from("./data"),
                identity_db: PathBuf::from(":memory:"),
            },
            authentication: AuthConfig {
                jwt_secret: "test-secret-key-that-is-long-enough-for-hs256".to_string(),
                access_token_ttl_hours: 24,
                refresh_token_ttl_days: 7,
                quick_login_window_days: 30,
                quick_login_idle_hours: 24,
                verification_code_ttl_minutes: 10,
            },
            email: None,
            rate_limit: RateLimitConfig {
                enabled: true,
                credential_rps: 5,
                general_rps: 100,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}
