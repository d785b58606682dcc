//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use std::env;
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub pix: PixConfig,
    pub webhook: WebhookConfig,
    pub notification: NotificationConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
    pub run_migrations: bool,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Where the gateway client certificate (PKCS#12) comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateSource {
    File(PathBuf),
    Base64(String),
    /// Plain TLS, only meant for sandbox stubs and tests
    None,
}

/// Pix gateway configuration
#[derive(Debug, Clone)]
pub struct PixConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub certificate: CertificateSource,
    pub certificate_password: String,
    /// Receiving key for charges, also the payer key on payouts
    pub pix_key: String,
    pub split_config_id: String,
    pub request_timeout: u64, // seconds
    pub charge_expiration: u64, // seconds
    /// Public URL registered with the gateway at startup, if any
    pub webhook_url: Option<String>,
    /// Forward confirmed amounts to the campaign owner (business accounts only)
    pub payout_enabled: bool,
}

/// Inbound webhook authorization
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub identity: String,
    pub client_cert_header: String,
    pub client_cert_verified_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationBackend {
    /// Per-connection registry behind `/ws`
    Socket,
    /// Redis pub/sub on a fixed channel
    Broadcast,
}

/// Notification channel configuration
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub backend: NotificationBackend,
    pub redis_url: String,
    pub channel: String,
    pub subscription_ttl: u64, // seconds
    pub sweep_interval: u64,   // seconds
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            pix: PixConfig::from_env()?,
            webhook: WebhookConfig::from_env()?,
            notification: NotificationConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.database.validate()?;
        self.logging.validate()?;
        self.pix.validate()?;
        self.webhook.validate()?;
        self.notification.validate()?;

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingVariable("DATABASE_URL".to_string()))?,
            max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()))?,
            min_connections: env::var("DB_MIN_CONNECTIONS")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MIN_CONNECTIONS".to_string()))?,
            connection_timeout: env::var("DB_CONNECTION_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_CONNECTION_TIMEOUT".to_string()))?,
            idle_timeout: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|val| val.parse().ok()),
            run_migrations: parse_bool("DB_RUN_MIGRATIONS", true)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl PixConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let certificate = match (
            env::var("PIX_CERTIFICATE_PATH").ok().filter(|v| !v.is_empty()),
            env::var("PIX_CERTIFICATE_BASE64").ok().filter(|v| !v.is_empty()),
        ) {
            (Some(path), _) => CertificateSource::File(PathBuf::from(path)),
            (None, Some(blob)) => CertificateSource::Base64(blob),
            (None, None) => CertificateSource::None,
        };

        Ok(PixConfig {
            base_url: env::var("PIX_BASE_URL")
                .unwrap_or_else(|_| "https://pix-h.api.efipay.com.br".to_string()),
            client_id: env::var("PIX_CLIENT_ID")
                .map_err(|_| ConfigError::MissingVariable("PIX_CLIENT_ID".to_string()))?,
            client_secret: env::var("PIX_CLIENT_SECRET")
                .map_err(|_| ConfigError::MissingVariable("PIX_CLIENT_SECRET".to_string()))?,
            certificate,
            certificate_password: env::var("PIX_CERTIFICATE_PASSWORD").unwrap_or_default(),
            pix_key: env::var("PIX_KEY")
                .map_err(|_| ConfigError::MissingVariable("PIX_KEY".to_string()))?,
            split_config_id: env::var("PIX_SPLIT_CONFIG_ID")
                .map_err(|_| ConfigError::MissingVariable("PIX_SPLIT_CONFIG_ID".to_string()))?,
            request_timeout: env::var("PIX_REQUEST_TIMEOUT")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PIX_REQUEST_TIMEOUT".to_string()))?,
            charge_expiration: env::var("PIX_CHARGE_EXPIRATION")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PIX_CHARGE_EXPIRATION".to_string()))?,
            webhook_url: env::var("PIX_WEBHOOK_URL").ok().filter(|v| !v.is_empty()),
            payout_enabled: parse_bool("PIX_PAYOUT_ENABLED", false)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "PIX_BASE_URL must be a valid URL".to_string(),
            ));
        }

        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(ConfigError::InvalidValue(
                "PIX_CLIENT_ID and PIX_CLIENT_SECRET cannot be empty".to_string(),
            ));
        }

        if self.pix_key.is_empty() {
            return Err(ConfigError::InvalidValue("PIX_KEY".to_string()));
        }

        if self.split_config_id.is_empty() {
            return Err(ConfigError::InvalidValue("PIX_SPLIT_CONFIG_ID".to_string()));
        }

        if self.request_timeout == 0 {
            return Err(ConfigError::InvalidValue("PIX_REQUEST_TIMEOUT".to_string()));
        }

        if self.charge_expiration == 0 {
            return Err(ConfigError::InvalidValue(
                "PIX_CHARGE_EXPIRATION".to_string(),
            ));
        }

        // mTLS is mandatory against the real gateway
        if self.base_url.starts_with("https://") && self.certificate == CertificateSource::None {
            return Err(ConfigError::ValidationFailed(
                "PIX_CERTIFICATE_PATH or PIX_CERTIFICATE_BASE64 is required for an https gateway"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

impl WebhookConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(WebhookConfig {
            identity: env::var("WEBHOOK_IDENTITY")
                .map_err(|_| ConfigError::MissingVariable("WEBHOOK_IDENTITY".to_string()))?,
            client_cert_header: env::var("WEBHOOK_CLIENT_CERT_HEADER")
                .unwrap_or_else(|_| "x-ssl-client-verify".to_string())
                .to_lowercase(),
            client_cert_verified_value: env::var("WEBHOOK_CLIENT_CERT_VERIFIED_VALUE")
                .unwrap_or_else(|_| "SUCCESS".to_string()),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identity.trim().is_empty() {
            return Err(ConfigError::InvalidValue("WEBHOOK_IDENTITY".to_string()));
        }

        if self.client_cert_header.is_empty() {
            return Err(ConfigError::InvalidValue(
                "WEBHOOK_CLIENT_CERT_HEADER".to_string(),
            ));
        }

        Ok(())
    }
}

impl NotificationConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = match env::var("NOTIFICATION_BACKEND")
            .unwrap_or_else(|_| "socket".to_string())
            .to_lowercase()
            .as_str()
        {
            "socket" | "websocket" => NotificationBackend::Socket,
            "broadcast" | "redis" => NotificationBackend::Broadcast,
            _ => {
                return Err(ConfigError::InvalidValue(
                    "NOTIFICATION_BACKEND must be socket or broadcast".to_string(),
                ))
            }
        };

        Ok(NotificationConfig {
            backend,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            channel: env::var("NOTIFICATION_CHANNEL").unwrap_or_else(|_| "donations".to_string()),
            subscription_ttl: env::var("SUBSCRIPTION_TTL_SECONDS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SUBSCRIPTION_TTL_SECONDS".to_string()))?,
            sweep_interval: env::var("SUBSCRIPTION_SWEEP_INTERVAL_SECONDS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .map_err(|_| {
                    ConfigError::InvalidValue("SUBSCRIPTION_SWEEP_INTERVAL_SECONDS".to_string())
                })?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend == NotificationBackend::Broadcast {
            if !self.redis_url.starts_with("redis://") && !self.redis_url.starts_with("rediss://")
            {
                return Err(ConfigError::InvalidValue(
                    "REDIS_URL must start with redis:// or rediss://".to_string(),
                ));
            }

            if self.channel.trim().is_empty() {
                return Err(ConfigError::InvalidValue("NOTIFICATION_CHANNEL".to_string()));
            }
        }

        if self.subscription_ttl == 0 || self.sweep_interval == 0 {
            return Err(ConfigError::InvalidValue(
                "subscription TTL and sweep interval must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Ok(value) => match value.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidValue(name.to_string())),
        },
        Err(_) => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
