//! Configuration management for the booking server.
//!
//! Loads configuration from `PGSTAY_*` environment variables with sensible
//! defaults. The binary calls `dotenvy::dotenv()` first, so a `.env` file in
//! the working directory works too.
//!
//! The gateway secret has no default and an unrecognised gateway mode is an
//! error: the signature key must never be guessable.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Longest accepted rent due period (ten years).
pub const MAX_DUE_PERIOD_DAYS: u32 = 3650;

/// Errors from loading configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is unset or blank
    #[error("{0} must be set")]
    Missing(&'static str),

    /// `PGSTAY_GATEWAY_MODE` names no known gateway
    #[error("Unknown gateway mode '{0}' (expected 'mock' or 'razorpay')")]
    UnknownGatewayMode(String),

    /// A value is outside its accepted range
    #[error("{key} must be at most {max}, got {value}")]
    OutOfRange {
        /// Variable name
        key: &'static str,
        /// Rejected value
        value: u64,
        /// Largest accepted value
        max: u64,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Logging and metrics
    pub observability: ObservabilityConfig,
    /// Store runtime configuration
    pub runtime: RuntimeConfig,
    /// Payment gateway configuration
    pub gateway: GatewayConfig,
    /// Booking rules
    pub booking: BookingConfig,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Seconds a request waits for the store to answer
    pub request_timeout: u64,
    /// Seconds to drain in-flight effects on shutdown
    pub shutdown_timeout: u64,
}

/// Observability configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Install the Prometheus recorder and serve `/metrics`
    pub metrics_enabled: bool,
}

/// Store runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Actions buffered for callers waiting on replies
    pub broadcast_capacity: usize,
}

/// Which gateway implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayMode {
    /// In-process gateway, no network
    Mock,
    /// Razorpay Orders API
    Razorpay,
}

/// Payment gateway configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Implementation
    pub mode: GatewayMode,
    /// API key id
    pub key_id: String,
    /// API key secret, also the signature key
    #[serde(skip_serializing, default)]
    pub key_secret: String,
    /// API base URL
    pub base_url: String,
    /// Order currency
    pub currency: String,
    /// Seconds before a gateway call times out
    pub timeout: u64,
}

/// Booking rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConfig {
    /// JSON file of `{token, user_id, name, email, role}` seeds
    pub sessions_file: Option<PathBuf>,
    /// Days between booking and rent due date
    pub due_period_days: u32,
}

impl GatewayMode {
    /// Parse `PGSTAY_GATEWAY_MODE`; unset means [`GatewayMode::Mock`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownGatewayMode`] for any other value.
    pub fn from_setting(value: Option<&str>) -> Result<Self, ConfigError> {
        match value.map(str::trim) {
            None | Some("") => Ok(Self::Mock),
            Some(mode) if mode.eq_ignore_ascii_case("mock") => Ok(Self::Mock),
            Some(mode) if mode.eq_ignore_ascii_case("razorpay") => Ok(Self::Razorpay),
            Some(other) => Err(ConfigError::UnknownGatewayMode(other.to_string())),
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// See [`Config::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, falling back to defaults for
    /// missing or unparsable optional values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when `PGSTAY_RAZORPAY_KEY_SECRET` is
    /// unset, [`ConfigError::UnknownGatewayMode`] for a gateway mode other
    /// than `mock` or `razorpay`, and [`ConfigError::OutOfRange`] when the due
    /// period exceeds [`MAX_DUE_PERIOD_DAYS`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let mode = GatewayMode::from_setting(lookup("PGSTAY_GATEWAY_MODE").as_deref())?;
        let key_secret = lookup("PGSTAY_RAZORPAY_KEY_SECRET")
            .map(|secret| secret.trim().to_string())
            .filter(|secret| !secret.is_empty())
            .ok_or(ConfigError::Missing("PGSTAY_RAZORPAY_KEY_SECRET"))?;
        let due_period_days = parse(lookup("PGSTAY_DUE_PERIOD_DAYS")).unwrap_or(30);
        if due_period_days > MAX_DUE_PERIOD_DAYS {
            return Err(ConfigError::OutOfRange {
                key: "PGSTAY_DUE_PERIOD_DAYS",
                value: u64::from(due_period_days),
                max: u64::from(MAX_DUE_PERIOD_DAYS),
            });
        }

        Ok(Self {
            server: ServerConfig {
                host: string("PGSTAY_HOST", "0.0.0.0"),
                port: parse(lookup("PGSTAY_PORT")).unwrap_or(8080),
                request_timeout: parse(lookup("PGSTAY_REQUEST_TIMEOUT")).unwrap_or(10),
                shutdown_timeout: parse(lookup("PGSTAY_SHUTDOWN_TIMEOUT")).unwrap_or(30),
            },
            observability: ObservabilityConfig {
                log_level: lookup("PGSTAY_LOG_LEVEL")
                    .or_else(|| lookup("RUST_LOG"))
                    .unwrap_or_else(|| "info,pgstay_booking=debug,tower_http=debug".to_string()),
                metrics_enabled: parse(lookup("PGSTAY_METRICS_ENABLED")).unwrap_or(true),
            },
            runtime: RuntimeConfig {
                broadcast_capacity: parse(lookup("PGSTAY_BROADCAST_CAPACITY")).unwrap_or(1024),
            },
            gateway: GatewayConfig {
                mode,
                key_id: string("PGSTAY_RAZORPAY_KEY_ID", "rzp_test_key"),
                key_secret,
                base_url: string("PGSTAY_RAZORPAY_BASE_URL", crate::razorpay::DEFAULT_BASE_URL),
                currency: string("PGSTAY_CURRENCY", "INR"),
                timeout: parse(lookup("PGSTAY_GATEWAY_TIMEOUT")).unwrap_or(15),
            },
            booking: BookingConfig {
                sessions_file: lookup("PGSTAY_SESSIONS_FILE").map(PathBuf::from),
                due_period_days,
            },
        })
    }

    /// Address the HTTP server binds to
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Request timeout as a [`Duration`]
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout)
    }

    /// Shutdown timeout as a [`Duration`]
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout)
    }
}

fn parse<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|s| s.trim().parse().ok())
}
