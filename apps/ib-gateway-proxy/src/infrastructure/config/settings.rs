//! Proxy Configuration Settings
//!
//! Configuration types for the gateway proxy, loaded from environment variables.

use std::time::Duration;

use crate::application::ports::GatewayEndpoint;
use crate::infrastructure::executor::DEFAULT_QUEUE_CAPACITY;

/// Trading environment (paper vs live).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Paper trading account.
    #[default]
    Paper,
    /// Live trading account (real money).
    Live,
}

impl Environment {
    /// Parse environment from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "LIVE" => Self::Live,
            _ => Self::Paper,
        }
    }

    /// Check if this is the live environment.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }

    /// Get the environment name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Paper => "paper",
            Self::Live => "live",
        }
    }
}

/// Shared secret for mutating routes.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a key.
    #[must_use]
    pub const fn new(key: String) -> Self {
        Self(key)
    }

    /// Check a presented key. Exact match only.
    #[must_use]
    pub fn matches(&self, presented: &str) -> bool {
        self.0 == presented
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Listen address.
    pub bind: String,
    /// Listen port.
    pub port: u16,
    /// Allowed CORS origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 6680,
            cors_origins: Vec::new(),
        }
    }
}

/// Gateway session and supervision settings.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Endpoint used when a connect request names none.
    pub endpoint: GatewayEndpoint,
    /// Heartbeat probe interval.
    pub heartbeat_interval: Duration,
    /// Consecutive probe failures before the session is declared dead.
    pub failure_threshold: u32,
    /// Deadline for domain operations and probes.
    pub operation_timeout: Duration,
    /// Deadline for connect and disconnect.
    pub connect_timeout: Duration,
    /// Handshake bound handed to the session.
    pub handshake_timeout: Duration,
    /// Work queue depth.
    pub queue_capacity: usize,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            endpoint: GatewayEndpoint::default(),
            heartbeat_interval: Duration::from_secs(5),
            failure_threshold: 3,
            operation_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(5),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Complete proxy configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Trading environment, reported in status.
    pub environment: Environment,
    /// HTTP server settings.
    pub server: ServerSettings,
    /// Gateway settings.
    pub gateway: GatewaySettings,
    /// Key required on mutating routes, if any.
    pub api_key: Option<ApiKey>,
    /// How long shutdown waits for the worker.
    pub shutdown_grace: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            server: ServerSettings::default(),
            gateway: GatewaySettings::default(),
            api_key: None,
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl ProxyConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but not acceptable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but not acceptable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let defaults = Self::default();

        let environment = env
            .get("IB_TRADING_MODE")
            .map(|s| Environment::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let server = ServerSettings {
            bind: env
                .get("IB_PROXY_BIND")
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.server.bind),
            port: env.parse("IB_PROXY_PORT", defaults.server.port),
            cors_origins: env
                .get("IB_PROXY_CORS_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        };

        let failure_threshold = env.parse(
            "IB_HEARTBEAT_FAILURE_THRESHOLD",
            defaults.gateway.failure_threshold,
        );
        if failure_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                key: "IB_HEARTBEAT_FAILURE_THRESHOLD".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let default_endpoint = &defaults.gateway.endpoint;
        let gateway = GatewaySettings {
            endpoint: GatewayEndpoint::new(
                env.get("IB_GATEWAY_HOST")
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| default_endpoint.host.clone()),
                env.parse("IB_GATEWAY_PORT", default_endpoint.port),
                env.parse("IB_CLIENT_ID", default_endpoint.client_id),
            ),
            heartbeat_interval: env.secs(
                "IB_HEARTBEAT_INTERVAL_SECS",
                defaults.gateway.heartbeat_interval,
            ),
            failure_threshold,
            operation_timeout: env.secs(
                "IB_OPERATION_TIMEOUT_SECS",
                defaults.gateway.operation_timeout,
            ),
            connect_timeout: env.secs("IB_CONNECT_TIMEOUT_SECS", defaults.gateway.connect_timeout),
            handshake_timeout: env.secs(
                "IB_HANDSHAKE_TIMEOUT_SECS",
                defaults.gateway.handshake_timeout,
            ),
            queue_capacity: env
                .parse("IB_QUEUE_CAPACITY", defaults.gateway.queue_capacity)
                .max(1),
        };

        let api_key = env
            .get("IB_PROXY_API_KEY")
            .filter(|k| !k.is_empty())
            .map(ApiKey::new);

        Ok(Self {
            environment,
            server,
            gateway,
            api_key,
            shutdown_grace: env.secs("IB_SHUTDOWN_GRACE_SECS", defaults.shutdown_grace),
        })
    }

    /// `bind:port` for the HTTP listener.
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.bind, self.server.port)
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable is set to a value the proxy cannot run with.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Why it was rejected.
        reason: String,
    },
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn secs(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map_or(default, Duration::from_secs)
    }
}
