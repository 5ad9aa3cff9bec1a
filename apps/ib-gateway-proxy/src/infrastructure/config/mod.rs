//! Configuration Module
//!
//! Configuration loading for the proxy service.

mod settings;

pub use settings::{
    ApiKey, ConfigError, Environment, GatewaySettings, ProxyConfig, ServerSettings,
};
