//! Service configuration
//!
//! Every setting has a default suitable for local development and can be
//! overridden through `SPRINTPILOT_*` environment variables:
//!
//! | Variable                        | Default                      |
//! |---------------------------------|------------------------------|
//! | `SPRINTPILOT_BIND`              | `0.0.0.0:3001`               |
//! | `SPRINTPILOT_BACKEND_URL`       | `http://localhost:8080/api`  |
//! | `SPRINTPILOT_OLLAMA_URL`        | `http://localhost:11434`     |
//! | `SPRINTPILOT_MODELS`            | `qwen3,qwen3:14b,llama3.2`   |
//! | `SPRINTPILOT_OTLP_ENDPOINT`     | unset (no OTLP export)       |
//! | `SPRINTPILOT_REQUEST_TIMEOUT_SECS` | `30`                      |
//! | `SPRINTPILOT_STORE`             | `backend` (or `memory`)      |
//! | `SPRINTPILOT_LOG_JSON`          | `false`                      |

use std::net::SocketAddr;
use std::time::Duration;

/// Where conversations are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// The project-management backend's conversation endpoints
    Backend,
    /// Process memory; lost on restart
    Memory,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid value {value:?} for {key}: {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

/// Configuration for the HTTP service
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Base URL of the backend REST API (tools and conversation store)
    pub backend_url: String,
    pub ollama_url: String,
    /// Model names served through Ollama
    pub models: Vec<String>,
    pub otlp_endpoint: Option<String>,
    /// Timeout for each backend call
    pub request_timeout: Duration,
    pub store: StoreMode,
    /// JSON log lines instead of human-readable text
    pub log_json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3001)),
            backend_url: "http://localhost:8080/api".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            models: vec![
                "qwen3".to_string(),
                "qwen3:14b".to_string(),
                "llama3.2".to_string(),
            ],
            otlp_endpoint: None,
            request_timeout: Duration::from_secs(30),
            store: StoreMode::Backend,
            log_json: false,
        }
    }
}

impl ServerConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` for variable values; unset or blank keeps the default
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(value) = get("SPRINTPILOT_BIND") {
            config.bind_addr = value.trim().parse().map_err(|e: std::net::AddrParseError| {
                ConfigError {
                    key: "SPRINTPILOT_BIND",
                    value: value.clone(),
                    reason: e.to_string(),
                }
            })?;
        }
        if let Some(value) = get("SPRINTPILOT_BACKEND_URL") {
            config.backend_url = value.trim().to_string();
        }
        if let Some(value) = get("SPRINTPILOT_OLLAMA_URL") {
            config.ollama_url = value.trim().to_string();
        }
        if let Some(value) = get("SPRINTPILOT_MODELS") {
            let models: Vec<String> = value
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
            if models.is_empty() {
                return Err(ConfigError {
                    key: "SPRINTPILOT_MODELS",
                    value,
                    reason: "no model names".to_string(),
                });
            }
            config.models = models;
        }
        config.otlp_endpoint = get("SPRINTPILOT_OTLP_ENDPOINT").map(|v| v.trim().to_string());
        if let Some(value) = get("SPRINTPILOT_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = value.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError {
                    key: "SPRINTPILOT_REQUEST_TIMEOUT_SECS",
                    value: value.clone(),
                    reason: e.to_string(),
                }
            })?;
            config.request_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(value) = get("SPRINTPILOT_STORE") {
            let mode = value.trim().to_ascii_lowercase();
            config.store = match mode.as_str() {
                "backend" => StoreMode::Backend,
                "memory" => StoreMode::Memory,
                _ => {
                    return Err(ConfigError {
                        key: "SPRINTPILOT_STORE",
                        value,
                        reason: "expected `backend` or `memory`".to_string(),
                    })
                }
            };
        }
        if let Some(value) = get("SPRINTPILOT_LOG_JSON") {
            config.log_json = matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes"
            );
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.bind_addr.port(), 3001);
        assert_eq!(config.store, StoreMode::Backend);
        assert!(config.otlp_endpoint.is_none());
        assert!(config.models.contains(&"qwen3".to_string()));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("SPRINTPILOT_BIND", "127.0.0.1:9000"),
            ("SPRINTPILOT_MODELS", "llama3.2, mistral ,"),
            ("SPRINTPILOT_STORE", "memory"),
            ("SPRINTPILOT_REQUEST_TIMEOUT_SECS", "5"),
            ("SPRINTPILOT_OTLP_ENDPOINT", "http://collector:4317"),
            ("SPRINTPILOT_LOG_JSON", "true"),
        ])
        .unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.models, vec!["llama3.2", "mistral"]);
        assert_eq!(config.store, StoreMode::Memory);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.otlp_endpoint.as_deref(), Some("http://collector:4317"));
        assert!(config.log_json);
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let err = load(&[("SPRINTPILOT_BIND", "nowhere")]).unwrap_err();
        assert_eq!(err.key, "SPRINTPILOT_BIND");
        assert!(load(&[("SPRINTPILOT_STORE", "sqlite")]).is_err());
    }
}
