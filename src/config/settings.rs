//! Application settings and configuration management

use crate::error::{AgentError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Deserializer, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
}

/// Instance-level agent configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    /// Provider region; falls back to the SDK default chain when unset
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default = "default_admin_host")]
    pub admin_host: String,
    #[serde(default = "default_admin_port")]
    pub admin_port: u16,
    #[serde(default = "default_metadata_base_url")]
    pub metadata_base_url: String,
}

fn default_admin_host() -> String {
    "0.0.0.0".to_string()
}

fn default_admin_port() -> u16 {
    8080
}

fn default_metadata_base_url() -> String {
    "http://169.254.169.254".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            region: None,
            admin_host: default_admin_host(),
            admin_port: default_admin_port(),
            metadata_base_url: default_metadata_base_url(),
        }
    }
}

/// Route table reconciler configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconcilerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Route tables this instance owns. Accepts a list or a
    /// comma-separated string (the form injected via user-data).
    #[serde(default, deserialize_with = "de_route_table_ids")]
    pub route_table_ids: Vec<String>,
    #[serde(default = "default_reconcile_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
    /// Consecutive total-pass failures before the instance reports unhealthy
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

fn default_true() -> bool {
    true
}

fn default_reconcile_interval() -> u64 {
    60
}

fn default_call_timeout() -> u64 {
    5
}

fn default_failure_threshold() -> u32 {
    5
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            route_table_ids: vec![],
            interval_secs: default_reconcile_interval(),
            call_timeout_secs: default_call_timeout(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

fn de_route_table_ids<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Csv(String),
    }

    let mut ids: Vec<String> = match Raw::deserialize(deserializer)? {
        Raw::List(list) => list,
        Raw::Csv(csv) => csv
            .split(',')
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect(),
    };
    ids.sort();
    ids.dedup();
    Ok(ids)
}

/// Forwarding proxy configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Additional backends tried after the first connect failure
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_probe_failure_threshold")]
    pub probe_failure_threshold: u32,
    #[serde(default = "default_probe_recovery_threshold")]
    pub probe_recovery_threshold: u32,
    #[serde(default)]
    pub listeners: Vec<ListenerConfig>,
}

fn default_strategy() -> String {
    "round_robin".to_string()
}

fn default_connect_timeout() -> u64 {
    3000
}

fn default_retry_limit() -> u32 {
    2
}

fn default_probe_interval() -> u64 {
    10
}

fn default_probe_timeout() -> u64 {
    2000
}

fn default_probe_failure_threshold() -> u32 {
    3
}

fn default_probe_recovery_threshold() -> u32 {
    2
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            strategy: default_strategy(),
            connect_timeout_ms: default_connect_timeout(),
            retry_limit: default_retry_limit(),
            probe_interval_secs: default_probe_interval(),
            probe_timeout_ms: default_probe_timeout(),
            probe_failure_threshold: default_probe_failure_threshold(),
            probe_recovery_threshold: default_probe_recovery_threshold(),
            listeners: vec![],
        }
    }
}

/// A single forwarding listener and its backend pool
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenerConfig {
    pub port: u16,
    pub backends: Vec<String>,
}

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/default.toml")
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            // Start with default values
            .set_default("agent.admin_host", "0.0.0.0")?
            .set_default("agent.admin_port", 8080)?
            .set_default("reconciler.enabled", true)?
            .set_default("reconciler.interval_secs", 60)?
            .set_default("proxy.enabled", false)?
            // Load from configuration file
            .add_source(File::with_name(path.as_ref().to_str().unwrap_or("config/default")).required(false))
            // Override with environment variables (prefixed with NAT_AGENT_)
            .add_source(
                Environment::with_prefix("NAT_AGENT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.agent.admin_port == 0 {
            return Err(AgentError::Config(config::ConfigError::Message(
                "Admin port cannot be 0".to_string(),
            )));
        }

        if self.reconciler.enabled {
            if self.reconciler.route_table_ids.is_empty() {
                return Err(AgentError::Config(config::ConfigError::Message(
                    "Reconciler is enabled but no route table ids are configured".to_string(),
                )));
            }
            if self.reconciler.call_timeout_secs == 0 {
                return Err(AgentError::Config(config::ConfigError::Message(
                    "Provider call timeout cannot be 0".to_string(),
                )));
            }
            if self.reconciler.failure_threshold == 0 {
                return Err(AgentError::Config(config::ConfigError::Message(
                    "Reconciler failure threshold must be at least 1".to_string(),
                )));
            }
        }

        if self.proxy.enabled {
            if self.proxy.listeners.is_empty() {
                return Err(AgentError::Config(config::ConfigError::Message(
                    "Proxy is enabled but no listeners are configured".to_string(),
                )));
            }
            if crate::proxy::BalancingStrategy::parse(&self.proxy.strategy).is_none() {
                return Err(AgentError::Config(config::ConfigError::Message(format!(
                    "Unknown balancing strategy '{}'. Must be 'round_robin', 'least_connections' or 'random'",
                    self.proxy.strategy
                ))));
            }
            if self.proxy.probe_failure_threshold == 0 || self.proxy.probe_recovery_threshold == 0 {
                return Err(AgentError::Config(config::ConfigError::Message(
                    "Probe thresholds must be at least 1".to_string(),
                )));
            }
            for listener in &self.proxy.listeners {
                if listener.port == 0 {
                    return Err(AgentError::Config(config::ConfigError::Message(
                        "Listener port cannot be 0".to_string(),
                    )));
                }
                if listener.backends.is_empty() {
                    return Err(AgentError::Config(config::ConfigError::Message(format!(
                        "Listener on port {} must have at least one backend",
                        listener.port
                    ))));
                }
                for backend in &listener.backends {
                    if backend.parse::<SocketAddr>().is_err() {
                        return Err(AgentError::Config(config::ConfigError::Message(format!(
                            "Backend '{}' is not a valid address:port pair",
                            backend
                        ))));
                    }
                }
            }
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            reconciler: ReconcilerConfig::default(),
            proxy: ProxyConfig::default(),
        }
    }
}
