//! Configuration module - settings loading and validation

pub mod settings;

pub use settings::{
    AgentConfig, ListenerConfig, ProxyConfig, ReconcilerConfig, Settings,
};
