//! Cloud provider module - control-plane trait, EC2 client, instance metadata

pub mod ec2;
pub mod metadata;

use async_trait::async_trait;
use thiserror::Error;

pub use metadata::{ImdsClient, InstanceIdentity};

/// Errors surfaced by provider control-plane calls
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request throttled: {0}")]
    Throttled(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failure: {0}")]
    Connection(String),

    #[error("referenced resource no longer exists: {0}")]
    StaleReference(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("provider API error: {0}")]
    Api(String),
}

impl ProviderError {
    /// Whether the error is expected to clear on its own by the next pass
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Throttled(_) | ProviderError::Timeout(_) | ProviderError::Connection(_)
        )
    }
}

/// Freshly observed state of a single route table.
///
/// Never cached across reconciliation passes; callers re-read before
/// every mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTableState {
    pub table_id: String,
    /// Target id currently holding the default route, if any
    pub default_route_target: Option<String>,
}

/// Control-plane operations the agent consumes.
///
/// All calls are fallible, rate-limited and eventually consistent; callers
/// bound every call with a timeout.
#[async_trait]
pub trait RouteProvider: Send + Sync {
    /// Fetch the current state of a route table
    async fn describe_route_table(
        &self,
        table_id: &str,
    ) -> std::result::Result<RouteTableState, ProviderError>;

    /// Install a default route pointing at the given network interface
    async fn create_default_route(
        &self,
        table_id: &str,
        interface_id: &str,
    ) -> std::result::Result<(), ProviderError>;

    /// Repoint an existing default route at the given network interface
    async fn replace_default_route(
        &self,
        table_id: &str,
        interface_id: &str,
    ) -> std::result::Result<(), ProviderError>;

    /// Disable source/destination checking for the instance
    async fn disable_source_dest_check(
        &self,
        instance_id: &str,
    ) -> std::result::Result<(), ProviderError>;
}
