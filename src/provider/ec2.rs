//! EC2 implementation of the route provider

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::BehaviorVersion;
use aws_sdk_ec2::config::Region;
use aws_sdk_ec2::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_ec2::types::AttributeBooleanValue;
use aws_sdk_ec2::Client;
use tracing::debug;

use crate::provider::{ProviderError, RouteProvider, RouteTableState};

/// Catch-all destination for egress traffic
const DEFAULT_ROUTE_CIDR: &str = "0.0.0.0/0";

/// EC2-backed route provider
pub struct Ec2RouteProvider {
    client: Client,
}

impl Ec2RouteProvider {
    /// Create a provider using the SDK default credential chain.
    ///
    /// When no region is given the SDK resolves one from the environment
    /// (on-instance this is the instance's own region).
    pub async fn new(region: Option<String>) -> Self {
        let retry = RetryConfig::standard().with_max_attempts(3);
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).retry_config(retry);
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let config = loader.load().await;
        Self {
            client: Client::new(&config),
        }
    }
}

#[async_trait]
impl RouteProvider for Ec2RouteProvider {
    async fn describe_route_table(
        &self,
        table_id: &str,
    ) -> std::result::Result<RouteTableState, ProviderError> {
        let resp = self
            .client
            .describe_route_tables()
            .route_table_ids(table_id)
            .send()
            .await
            .map_err(classify_sdk_error)?;

        let table = resp
            .route_tables()
            .first()
            .ok_or_else(|| ProviderError::StaleReference(format!("route table {table_id} not found")))?;

        let default_route_target = table
            .routes()
            .iter()
            .find(|route| route.destination_cidr_block() == Some(DEFAULT_ROUTE_CIDR))
            .and_then(route_target);

        debug!(
            table = table_id,
            route_target = default_route_target.as_deref().unwrap_or("none"),
            "Described route table"
        );

        Ok(RouteTableState {
            table_id: table_id.to_string(),
            default_route_target,
        })
    }

    async fn create_default_route(
        &self,
        table_id: &str,
        interface_id: &str,
    ) -> std::result::Result<(), ProviderError> {
        self.client
            .create_route()
            .route_table_id(table_id)
            .destination_cidr_block(DEFAULT_ROUTE_CIDR)
            .network_interface_id(interface_id)
            .send()
            .await
            .map_err(classify_sdk_error)?;
        Ok(())
    }

    async fn replace_default_route(
        &self,
        table_id: &str,
        interface_id: &str,
    ) -> std::result::Result<(), ProviderError> {
        self.client
            .replace_route()
            .route_table_id(table_id)
            .destination_cidr_block(DEFAULT_ROUTE_CIDR)
            .network_interface_id(interface_id)
            .send()
            .await
            .map_err(classify_sdk_error)?;
        Ok(())
    }

    async fn disable_source_dest_check(
        &self,
        instance_id: &str,
    ) -> std::result::Result<(), ProviderError> {
        self.client
            .modify_instance_attribute()
            .instance_id(instance_id)
            .source_dest_check(AttributeBooleanValue::builder().value(false).build())
            .send()
            .await
            .map_err(classify_sdk_error)?;
        Ok(())
    }
}

/// Extract whichever target id a route points at.
///
/// A sibling NAT instance shows up as a network interface, but a table may
/// also hold a default route aimed at a gateway; either way a target other
/// than our own interface gets replaced.
fn route_target(route: &aws_sdk_ec2::types::Route) -> Option<String> {
    route
        .network_interface_id()
        .or_else(|| route.gateway_id())
        .or_else(|| route.nat_gateway_id())
        .or_else(|| route.instance_id())
        .map(str::to_string)
}

/// Map SDK failures into the agent's error taxonomy
fn classify_sdk_error<E, R>(err: SdkError<E, R>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    match err {
        SdkError::ServiceError(context) => {
            let service_err = context.err();
            let code = service_err.code().unwrap_or_default().to_string();
            let message = service_err
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| service_err.to_string());

            if code == "RequestLimitExceeded" || code.contains("Throttl") {
                ProviderError::Throttled(message)
            } else if code.contains("NotFound") {
                ProviderError::StaleReference(message)
            } else if code == "UnauthorizedOperation" || code.contains("AccessDenied") {
                ProviderError::PermissionDenied(message)
            } else {
                ProviderError::Api(format!("{code}: {message}"))
            }
        }
        SdkError::TimeoutError(_) => ProviderError::Timeout("provider request timed out".to_string()),
        SdkError::DispatchFailure(context) => {
            ProviderError::Connection(format!("dispatch failure: {context:?}"))
        }
        other => ProviderError::Api(format!("{other:?}")),
    }
}
