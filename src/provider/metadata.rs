//! Instance metadata service client (IMDSv2)

use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::error::{AgentError, Result};

const TOKEN_TTL_HEADER: &str = "X-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_HEADER: &str = "X-aws-ec2-metadata-token";
const TOKEN_TTL_SECS: &str = "21600";

/// Identity of the local instance.
///
/// Fetched once at startup and immutable for the process lifetime.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceIdentity {
    pub instance_id: String,
    pub interface_id: String,
    pub private_ip: String,
}

/// Session-token metadata client
pub struct ImdsClient {
    client: Client,
    base_url: String,
}

impl ImdsClient {
    /// Create a client against the given metadata endpoint
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| AgentError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the local instance identity.
    ///
    /// Requests a session token first, then reads the instance id, the
    /// primary interface id (via the interface's MAC) and the private IP.
    pub async fn fetch_identity(&self) -> Result<InstanceIdentity> {
        let token = self
            .client
            .put(format!("{}/latest/api/token", self.base_url))
            .header(TOKEN_TTL_HEADER, TOKEN_TTL_SECS)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let instance_id = self.get("instance-id", &token).await?;
        let mac = self.get("mac", &token).await?;
        let interface_id = self
            .get(&format!("network/interfaces/macs/{}/interface-id", mac), &token)
            .await?;
        let private_ip = self.get("local-ipv4", &token).await?;

        debug!(
            instance_id = %instance_id,
            interface_id = %interface_id,
            private_ip = %private_ip,
            "Fetched instance identity"
        );

        Ok(InstanceIdentity {
            instance_id,
            interface_id,
            private_ip,
        })
    }

    async fn get(&self, path: &str, token: &str) -> Result<String> {
        let value = self
            .client
            .get(format!("{}/latest/meta-data/{}", self.base_url, path))
            .header(TOKEN_HEADER, token)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let value = value.trim().to_string();
        if value.is_empty() {
            return Err(AgentError::Metadata(format!(
                "empty metadata value for '{}'",
                path
            )));
        }
        Ok(value)
    }
}
