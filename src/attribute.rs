//! Source/destination check mutation for the local instance

use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::provider::{InstanceIdentity, RouteProvider};

/// Disable source/destination checking so the instance can forward
/// traffic for other hosts.
///
/// Failure is non-fatal: the attribute survives instance recycling, so it
/// may already be correct from a previous lifecycle. Route reconciliation
/// proceeds either way. Returns whether the call succeeded.
pub async fn disable_source_dest_check(
    provider: &dyn RouteProvider,
    identity: &InstanceIdentity,
    call_timeout: Duration,
) -> bool {
    let result = timeout(
        call_timeout,
        provider.disable_source_dest_check(&identity.instance_id),
    )
    .await;

    match result {
        Ok(Ok(())) => {
            info!(
                instance = %identity.instance_id,
                "Disabled source/destination check"
            );
            true
        }
        Ok(Err(err)) => {
            warn!(
                instance = %identity.instance_id,
                error = %err,
                "Failed to disable source/destination check"
            );
            false
        }
        Err(_) => {
            warn!(
                instance = %identity.instance_id,
                "Timed out disabling source/destination check"
            );
            false
        }
    }
}
