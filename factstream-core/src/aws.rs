//! Configuration shared by the AWS service clients.
//!
//! Requests are signed with credentials from the default provider chain
//! (environment, profile, container or instance metadata).
use std::time::Duration;

use aws_config::{retry::RetryConfig, timeout::TimeoutConfig, BehaviorVersion, ConfigLoader};
use aws_sdk_glue::config::Region;
use tracing::debug;

pub use aws_sdk_glue::config::Credentials;

/// Start loading the configuration for a client of `region`.
///
/// `endpoint` replaces the regional service endpoint, e.g. for a VPC endpoint or a local
/// mock. The SDK's own retries are disabled, every operation either succeeds or fails
/// within `timeout`.
pub fn config_loader(region: &str, endpoint: Option<&str>, timeout: Duration) -> ConfigLoader {
    let loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_owned()))
        .retry_config(RetryConfig::disabled())
        .timeout_config(TimeoutConfig::builder().operation_timeout(timeout).build());
    match endpoint {
        Some(endpoint) => {
            debug!("Using endpoint {endpoint} in {region}");
            loader.endpoint_url(endpoint)
        }
        None => loader,
    }
}
