//! IpamManager trait for mocking
//!
//! This trait abstracts the address allocation service so that the controller
//! can be tested without a running Infoblox grid. `InfobloxClient` implements
//! it for production, `MockIpamManager` (feature `test-util`) for tests.

use crate::error::IpamError;
use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;

/// Address allocation capability consumed by the controller.
///
/// Both operations are idempotent per `(identifier, network_view, subnet)`:
/// asking again for an identifier that already holds a lease returns the same
/// address, and releasing an identifier without a lease succeeds.
/// Implementations must be safe for concurrent use across identifiers.
#[async_trait::async_trait]
pub trait IpamManager: Send + Sync {
    /// Check that the service is reachable and the credentials are accepted.
    async fn validate_connection(&self) -> Result<(), IpamError>;

    /// Return the address leased to `identifier`, allocating the next free one if needed.
    async fn get_or_allocate_ip(
        &self,
        identifier: &str,
        network_view: &str,
        subnet: Ipv4Network,
    ) -> Result<Ipv4Addr, IpamError>;

    /// Release every lease held by `identifier` in `subnet`.
    async fn release_ip(
        &self,
        identifier: &str,
        network_view: &str,
        subnet: Ipv4Network,
    ) -> Result<(), IpamError>;
}
