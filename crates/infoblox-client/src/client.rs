//! Infoblox WAPI client
//!
//! Implements address allocation on top of WAPI `fixedaddress` objects.
//! A lease is a fixed address whose `name` is the identifier, inside the
//! requested network and network view.

use crate::common::HttpClient;
use crate::error::IpamError;
use crate::ipam_trait::IpamManager;
use crate::models::*;
use ipnetwork::Ipv4Network;
use reqwest::Client;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default WAPI version
pub const DEFAULT_WAPI_VERSION: &str = "v2.10";

/// Connection settings for an Infoblox grid master
#[derive(Clone)]
pub struct InfobloxConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub wapi_version: String,
    pub timeout: Duration,
    /// Accept self-signed grid certificates
    pub insecure_skip_verify: bool,
}

impl InfobloxConfig {
    /// Create a configuration with default version, timeout and TLS verification.
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
            wapi_version: DEFAULT_WAPI_VERSION.to_string(),
            timeout: Duration::from_secs(30),
            insecure_skip_verify: false,
        }
    }
}

impl fmt::Debug for InfobloxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfobloxConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("wapi_version", &self.wapi_version)
            .field("timeout", &self.timeout)
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .finish()
    }
}

/// Infoblox WAPI client
pub struct InfobloxClient {
    http: HttpClient,
}

impl InfobloxClient {
    /// Create a new Infoblox client
    pub fn new(config: InfobloxConfig) -> Result<Self, IpamError> {
        if config.base_url.is_empty() {
            return Err(IpamError::InvalidRequest("Infoblox URL must not be empty".to_string()));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .build()
            .map_err(IpamError::Http)?;

        Ok(Self {
            http: HttpClient::new(
                client,
                config.base_url,
                config.wapi_version,
                config.username,
                config.password,
            ),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        self.http.base_url()
    }

    /// Validate credentials and connectivity.
    ///
    /// Reads the grid object, which every authenticated user may see.
    pub async fn validate_connection(&self) -> Result<(), IpamError> {
        debug!("Validating Infoblox credentials and connectivity");
        let _: serde_json::Value = self.http.get("grid", &[]).await?;
        debug!("Infoblox credentials validated successfully");
        Ok(())
    }

    /// Find fixed addresses named `identifier` in `subnet` of `network_view`
    pub async fn find_fixed_addresses(
        &self,
        identifier: &str,
        network_view: &str,
        subnet: Ipv4Network,
    ) -> Result<Vec<FixedAddress>, IpamError> {
        let network = subnet.to_string();
        self.http
            .get(
                "fixedaddress",
                &[
                    ("name", identifier),
                    ("network", &network),
                    ("network_view", network_view),
                    ("_return_fields", FIXED_ADDRESS_RETURN_FIELDS),
                ],
            )
            .await
    }

    /// Reserve the next available address of `subnet` for `identifier`
    pub async fn create_fixed_address(
        &self,
        identifier: &str,
        network_view: &str,
        subnet: Ipv4Network,
    ) -> Result<FixedAddress, IpamError> {
        let mut request = CreateFixedAddress::next_available(identifier, network_view, &subnet.to_string());
        request.comment = Some(format!(
            "managed-by=machine-ipam-controller allocated={}",
            chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        ));
        let body = serde_json::to_value(&request)?;

        self.http
            .post("fixedaddress", &[("_return_fields", FIXED_ADDRESS_RETURN_FIELDS)], &body)
            .await
    }

    /// Parse and sanity-check an address returned by WAPI
    fn parse_leased_address(fixed: &FixedAddress, subnet: Ipv4Network) -> Result<Ipv4Addr, IpamError> {
        let ip: Ipv4Addr = fixed.ipv4addr.parse().map_err(|_| {
            IpamError::InvalidResponse(format!("fixed address has invalid ipv4addr '{}'", fixed.ipv4addr))
        })?;

        if !subnet.contains(ip) {
            return Err(IpamError::InvalidResponse(format!(
                "fixed address {} is outside of subnet {}",
                ip, subnet
            )));
        }

        Ok(ip)
    }

    /// Return the address leased to `identifier`, allocating one if none exists
    pub async fn get_or_allocate_ip(
        &self,
        identifier: &str,
        network_view: &str,
        subnet: Ipv4Network,
    ) -> Result<Ipv4Addr, IpamError> {
        let existing = self.find_fixed_addresses(identifier, network_view, subnet).await?;

        if let Some(fixed) = existing.first() {
            if existing.len() > 1 {
                warn!(
                    "{} fixed addresses named {} in {} ({}), using {}",
                    existing.len(), identifier, subnet, network_view, fixed.ipv4addr
                );
            }
            debug!("Reusing fixed address {} for {} in {} ({})", fixed.ipv4addr, identifier, subnet, network_view);
            return Self::parse_leased_address(fixed, subnet);
        }

        let created = self.create_fixed_address(identifier, network_view, subnet).await?;
        let ip = Self::parse_leased_address(&created, subnet)?;
        info!("Allocated {} for {} in {} ({})", ip, identifier, subnet, network_view);
        Ok(ip)
    }

    /// Delete every fixed address named `identifier` in `subnet`
    pub async fn release_ip(
        &self,
        identifier: &str,
        network_view: &str,
        subnet: Ipv4Network,
    ) -> Result<(), IpamError> {
        let existing = self.find_fixed_addresses(identifier, network_view, subnet).await?;

        if existing.is_empty() {
            debug!("No fixed address for {} in {} ({}), nothing to release", identifier, subnet, network_view);
            return Ok(());
        }

        for fixed in existing {
            match self.http.delete(&fixed.reference).await {
                Ok(()) => info!("Released {} for {} in {} ({})", fixed.ipv4addr, identifier, subnet, network_view),
                // Deleted concurrently, which is what we wanted anyway
                Err(IpamError::NotFound(_)) => {
                    debug!("Fixed address {} already gone", fixed.reference);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl IpamManager for InfobloxClient {
    async fn validate_connection(&self) -> Result<(), IpamError> {
        InfobloxClient::validate_connection(self).await
    }

    async fn get_or_allocate_ip(
        &self,
        identifier: &str,
        network_view: &str,
        subnet: Ipv4Network,
    ) -> Result<Ipv4Addr, IpamError> {
        InfobloxClient::get_or_allocate_ip(self, identifier, network_view, subnet).await
    }

    async fn release_ip(
        &self,
        identifier: &str,
        network_view: &str,
        subnet: Ipv4Network,
    ) -> Result<(), IpamError> {
        InfobloxClient::release_ip(self, identifier, network_view, subnet).await
    }
}
