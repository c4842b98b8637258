//! Mock IpamManager for unit testing
//!
//! This module provides an in-memory implementation of `IpamManager` that can
//! be used in unit tests without requiring a running Infoblox grid. Every call
//! is recorded so tests can assert on what the controller asked for.

use crate::error::IpamError;
use crate::ipam_trait::IpamManager;
use ipnetwork::Ipv4Network;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

/// Operation recorded by the mock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpamOperation {
    GetOrAllocate,
    Release,
}

/// A single call received by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpamCall {
    pub operation: IpamOperation,
    pub identifier: String,
    pub network_view: String,
    pub subnet: Ipv4Network,
}

type LeaseKey = (String, String, Ipv4Network);

/// Mock IPAM service for testing
///
/// Leases are handed out sequentially per subnet starting at the network
/// address, so the first allocation in `10.0.0.0/24` is `10.0.0.0`.
/// Clones share state, so a test can keep one handle and give another to the
/// code under test.
#[derive(Clone, Default)]
pub struct MockIpamManager {
    leases: Arc<Mutex<HashMap<LeaseKey, Ipv4Addr>>>,
    next_offset: Arc<Mutex<HashMap<Ipv4Network, u32>>>,
    calls: Arc<Mutex<Vec<IpamCall>>>,
    effective_releases: Arc<Mutex<usize>>,
    fail_next_allocation: Arc<Mutex<Option<String>>>,
    fail_next_release: Arc<Mutex<Option<String>>>,
}

impl MockIpamManager {
    /// Create a new mock with no leases
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a lease (for test setup)
    pub fn add_lease(&self, identifier: &str, network_view: &str, subnet: Ipv4Network, ip: Ipv4Addr) {
        self.leases
            .lock()
            .unwrap()
            .insert((identifier.to_string(), network_view.to_string(), subnet), ip);
    }

    /// Current lease of `identifier`, if any
    pub fn lease(&self, identifier: &str, network_view: &str, subnet: Ipv4Network) -> Option<Ipv4Addr> {
        self.leases
            .lock()
            .unwrap()
            .get(&(identifier.to_string(), network_view.to_string(), subnet))
            .copied()
    }

    /// Number of outstanding leases
    pub fn lease_count(&self) -> usize {
        self.leases.lock().unwrap().len()
    }

    /// Every call received so far, in order
    pub fn calls(&self) -> Vec<IpamCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls of a single operation
    pub fn calls_of(&self, operation: IpamOperation) -> Vec<IpamCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.operation == operation)
            .collect()
    }

    /// Releases that actually removed a lease
    pub fn effective_releases(&self) -> usize {
        *self.effective_releases.lock().unwrap()
    }

    /// Make the next `get_or_allocate_ip` fail with an API error
    pub fn fail_next_allocation(&self, message: impl Into<String>) {
        *self.fail_next_allocation.lock().unwrap() = Some(message.into());
    }

    /// Make the next `release_ip` fail with an API error
    pub fn fail_next_release(&self, message: impl Into<String>) {
        *self.fail_next_release.lock().unwrap() = Some(message.into());
    }

    fn record(&self, operation: IpamOperation, identifier: &str, network_view: &str, subnet: Ipv4Network) {
        self.calls.lock().unwrap().push(IpamCall {
            operation,
            identifier: identifier.to_string(),
            network_view: network_view.to_string(),
            subnet,
        });
    }
}

#[async_trait::async_trait]
impl IpamManager for MockIpamManager {
    async fn validate_connection(&self) -> Result<(), IpamError> {
        Ok(())
    }

    async fn get_or_allocate_ip(
        &self,
        identifier: &str,
        network_view: &str,
        subnet: Ipv4Network,
    ) -> Result<Ipv4Addr, IpamError> {
        self.record(IpamOperation::GetOrAllocate, identifier, network_view, subnet);

        if let Some(message) = self.fail_next_allocation.lock().unwrap().take() {
            return Err(IpamError::Api(message));
        }

        let key = (identifier.to_string(), network_view.to_string(), subnet);
        let mut leases = self.leases.lock().unwrap();
        if let Some(ip) = leases.get(&key) {
            return Ok(*ip);
        }

        let mut offsets = self.next_offset.lock().unwrap();
        let offset = offsets.entry(subnet).or_insert(0);
        let ip = subnet.nth(*offset).ok_or_else(|| {
            IpamError::Api(format!("Cannot find 1 available IP address(es) in {}", subnet))
        })?;
        *offset += 1;

        leases.insert(key, ip);
        Ok(ip)
    }

    async fn release_ip(
        &self,
        identifier: &str,
        network_view: &str,
        subnet: Ipv4Network,
    ) -> Result<(), IpamError> {
        self.record(IpamOperation::Release, identifier, network_view, subnet);

        if let Some(message) = self.fail_next_release.lock().unwrap().take() {
            return Err(IpamError::Api(message));
        }

        let key = (identifier.to_string(), network_view.to_string(), subnet);
        if self.leases.lock().unwrap().remove(&key).is_some() {
            *self.effective_releases.lock().unwrap() += 1;
        }
        Ok(())
    }
}
