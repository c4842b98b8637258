//! Reconciliation logic for VSphereMachine addresses.
//!
//! - `annotations`: resolves network name, view and subnet (own or inherited)
//! - `devices`: picks the device that receives the address
//! - `vsphere_machine`: the allocate / release decision procedure

pub mod annotations;
pub mod devices;
pub mod vsphere_machine;


pub use vsphere_machine::ReconcileOutcome;

use crate::backoff::FibonacciBackoff;
use crate::events::EventPublisher;
use crate::store::{MachineStore, OwnerLookup};
use infoblox_client::IpamManager;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Backoff state for a resource
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::new(1, 10), // 1 minute min, 10 minutes max
            error_count: 0,
        }
    }

    fn increment_error(&mut self) {
        self.error_count += 1;
    }

    fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Reconciles VSphereMachine addresses against the IPAM service.
pub struct Reconciler {
    pub(crate) ipam: Box<dyn IpamManager>,
    pub(crate) machines: Arc<dyn MachineStore>,
    pub(crate) owners: Arc<dyn OwnerLookup>,
    pub(crate) events: Arc<dyn EventPublisher>,
    /// Error count tracking per resource (namespace/name -> BackoffState)
    backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl Reconciler {
    pub fn new(
        ipam: impl IpamManager + 'static,
        machines: Arc<dyn MachineStore>,
        owners: Arc<dyn OwnerLookup>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            ipam: Box::new(ipam),
            machines,
            owners,
            events,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Get the next backoff for a resource, returns (seconds, error count)
    pub fn get_backoff_for_resource(&self, resource_key: &str) -> (u64, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(resource_key.to_string())
                    .or_insert_with(BackoffState::new);
                let backoff_seconds = state.backoff.next_backoff_seconds();
                (backoff_seconds, state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using default backoff", e);
                (60, 0)
            }
        }
    }

    /// Increment error count for a resource
    pub fn increment_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states
                .entry(resource_key.to_string())
                .or_insert_with(BackoffState::new)
                .increment_error();
        }
    }

    /// Reset error count for a resource (on successful reconciliation)
    pub fn reset_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.get_mut(resource_key) {
                state.reset();
            }
        }
    }

    /// Forget a resource that no longer exists
    pub fn forget(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(resource_key);
        }
    }
}
