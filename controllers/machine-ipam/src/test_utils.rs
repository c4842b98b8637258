//! Test utilities for unit testing the reconciler
//!
//! This module provides an in-memory store with API server write semantics,
//! a recording event publisher and builders for test machines.

use crate::error::ControllerError;
use crate::events::EventPublisher;
use crate::reconciler::Reconciler;
use crate::store::{MachineStore, OwnerLookup};
use async_trait::async_trait;
use crds::*;
use infoblox_client::MockIpamManager;
use ipnetwork::Ipv4Network;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference, Time};
use kube::runtime::events::EventType;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const NAMESPACE: &str = "default";
pub const MACHINE_NAME: &str = "test-machine";
pub const CLUSTER_NAME: &str = "test-cluster";
pub const NETWORK_NAME: &str = "testNetwork";
pub const NETWORK_VIEW: &str = "testview";
pub const SUBNET: &str = "10.0.0.0/24";

pub fn subnet() -> Ipv4Network {
    SUBNET.parse().unwrap()
}

/// The three network annotations for the standard test scenario
pub fn network_annotations() -> BTreeMap<String, String> {
    BTreeMap::from([
        (NETWORK_NAME_ANNOTATION.to_string(), NETWORK_NAME.to_string()),
        (NETWORK_VIEW_ANNOTATION.to_string(), NETWORK_VIEW.to_string()),
        (SUBNET_ANNOTATION.to_string(), SUBNET.to_string()),
    ])
}

/// Helper to create a static device on `network_name`
pub fn static_device(network_name: &str) -> NetworkDeviceSpec {
    NetworkDeviceSpec::on_network(network_name)
}

/// Helper to create a DHCP device on `network_name`
pub fn dhcp_device(network_name: &str) -> NetworkDeviceSpec {
    NetworkDeviceSpec {
        dhcp4: true,
        ..NetworkDeviceSpec::on_network(network_name)
    }
}

/// Helper to create a test VSphereMachine in the test cluster
pub fn create_test_vsphere_machine(
    name: &str,
    devices: Vec<NetworkDeviceSpec>,
    annotations: BTreeMap<String, String>,
) -> VSphereMachine {
    VSphereMachine {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            labels: Some(BTreeMap::from([(
                CLUSTER_NAME_LABEL.to_string(),
                CLUSTER_NAME.to_string(),
            )])),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: VSphereMachineSpec {
            network: NetworkSpec {
                devices,
                ..Default::default()
            },
            ..Default::default()
        },
    }
}

/// Helper to create a Cluster API Machine in the test cluster
pub fn create_test_owner_machine(name: &str, annotations: BTreeMap<String, String>) -> Machine {
    Machine {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            uid: Some(format!("uid-{}", name)),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: MachineSpec {
            cluster_name: CLUSTER_NAME.to_string(),
            ..Default::default()
        },
    }
}

/// Point `machine` at `owner` through an owner reference
pub fn with_owner_reference(mut machine: VSphereMachine, owner: &str) -> VSphereMachine {
    machine.owner_references_mut().push(OwnerReference {
        api_version: format!("{}/v1alpha3", OWNER_API_GROUP),
        kind: OWNER_KIND.to_string(),
        name: owner.to_string(),
        uid: format!("uid-{}", owner),
        controller: Some(true),
        ..Default::default()
    });
    machine
}

fn deletion_time() -> Time {
    serde_json::from_value(serde_json::json!("2026-01-01T00:00:00Z")).unwrap()
}

type Key = (String, String);

fn key_of<K: ResourceExt>(obj: &K) -> Key {
    (obj.namespace().unwrap_or_default(), obj.name_any())
}

#[derive(Default)]
struct FakeState {
    machines: BTreeMap<Key, VSphereMachine>,
    owners: BTreeMap<Key, Machine>,
    resource_version: u64,
    injected_conflicts: usize,
    replace_calls: usize,
}

impl FakeState {
    fn next_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }
}

/// In-memory store with API server semantics for the parts the reconciler uses:
/// - replace is rejected unless the resource version matches
/// - delete of an object with finalizers only sets the deletion timestamp
/// - an object being deleted disappears once its last finalizer is removed
///
/// Clones share state.
#[derive(Clone, Default)]
pub struct FakeStore {
    state: Arc<Mutex<FakeState>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a machine, returning it as stored
    pub fn create_machine(&self, mut machine: VSphereMachine) -> VSphereMachine {
        let mut state = self.state.lock().unwrap();
        machine.metadata.resource_version = Some(state.next_version());
        state.machines.insert(key_of(&machine), machine.clone());
        machine
    }

    pub fn create_owner(&self, owner: Machine) {
        self.state.lock().unwrap().owners.insert(key_of(&owner), owner);
    }

    /// Current stored version of a machine
    pub fn machine(&self, name: &str) -> Option<VSphereMachine> {
        self.state
            .lock()
            .unwrap()
            .machines
            .get(&(NAMESPACE.to_string(), name.to_string()))
            .cloned()
    }

    /// All stored machines
    pub fn machines(&self) -> Vec<VSphereMachine> {
        self.state.lock().unwrap().machines.values().cloned().collect()
    }

    /// Request deletion the way the API server handles it
    pub fn delete_machine(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        let key = (NAMESPACE.to_string(), name.to_string());
        let Some(mut machine) = state.machines.remove(&key) else {
            return;
        };
        if machine.finalizers().is_empty() {
            return;
        }
        if machine.metadata.deletion_timestamp.is_none() {
            machine.metadata.deletion_timestamp = Some(deletion_time());
            machine.metadata.resource_version = Some(state.next_version());
        }
        state.machines.insert(key, machine);
    }

    /// Modify a machine as another writer would, bumping its resource version
    pub fn update_machine(&self, name: &str, update: impl FnOnce(&mut VSphereMachine)) {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        if let Some(machine) = state.machines.get_mut(&(NAMESPACE.to_string(), name.to_string())) {
            update(machine);
            machine.metadata.resource_version = Some(version);
        }
    }

    /// Reject the next `count` replaces as if another writer got there first
    pub fn inject_conflicts(&self, count: usize) {
        self.state.lock().unwrap().injected_conflicts = count;
    }

    /// Number of replace attempts, successful or not
    pub fn replace_calls(&self) -> usize {
        self.state.lock().unwrap().replace_calls
    }
}

#[async_trait]
impl MachineStore for FakeStore {
    async fn get_machine(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<VSphereMachine>, ControllerError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .machines
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn replace_machine(
        &self,
        machine: &VSphereMachine,
    ) -> Result<VSphereMachine, ControllerError> {
        let mut state = self.state.lock().unwrap();
        state.replace_calls += 1;
        let key = key_of(machine);

        if state.injected_conflicts > 0 {
            state.injected_conflicts -= 1;
            let version = state.next_version();
            if let Some(stored) = state.machines.get_mut(&key) {
                stored.metadata.resource_version = Some(version);
            }
            return Err(ControllerError::Conflict(format!("{}/{} injected conflict", key.0, key.1)));
        }

        let stored_version = match state.machines.get(&key) {
            Some(stored) => stored.metadata.resource_version.clone(),
            None => {
                return Err(ControllerError::Conflict(format!("{}/{} no longer exists", key.0, key.1)));
            }
        };
        if stored_version != machine.metadata.resource_version {
            return Err(ControllerError::Conflict(format!(
                "{}/{} has resourceVersion {:?}, update based on {:?}",
                key.0, key.1, stored_version, machine.metadata.resource_version
            )));
        }

        let mut updated = machine.clone();
        updated.metadata.resource_version = Some(state.next_version());
        if updated.is_being_deleted() && updated.finalizers().is_empty() {
            state.machines.remove(&key);
        } else {
            state.machines.insert(key, updated.clone());
        }
        Ok(updated)
    }
}

#[async_trait]
impl OwnerLookup for FakeStore {
    async fn get_owner(&self, namespace: &str, name: &str) -> Result<Option<Machine>, ControllerError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .owners
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn list_owners_in_cluster(
        &self,
        namespace: &str,
        cluster: &str,
    ) -> Result<Vec<Machine>, ControllerError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .owners
            .values()
            .filter(|owner| owner.namespace().as_deref() == Some(namespace))
            .filter(|owner| owner.cluster_name() == Some(cluster))
            .cloned()
            .collect())
    }
}

/// An event captured by `RecordingEventPublisher`
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub object: String,
    pub warning: bool,
    pub reason: String,
    pub note: Option<String>,
}

/// Event publisher that keeps every event in memory
#[derive(Clone, Default)]
pub struct RecordingEventPublisher {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl RecordingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.reason).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(
        &self,
        reference: &ObjectReference,
        type_: EventType,
        reason: &str,
        _action: &str,
        note: Option<String>,
    ) {
        self.events.lock().unwrap().push(RecordedEvent {
            object: reference.name.clone().unwrap_or_default(),
            warning: matches!(type_, EventType::Warning),
            reason: reason.to_string(),
            note,
        });
    }
}

/// Helper to create a reconciler backed by in-memory fakes
pub fn create_test_reconciler(
    ipam: MockIpamManager,
    store: FakeStore,
    events: RecordingEventPublisher,
) -> Reconciler {
    Reconciler::new(
        ipam,
        Arc::new(store.clone()),
        Arc::new(store),
        Arc::new(events),
    )
}

/// Poll `check` every `interval` until it holds or `timeout` elapses
pub async fn eventually<F, Fut>(timeout: Duration, interval: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(timeout, async {
        loop {
            if check().await {
                return;
            }
            tokio::time::sleep(interval).await;
        }
    })
    .await
    .is_ok()
}

/// Reconcile every stored machine over and over, one at a time, until aborted
pub fn spawn_reconcile_loop(
    reconciler: Arc<Reconciler>,
    store: FakeStore,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            for machine in store.machines() {
                let _ = reconciler.reconcile_machine(&machine).await;
            }
            tokio::time::sleep(interval).await;
        }
    })
}
