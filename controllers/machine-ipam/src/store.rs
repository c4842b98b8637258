//! Cluster state access
//!
//! The reconciler reads and writes machines through these traits so that it
//! can be exercised against an in-memory store in tests.

use crate::error::ControllerError;
use async_trait::async_trait;
use crds::{Machine, VSphereMachine};
use kube::api::{ListParams, PostParams};
use kube::{Api, Client, ResourceExt};
use tracing::debug;

/// Read and conditionally update VSphereMachines
#[async_trait]
pub trait MachineStore: Send + Sync {
    /// Fetch a machine, `None` if it no longer exists
    async fn get_machine(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<VSphereMachine>, ControllerError>;

    /// Replace a machine.
    ///
    /// The write only succeeds if `metadata.resourceVersion` still matches the
    /// stored object; otherwise, or if the object was deleted meanwhile,
    /// `ControllerError::Conflict` is returned.
    async fn replace_machine(
        &self,
        machine: &VSphereMachine,
    ) -> Result<VSphereMachine, ControllerError>;
}

/// Look up owner Machines
#[async_trait]
pub trait OwnerLookup: Send + Sync {
    /// Fetch a Machine by name, `None` if it does not exist
    async fn get_owner(&self, namespace: &str, name: &str) -> Result<Option<Machine>, ControllerError>;

    /// All Machines in `namespace` belonging to `cluster`
    async fn list_owners_in_cluster(
        &self,
        namespace: &str,
        cluster: &str,
    ) -> Result<Vec<Machine>, ControllerError>;
}

/// Kubernetes API backed store
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MachineStore for KubeStore {
    async fn get_machine(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<VSphereMachine>, ControllerError> {
        let api: Api<VSphereMachine> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(machine) => Ok(Some(machine)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn replace_machine(
        &self,
        machine: &VSphereMachine,
    ) -> Result<VSphereMachine, ControllerError> {
        let name = machine.name_any();
        let namespace = machine
            .namespace()
            .ok_or_else(|| ControllerError::MissingField(format!("VSphereMachine {} has no namespace", name)))?;
        let api: Api<VSphereMachine> = Api::namespaced(self.client.clone(), &namespace);

        match api.replace(&name, &PostParams::default(), machine).await {
            Ok(updated) => {
                debug!(
                    "Replaced VSphereMachine {}/{} (resourceVersion {:?})",
                    namespace,
                    name,
                    updated.resource_version()
                );
                Ok(updated)
            }
            Err(kube::Error::Api(ae)) if ae.code == 409 => Err(ControllerError::Conflict(format!(
                "VSphereMachine {}/{} was modified concurrently: {}",
                namespace, name, ae.message
            ))),
            // Deleted since it was read; the caller re-reads like any other stale write
            Err(kube::Error::Api(ae)) if ae.code == 404 => Err(ControllerError::Conflict(format!(
                "VSphereMachine {}/{} no longer exists",
                namespace, name
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl OwnerLookup for KubeStore {
    async fn get_owner(&self, namespace: &str, name: &str) -> Result<Option<Machine>, ControllerError> {
        let api: Api<Machine> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(owner) => Ok(Some(owner)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_owners_in_cluster(
        &self,
        namespace: &str,
        cluster: &str,
    ) -> Result<Vec<Machine>, ControllerError> {
        // Machines may carry the cluster only in spec.clusterName, so filter
        // client-side rather than by label selector.
        let api: Api<Machine> = Api::namespaced(self.client.clone(), namespace);
        let owners = api.list(&ListParams::default()).await?;
        Ok(owners
            .items
            .into_iter()
            .filter(|owner| owner.cluster_name() == Some(cluster))
            .collect())
    }
}
