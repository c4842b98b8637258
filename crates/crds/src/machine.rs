//! Cluster API Machine
//!
//! The owning machine. Its annotations are inherited by a VSphereMachine
//! that does not carry its own network annotations.

use crate::constants::CLUSTER_NAME_LABEL;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1alpha3",
    kind = "Machine",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    /// Name of the Cluster this machine belongs to
    #[serde(default)]
    pub cluster_name: String,

    /// Bootstrap, infrastructure reference, version, ...
    #[serde(flatten)]
    #[schemars(skip)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Machine {
    /// Cluster this machine belongs to.
    ///
    /// `spec.clusterName` is authoritative; the cluster-name label is used
    /// when the spec field is empty.
    pub fn cluster_name(&self) -> Option<&str> {
        if !self.spec.cluster_name.is_empty() {
            return Some(self.spec.cluster_name.as_str());
        }
        self.labels().get(CLUSTER_NAME_LABEL).map(String::as_str)
    }
}
