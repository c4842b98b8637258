//! VSphereMachine
//!
//! The infrastructure machine whose network devices receive addresses.

use crate::constants::CLUSTER_NAME_LABEL;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1alpha3",
    kind = "VSphereMachine",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct VSphereMachineSpec {
    /// Network configuration of the cloned virtual machine
    #[serde(default)]
    pub network: NetworkSpec,

    /// Fields owned by other controllers (template, datacenter, ...)
    #[serde(flatten)]
    #[schemars(skip)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// Ordered list of network devices
    #[serde(default)]
    pub devices: Vec<NetworkDeviceSpec>,

    #[serde(flatten)]
    #[schemars(skip)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDeviceSpec {
    /// Name of the vSphere network the device is attached to
    #[serde(default)]
    pub network_name: String,

    /// Whether IPv4 addresses are obtained through DHCP
    #[serde(default, rename = "dhcp4")]
    pub dhcp4: bool,

    /// Whether IPv6 addresses are obtained through DHCP
    #[serde(default, rename = "dhcp6")]
    pub dhcp6: bool,

    /// Statically assigned addresses in CIDR notation
    #[serde(default, rename = "ipAddrs", skip_serializing_if = "Vec::is_empty")]
    pub ip_addrs: Vec<String>,

    /// Gateway, nameservers, MAC address and other device settings
    #[serde(flatten)]
    #[schemars(skip)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl NetworkDeviceSpec {
    /// Creates a static device attached to `network_name`.
    pub fn on_network(network_name: impl Into<String>) -> Self {
        Self {
            network_name: network_name.into(),
            ..Default::default()
        }
    }

    /// Whether either address family is configured through DHCP.
    pub fn uses_dhcp(&self) -> bool {
        self.dhcp4 || self.dhcp6
    }
}

impl VSphereMachine {
    /// Network devices in declaration order.
    pub fn devices(&self) -> &[NetworkDeviceSpec] {
        &self.spec.network.devices
    }

    /// Value of the Cluster API cluster-name label, if set.
    pub fn cluster_name(&self) -> Option<&str> {
        self.labels().get(CLUSTER_NAME_LABEL).map(String::as_str)
    }

    /// Whether `finalizer` is present on the object.
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers().iter().any(|f| f == finalizer)
    }

    /// Whether deletion has been requested.
    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}
