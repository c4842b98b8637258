//! Well-known annotation, label and finalizer keys.
//!
//! These strings are persisted on cluster objects. Changing any of them
//! orphans existing allocations, so treat them as part of the wire format.

/// Annotation naming the vSphere network whose device receives the address.
pub const NETWORK_NAME_ANNOTATION: &str = "ipam.dcops.microscaler.io/network-name";

/// Annotation naming the Infoblox network view the allocation is tracked in.
pub const NETWORK_VIEW_ANNOTATION: &str = "ipam.dcops.microscaler.io/infoblox-network-view";

/// Annotation carrying the subnet (CIDR) to allocate from.
pub const SUBNET_ANNOTATION: &str = "ipam.dcops.microscaler.io/subnet";

/// Cluster API label correlating infrastructure machines with their cluster.
pub const CLUSTER_NAME_LABEL: &str = "cluster.x-k8s.io/cluster-name";

/// Finalizer marking that the machine holds an address allocated by the controller.
pub const IP_FINALIZER: &str = "ipam.dcops.microscaler.io/ip-address";

/// API group of the owning Cluster API `Machine`.
pub const OWNER_API_GROUP: &str = "cluster.x-k8s.io";

/// Kind of the owning Cluster API `Machine`.
pub const OWNER_KIND: &str = "Machine";
