//! Network annotation resolution
//!
//! A VSphereMachine carrying all three network annotations uses its own.
//! Otherwise the owning Cluster API Machine supplies them, found first by
//! owner reference and then by cluster name.

use crate::error::ControllerError;
use crate::store::OwnerLookup;
use crds::{
    Machine, VSphereMachine, NETWORK_NAME_ANNOTATION, NETWORK_VIEW_ANNOTATION, OWNER_API_GROUP,
    OWNER_KIND, SUBNET_ANNOTATION,
};
use ipnetwork::{IpNetwork, Ipv4Network};
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Resolved network configuration of a machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAnnotations {
    pub network_name: String,
    pub network_view: String,
    /// Normalised to its network address
    pub subnet: Ipv4Network,
}

/// Where resolved annotations came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationSource {
    Machine,
    Owner(String),
}

/// Why annotations could not be resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvableReason {
    /// Neither the machine nor its owner carry a complete annotation set
    MissingAnnotations,
    /// The subnet annotation is not an IPv4 network
    InvalidSubnet(String),
    /// No owner Machine could be found
    OwnerNotFound,
    /// Several Machines of the cluster could be the owner
    OwnerAmbiguous(usize),
}

impl fmt::Display for UnresolvableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnresolvableReason::MissingAnnotations => write!(
                f,
                "annotations {}, {} and {} are not all set",
                NETWORK_NAME_ANNOTATION, NETWORK_VIEW_ANNOTATION, SUBNET_ANNOTATION
            ),
            UnresolvableReason::InvalidSubnet(raw) => {
                write!(f, "subnet '{}' is not an IPv4 network in CIDR notation", raw)
            }
            UnresolvableReason::OwnerNotFound => write!(f, "owner Machine not found"),
            UnresolvableReason::OwnerAmbiguous(count) => {
                write!(f, "{} Machines in the cluster could be the owner", count)
            }
        }
    }
}

/// Result of annotation resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved {
        annotations: NetworkAnnotations,
        source: AnnotationSource,
    },
    Unresolvable(UnresolvableReason),
}

/// Parse a subnet annotation value.
///
/// The value must carry an explicit prefix length; host bits are dropped.
pub fn parse_subnet(raw: &str) -> Result<Ipv4Network, UnresolvableReason> {
    let trimmed = raw.trim();
    let invalid = || UnresolvableReason::InvalidSubnet(raw.to_string());

    if !trimmed.contains('/') {
        return Err(invalid());
    }

    match trimmed.parse::<IpNetwork>().map_err(|_| invalid())? {
        IpNetwork::V4(net) => Ipv4Network::new(net.network(), net.prefix()).map_err(|_| invalid()),
        IpNetwork::V6(_) => Err(invalid()),
    }
}

/// Read a complete annotation set.
///
/// `None` when any of the three annotations is missing or empty.
pub fn from_annotations(
    annotations: &BTreeMap<String, String>,
) -> Option<Result<NetworkAnnotations, UnresolvableReason>> {
    let get = |key: &str| {
        annotations
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    };

    let network_name = get(NETWORK_NAME_ANNOTATION)?;
    let network_view = get(NETWORK_VIEW_ANNOTATION)?;
    let subnet = get(SUBNET_ANNOTATION)?;

    Some(parse_subnet(subnet).map(|subnet| NetworkAnnotations {
        network_name: network_name.to_string(),
        network_view: network_view.to_string(),
        subnet,
    }))
}

/// Name of the owning Cluster API Machine, if the machine has an owner reference to one
pub fn owner_machine_name(machine: &VSphereMachine) -> Option<&str> {
    machine
        .owner_references()
        .iter()
        .find(|owner| {
            owner.kind == OWNER_KIND
                && owner
                    .api_version
                    .split_once('/')
                    .map(|(group, _)| group == OWNER_API_GROUP)
                    .unwrap_or(false)
        })
        .map(|owner| owner.name.as_str())
}

/// Pick the owner among Machines of the same cluster
fn pick_cluster_owner(
    mut candidates: Vec<Machine>,
    machine_name: &str,
) -> Result<Machine, UnresolvableReason> {
    if let Some(index) = candidates.iter().position(|c| c.name_any() == machine_name) {
        return Ok(candidates.swap_remove(index));
    }

    match candidates.len() {
        0 => Err(UnresolvableReason::OwnerNotFound),
        1 => Ok(candidates.remove(0)),
        n => Err(UnresolvableReason::OwnerAmbiguous(n)),
    }
}

fn resolved_from_owner(owner: &Machine) -> Resolution {
    match from_annotations(owner.annotations()) {
        Some(Ok(annotations)) => Resolution::Resolved {
            annotations,
            source: AnnotationSource::Owner(owner.name_any()),
        },
        Some(Err(reason)) => Resolution::Unresolvable(reason),
        None => Resolution::Unresolvable(UnresolvableReason::MissingAnnotations),
    }
}

/// Resolve the network annotations of `machine`.
///
/// Store failures are returned as errors; everything else that prevents
/// resolution is reported as `Resolution::Unresolvable`.
pub async fn resolve(
    machine: &VSphereMachine,
    owners: &dyn OwnerLookup,
) -> Result<Resolution, ControllerError> {
    match from_annotations(machine.annotations()) {
        Some(Ok(annotations)) => {
            return Ok(Resolution::Resolved {
                annotations,
                source: AnnotationSource::Machine,
            });
        }
        Some(Err(reason)) => return Ok(Resolution::Unresolvable(reason)),
        None => {}
    }

    let name = machine.name_any();
    let namespace = machine.namespace().unwrap_or_else(|| "default".to_string());

    let owner_ref = owner_machine_name(machine);
    if let Some(owner_name) = owner_ref {
        if let Some(owner) = owners.get_owner(&namespace, owner_name).await? {
            debug!("Using annotations of owner Machine {}/{}", namespace, owner_name);
            return Ok(resolved_from_owner(&owner));
        }
        debug!(
            "Owner Machine {}/{} of {} not found, falling back to cluster name",
            namespace, owner_name, name
        );
    }

    let Some(cluster) = machine.cluster_name() else {
        return Ok(Resolution::Unresolvable(if owner_ref.is_some() {
            UnresolvableReason::OwnerNotFound
        } else {
            UnresolvableReason::MissingAnnotations
        }));
    };

    let candidates = owners.list_owners_in_cluster(&namespace, cluster).await?;
    match pick_cluster_owner(candidates, &name) {
        Ok(owner) => {
            debug!(
                "Using annotations of Machine {}/{} in cluster {}",
                namespace,
                owner.name_any(),
                cluster
            );
            Ok(resolved_from_owner(&owner))
        }
        Err(reason) => Ok(Resolution::Unresolvable(reason)),
    }
}
