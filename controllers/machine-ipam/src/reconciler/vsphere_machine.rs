//! VSphereMachine address reconciliation
//!
//! Every decision is derived from the observed object:
//! - no deletion timestamp, target device without address: allocate, then
//!   write address and finalizer in a single update
//! - deletion timestamp with our finalizer: release, then drop the finalizer
//! - anything else: nothing to do
//!
//! Updates are conditional on the observed resource version. On conflict
//! the machine is read again and the decision is made from scratch.

use super::annotations::{self, NetworkAnnotations, Resolution, UnresolvableReason};
use super::devices;
use super::Reconciler;
use crate::error::ControllerError;
use crate::events::{actions, reasons};
use crds::{VSphereMachine, IP_FINALIZER};
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

/// Attempts per reconciliation before a conflict is handed back to the scheduler
pub const MAX_CONFLICT_RETRIES: usize = 5;

/// Why a machine is left alone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnmanagedReason {
    Unresolvable(UnresolvableReason),
    /// The device on the requested network uses DHCP
    DhcpEnabled,
}

/// What a reconciliation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The machine no longer exists
    Gone,
    Unmanaged(UnmanagedReason),
    /// No device is attached to the requested network yet
    AwaitingDevice,
    Allocated { address: String },
    AlreadyAllocated,
    Released,
    /// Deleted without our finalizer
    NothingToRelease,
    /// The target device has an address we did not allocate
    Foreign,
}

impl Reconciler {
    /// Reconcile a single VSphereMachine.
    #[instrument(skip_all, fields(ns = %machine.namespace().unwrap_or_else(|| "default".into()), name = %machine.name_any()))]
    pub async fn reconcile_machine(
        &self,
        machine: &VSphereMachine,
    ) -> Result<ReconcileOutcome, ControllerError> {
        let name = machine
            .meta()
            .name
            .clone()
            .ok_or_else(|| ControllerError::MissingField("VSphereMachine missing name".to_string()))?;
        let namespace = machine.namespace().unwrap_or_else(|| "default".to_string());

        let mut current = machine.clone();
        let mut attempt = 1;
        loop {
            match self.reconcile_once(&current, &name).await {
                Err(e) if e.is_conflict() && attempt < MAX_CONFLICT_RETRIES => {
                    debug!(
                        "Conflict updating VSphereMachine {}/{} (attempt {}/{}), re-reading",
                        namespace, name, attempt, MAX_CONFLICT_RETRIES
                    );
                    attempt += 1;
                    match self.machines.get_machine(&namespace, &name).await? {
                        Some(fresh) => current = fresh,
                        None => {
                            debug!("VSphereMachine {}/{} is gone", namespace, name);
                            return Ok(ReconcileOutcome::Gone);
                        }
                    }
                }
                result => return result,
            }
        }
    }

    async fn reconcile_once(
        &self,
        machine: &VSphereMachine,
        name: &str,
    ) -> Result<ReconcileOutcome, ControllerError> {
        if machine.is_being_deleted() {
            self.release(machine, name).await
        } else {
            self.allocate(machine, name).await
        }
    }

    async fn allocate(
        &self,
        machine: &VSphereMachine,
        name: &str,
    ) -> Result<ReconcileOutcome, ControllerError> {
        if devices::all_dhcp(machine.devices()) {
            debug!("Every device of VSphereMachine {} uses DHCP, nothing to allocate", name);
            return Ok(ReconcileOutcome::Unmanaged(UnmanagedReason::DhcpEnabled));
        }

        let NetworkAnnotations {
            network_name,
            network_view,
            subnet,
        } = match annotations::resolve(machine, self.owners.as_ref()).await? {
            Resolution::Resolved { annotations, .. } => annotations,
            Resolution::Unresolvable(reason) => {
                warn!("Skipping VSphereMachine {}: {}", name, reason);
                self.events
                    .publish(
                        &machine.object_ref(&()),
                        EventType::Warning,
                        reasons::UNRESOLVABLE,
                        actions::RESOLVE,
                        Some(reason.to_string()),
                    )
                    .await;
                return Ok(ReconcileOutcome::Unmanaged(UnmanagedReason::Unresolvable(reason)));
            }
        };

        let Some(index) = devices::select_target(machine.devices(), &network_name) else {
            if devices::dhcp_only(machine.devices(), &network_name) {
                debug!("Device on network {} uses DHCP, nothing to allocate", network_name);
                return Ok(ReconcileOutcome::Unmanaged(UnmanagedReason::DhcpEnabled));
            }
            debug!("No device attached to network {} yet", network_name);
            return Ok(ReconcileOutcome::AwaitingDevice);
        };

        let has_finalizer = machine.has_finalizer(IP_FINALIZER);
        if !machine.devices()[index].ip_addrs.is_empty() {
            if has_finalizer {
                debug!("VSphereMachine {} already has an address", name);
                return Ok(ReconcileOutcome::AlreadyAllocated);
            }
            debug!("VSphereMachine {} has an address not allocated by this controller", name);
            return Ok(ReconcileOutcome::Foreign);
        }

        let ip = match self.ipam.get_or_allocate_ip(name, &network_view, subnet).await {
            Ok(ip) => ip,
            Err(e) => {
                error!("Failed to allocate address for {} in {} ({}): {}", name, subnet, network_view, e);
                self.events
                    .publish(
                        &machine.object_ref(&()),
                        EventType::Warning,
                        reasons::ALLOCATION_FAILED,
                        actions::ALLOCATE,
                        Some(e.to_string()),
                    )
                    .await;
                return Err(e.into());
            }
        };
        let address = devices::format_address(ip, subnet);

        let mut updated = machine.clone();
        updated.spec.network.devices[index].ip_addrs.push(address.clone());
        if !has_finalizer {
            updated.finalizers_mut().push(IP_FINALIZER.to_string());
        }
        self.machines.replace_machine(&updated).await?;

        info!(
            "Allocated {} to device {} of VSphereMachine {} ({})",
            address, index, name, network_view
        );
        self.events
            .publish(
                &machine.object_ref(&()),
                EventType::Normal,
                reasons::IP_ALLOCATED,
                actions::ALLOCATE,
                Some(format!("Allocated {} on network {}", address, network_name)),
            )
            .await;

        Ok(ReconcileOutcome::Allocated { address })
    }

    async fn release(
        &self,
        machine: &VSphereMachine,
        name: &str,
    ) -> Result<ReconcileOutcome, ControllerError> {
        if !machine.has_finalizer(IP_FINALIZER) {
            debug!("VSphereMachine {} is being deleted without our finalizer", name);
            return Ok(ReconcileOutcome::NothingToRelease);
        }

        let NetworkAnnotations {
            network_view,
            subnet,
            ..
        } = match annotations::resolve(machine, self.owners.as_ref()).await? {
            Resolution::Resolved { annotations, .. } => annotations,
            Resolution::Unresolvable(reason) => {
                // Releasing needs the view and subnet, keep the finalizer and retry
                error!("Cannot release address of VSphereMachine {}: {}", name, reason);
                self.events
                    .publish(
                        &machine.object_ref(&()),
                        EventType::Warning,
                        reasons::RELEASE_FAILED,
                        actions::RELEASE,
                        Some(reason.to_string()),
                    )
                    .await;
                return Err(ControllerError::Unresolvable(format!(
                    "cannot release address of {}: {}",
                    name, reason
                )));
            }
        };

        if let Err(e) = self.ipam.release_ip(name, &network_view, subnet).await {
            error!("Failed to release address of {} in {} ({}): {}", name, subnet, network_view, e);
            self.events
                .publish(
                    &machine.object_ref(&()),
                    EventType::Warning,
                    reasons::RELEASE_FAILED,
                    actions::RELEASE,
                    Some(e.to_string()),
                )
                .await;
            return Err(e.into());
        }

        let mut updated = machine.clone();
        updated.finalizers_mut().retain(|f| f != IP_FINALIZER);
        self.machines.replace_machine(&updated).await?;

        info!("Released address of VSphereMachine {} in {} ({})", name, subnet, network_view);
        self.events
            .publish(
                &machine.object_ref(&()),
                EventType::Normal,
                reasons::IP_RELEASED,
                actions::RELEASE,
                Some(format!("Released address in {}", subnet)),
            )
            .await;

        Ok(ReconcileOutcome::Released)
    }
}
