//! Kubernetes resource watcher.
//!
//! Runs a kube_runtime::Controller over VSphereMachines. Owner Machines are
//! watched too, so a change to inherited annotations reaches the
//! VSphereMachines that depend on them.

use crate::error::ControllerError;
use crate::reconciler::{ReconcileOutcome, Reconciler};
use crate::reconciler::annotations::owner_machine_name;
use crds::{Machine, VSphereMachine};
use futures::StreamExt;
use kube::{Api, ResourceExt};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{Controller, watcher, controller::{Action, Config as ControllerConfig}};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Requeue delay after an update conflict
const CONFLICT_REQUEUE: Duration = Duration::from_secs(1);

fn resource_key(machine: &VSphereMachine) -> String {
    format!(
        "{}/{}",
        machine.namespace().unwrap_or_else(|| "default".to_string()),
        machine.name_any()
    )
}

/// VSphereMachines whose annotations may come from `owner`
pub(crate) fn owned_machines(
    owner: &Machine,
    machines: &[Arc<VSphereMachine>],
) -> Vec<ObjectRef<VSphereMachine>> {
    let owner_name = owner.name_any();
    let namespace = owner.namespace();
    let cluster = owner.cluster_name();

    machines
        .iter()
        .filter(|m| m.namespace() == namespace)
        .filter(|m| match owner_machine_name(m) {
            Some(referenced) => referenced == owner_name,
            // Only machines without an owner reference resolve by cluster name
            None => cluster.is_some() && m.cluster_name() == cluster,
        })
        .map(|m| ObjectRef::from_obj(m.as_ref()))
        .collect()
}

async fn reconcile(
    machine: Arc<VSphereMachine>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ControllerError> {
    let key = resource_key(&machine);
    let outcome = ctx.reconcile_machine(&machine).await?;
    debug!("Reconciled VSphereMachine {}: {:?}", key, outcome);

    match outcome {
        ReconcileOutcome::Gone | ReconcileOutcome::Released => ctx.forget(&key),
        _ => ctx.reset_error(&key),
    }

    Ok(Action::await_change())
}

fn error_policy(machine: Arc<VSphereMachine>, error: &ControllerError, ctx: Arc<Reconciler>) -> Action {
    let key = resource_key(&machine);

    if error.is_conflict() {
        debug!("VSphereMachine {} kept changing, requeueing: {}", key, error);
        return Action::requeue(CONFLICT_REQUEUE);
    }

    ctx.increment_error(&key);
    let (backoff_seconds, error_count) = ctx.get_backoff_for_resource(&key);
    warn!(
        "Reconciliation of VSphereMachine {} failed (error #{}), retrying in {}s: {}",
        key, error_count, backoff_seconds, error
    );
    Action::requeue(Duration::from_secs(backoff_seconds))
}

/// Watch VSphereMachines (and their owner Machines) until shutdown.
pub async fn watch_vsphere_machines(
    machines: Api<VSphereMachine>,
    owners: Api<Machine>,
    reconciler: Arc<Reconciler>,
    concurrency: u16,
) -> Result<(), ControllerError> {
    info!("Starting VSphereMachine watcher");

    let controller = Controller::new(machines, watcher::Config::default());
    let cache = controller.store();

    controller
        .watches(owners, watcher::Config::default(), move |owner: Machine| {
            owned_machines(&owner, &cache.state())
        })
        .with_config(
            ControllerConfig::default()
                .debounce(Duration::from_secs(1))
                .concurrency(concurrency),
        )
        .shutdown_on_signal()
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!("Finished reconciling {}", obj),
                Err(e) => error!("Controller error: {}", e),
            }
        })
        .await;

    info!("VSphereMachine watcher stopped");
    Ok(())
}
