//! Controller wiring.
//!
//! Builds the Kubernetes and Infoblox clients, the reconciler and the
//! watcher, then runs until the watcher stops.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::events::KubeEventPublisher;
use crate::reconciler::Reconciler;
use crate::store::KubeStore;
use crate::watcher::watch_vsphere_machines;
use crds::{Machine, VSphereMachine};
use infoblox_client::InfobloxClient;
use kube::{Api, Client};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub struct Controller {
    vsphere_machine_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing Machine IPAM Controller");

        let kube_client = Client::try_default().await?;

        let base_url = config.infoblox.base_url.clone();
        let infoblox_client = InfobloxClient::new(config.infoblox)?;

        info!("Validating Infoblox credentials and connectivity...");
        infoblox_client.validate_connection().await.map_err(|e| {
            error!("Failed to validate Infoblox connection: {}", e);
            error!("Please ensure:");
            error!("  1. INFOBLOX_USERNAME and INFOBLOX_PASSWORD are set correctly");
            error!("  2. The user has API access to the grid");
            error!("  3. Infoblox is reachable at {}", base_url);
            error!("  4. INFOBLOX_INSECURE_SKIP_VERIFY is set if the grid uses a self-signed certificate");
            ControllerError::Ipam(e)
        })?;
        info!("Infoblox connectivity established");

        let store = KubeStore::new(kube_client.clone());
        let events = KubeEventPublisher::new(kube_client.clone(), config.instance);
        let reconciler = Arc::new(Reconciler::new(
            infoblox_client,
            Arc::new(store.clone()),
            Arc::new(store),
            Arc::new(events),
        ));

        let (machines, owners): (Api<VSphereMachine>, Api<Machine>) = match config.namespace.as_deref() {
            Some(ns) => (
                Api::namespaced(kube_client.clone(), ns),
                Api::namespaced(kube_client, ns),
            ),
            None => (Api::all(kube_client.clone()), Api::all(kube_client)),
        };

        let concurrency = config.concurrency;
        let vsphere_machine_watcher = tokio::spawn(async move {
            watch_vsphere_machines(machines, owners, reconciler, concurrency).await
        });

        Ok(Self {
            vsphere_machine_watcher,
        })
    }

    /// Runs the controller until shutdown.
    ///
    /// The watcher drains in-flight reconciliations and returns on SIGINT or SIGTERM.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("Machine IPAM Controller running");

        self.vsphere_machine_watcher
            .await
            .map_err(|e| ControllerError::Watch(format!("VSphereMachine watcher panicked: {}", e)))??;

        info!("Machine IPAM Controller stopped");
        Ok(())
    }
}
