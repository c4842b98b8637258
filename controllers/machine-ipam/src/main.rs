//! Machine IPAM Controller
//!
//! Allocates addresses from Infoblox for Cluster API VSphereMachines:
//! - on creation, the first static device on the annotated network gets an
//!   address and the machine gets a finalizer
//! - on deletion, the address is released and the finalizer removed
//!
//! Network name, Infoblox network view and subnet come from annotations on
//! the VSphereMachine or, failing that, on its owning Machine.

mod backoff;
mod config;
mod controller;
mod error;
mod events;
mod reconciler;
mod store;
mod watcher;

#[cfg(test)]
mod test_utils;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A rustls crypto provider was already installed");
    }

    info!("Starting Machine IPAM Controller");

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  Infoblox URL: {}", config.infoblox.base_url);
    info!("  Infoblox WAPI version: {}", config.infoblox.wapi_version);
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Concurrency: {}", config.concurrency);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
