//! Controller-specific error types.
//!
//! This module defines error types specific to the Machine IPAM Controller
//! that are not covered by upstream library errors.

use infoblox_client::IpamError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the Machine IPAM Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// IPAM service error (allocation or release failed)
    #[error("IPAM error: {0}")]
    Ipam(#[from] IpamError),

    /// Optimistic concurrency failure on update
    #[error("Update conflict: {0}")]
    Conflict(String),

    /// Network annotations cannot be resolved where they are required
    #[error("Unresolvable network configuration: {0}")]
    Unresolvable(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource is missing a field the controller relies on
    #[error("Missing field: {0}")]
    MissingField(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Whether the error is a resource version conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ControllerError::Conflict(_))
    }
}
