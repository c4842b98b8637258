//! Kubernetes Events for machine address lifecycle
//!
//! Events are informational; a failure to publish one is logged and never
//! fails the reconciliation that emitted it.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Client;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use tracing::warn;

/// Name reported as the source of every event
pub const CONTROLLER_NAME: &str = "machine-ipam-controller";

/// Event reasons
pub mod reasons {
    pub const IP_ALLOCATED: &str = "IPAllocated";
    pub const IP_RELEASED: &str = "IPReleased";
    pub const ALLOCATION_FAILED: &str = "AllocationFailed";
    pub const RELEASE_FAILED: &str = "ReleaseFailed";
    pub const UNRESOLVABLE: &str = "Unresolvable";
}

/// Event actions
pub mod actions {
    pub const ALLOCATE: &str = "Allocate";
    pub const RELEASE: &str = "Release";
    pub const RESOLVE: &str = "Resolve";
}

/// Publishes Kubernetes Events about an object
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        reference: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Publishes through the events.k8s.io API
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    pub fn new(client: Client, instance: impl Into<String>) -> Self {
        let reporter = Reporter {
            controller: CONTROLLER_NAME.to_string(),
            instance: Some(instance.into()),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        reference: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };

        if let Err(e) = self.recorder.publish(&event, reference).await {
            warn!(
                "Failed to publish {} event for {}/{}: {}",
                reason,
                reference.namespace.as_deref().unwrap_or_default(),
                reference.name.as_deref().unwrap_or_default(),
                e
            );
        }
    }
}

/// Discards every event
#[cfg(test)]
pub struct NoopEventPublisher;

#[cfg(test)]
#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _reference: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}
