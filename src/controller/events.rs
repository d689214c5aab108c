//! Kubernetes Event recording.
//!
//! Events are fire-and-forget: a failed publish is logged and never fails
//! a reconcile pass.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Client;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use tracing::warn;

/// Publishes Kubernetes Events about an InferenceService.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event on `resource_ref`.
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Publisher backed by `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as `controller`, optionally tagged with
    /// the pod instance.
    pub fn new(client: Client, controller: &str, instance: Option<String>) -> Self {
        let reporter = Reporter {
            controller: controller.to_string(),
            instance,
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
        resource_ref: &ObjectReference,
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
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "Failed to publish event");
        }
    }
}

/// Publisher that drops every event.
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Event reasons, shown in the REASON column of `kubectl get events`.
pub mod reasons {
    /// The service became Available
    pub const AVAILABLE: &str = "Available";
    /// The service stopped being Available
    pub const UNAVAILABLE: &str = "Unavailable";
    /// The backend resource could not be converged
    pub const CONVERGENCE_FAILED: &str = "ConvergenceFailed";
    /// `spec.backend` names no supported backend
    pub const UNSUPPORTED_BACKEND: &str = "UnsupportedBackend";
    /// The status write failed
    pub const UPDATE_FAILED: &str = "UpdateFailed";
    /// A reconcile pass failed
    pub const INTERNAL_ERROR: &str = "InternalError";
}

/// Event actions, shown in the ACTION column of `kubectl get events`.
pub mod actions {
    pub const RECONCILE: &str = "Reconcile";
    pub const CONVERGE: &str = "Converge";
    pub const UPDATE_STATUS: &str = "UpdateStatus";
}
