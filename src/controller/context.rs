//! Shared context for the controller.
//!
//! The Context struct holds shared state that is passed to the reconciler,
//! including the cluster client and event publisher.

use std::sync::Arc;

use kube::Resource;
use kube::runtime::events::EventType;

use crate::backends::BackendKind;
use crate::client::ServingClient;
use crate::controller::events::EventPublisher;
use crate::crd::InferenceService;
use crate::health::HealthState;

/// Field manager name for the operator
pub const FIELD_MANAGER: &str = "inference-operator";

/// Shared context for the controller
#[derive(Clone)]
pub struct Context {
    /// Cluster reads and writes
    pub client: Arc<dyn ServingClient>,
    /// Kubernetes event sink
    pub events: Arc<dyn EventPublisher>,
    /// Optional health state for metrics and readiness
    pub health_state: Option<Arc<HealthState>>,
    /// Backends this instance reconciles; others are reported as unsupported
    pub backends: Vec<BackendKind>,
}

impl Context {
    /// Create a new context
    pub fn new(
        client: Arc<dyn ServingClient>,
        events: Arc<dyn EventPublisher>,
        health_state: Option<Arc<HealthState>>,
    ) -> Self {
        Self {
            client,
            events,
            health_state,
            backends: BackendKind::ALL.to_vec(),
        }
    }

    /// Restrict the backends this instance reconciles
    pub fn with_backends(mut self, backends: Vec<BackendKind>) -> Self {
        self.backends = backends;
        self
    }

    /// Publish a normal event for a service
    pub async fn publish_normal_event(
        &self,
        service: &InferenceService,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        self.events
            .publish(&service.object_ref(&()), EventType::Normal, reason, action, note)
            .await;
    }

    /// Publish a warning event for a service
    pub async fn publish_warning_event(
        &self,
        service: &InferenceService,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        self.events
            .publish(&service.object_ref(&()), EventType::Warning, reason, action, note)
            .await;
    }
}
