//! inference-operator library crate
//!
//! This module exports the controller, the InferenceService CRD, the backend
//! adapters and the cluster client seam.

pub mod backends;
pub mod client;
pub mod config;
pub mod controller;
pub mod crd;
pub mod health;

pub use config::OperatorConfig;
pub use health::HealthState;

use std::sync::Arc;

use futures::{Stream, StreamExt};
use kube::api::{ApiResource, DynamicObject};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::controller::Error as ControllerError;
use kube::runtime::{Controller, WatchStreamExt, predicates, reflector, watcher};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use client::KubeServingClient;
use controller::context::{Context, FIELD_MANAGER};
use controller::events::KubeEventPublisher;
use controller::reconciler::{error_policy, reconcile};
use crd::InferenceService;

/// Create namespaced or cluster-wide API based on scope
pub fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

fn default_watcher_config() -> WatcherConfig {
    WatcherConfig::default().any_semantic()
}

/// Reflector-backed stream of InferenceServices.
///
/// Only spec changes pass the generation predicate; status writes made by
/// this controller do not retrigger it. Backend resource changes arrive
/// through `owns_with` instead.
fn service_stream<K>(
    api: Api<K>,
    watcher_config: WatcherConfig,
) -> (
    reflector::Store<K>,
    impl Stream<Item = Result<K, watcher::Error>>,
)
where
    K: Resource + Clone + DeserializeOwned + std::fmt::Debug + Send + 'static,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone,
{
    let (reader, writer) = reflector::store();
    let stream = reflector(writer, watcher(api, watcher_config))
        .default_backoff()
        .applied_objects()
        .predicate_filter(predicates::generation);
    (reader, stream)
}

/// Create namespaced or cluster-wide API for a dynamically typed resource
pub fn scoped_dynamic_api(
    client: Client,
    namespace: Option<&str>,
    resource: &ApiResource,
) -> Api<DynamicObject> {
    match namespace {
        Some(ns) => Api::namespaced_with(client, ns, resource),
        None => Api::all_with(client, resource),
    }
}

/// Run the operator controller.
///
/// Watches InferenceService resources, plus the backend resources of every
/// enabled backend so that a change to a backend resource (typically its
/// status) triggers a pass for the owning InferenceService. Scoped to
/// `config.watch_namespace` when set, cluster-wide otherwise.
///
/// If health_state is provided, metrics will be recorded for reconciliations.
pub async fn run_controller(
    client: Client,
    config: OperatorConfig,
    health_state: Option<Arc<HealthState>>,
) {
    let namespace = config.watch_namespace.as_deref();
    info!(
        scope = namespace.unwrap_or("cluster-wide"),
        backends = ?config.enabled_backends,
        "Starting controller for InferenceService resources"
    );

    if let Some(ref state) = health_state {
        state.set_ready(true);
    }

    let ctx = Arc::new(
        Context::new(
            Arc::new(KubeServingClient::new(client.clone())),
            Arc::new(KubeEventPublisher::new(
                client.clone(),
                FIELD_MANAGER,
                config.pod_name.clone(),
            )),
            health_state,
        )
        .with_backends(config.enabled_backends.clone()),
    );

    let services: Api<InferenceService> = scoped_api(client.clone(), namespace);
    let watcher_config = default_watcher_config();
    let (reader, stream) = service_stream(services, watcher_config.clone());

    // Backend resources are watched in full: their status drives the parent's
    let mut controller = Controller::for_stream(stream, reader);
    for kind in &config.enabled_backends {
        let resource = kind.api_resource();
        let api = scoped_dynamic_api(client.clone(), namespace, &resource);
        controller = controller.owns_with(api, resource, watcher_config.clone());
    }

    controller
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _)) => debug!(name = %obj.name, "Reconciled"),
                // Watch events for an object deleted meanwhile surface as not found
                Err(ControllerError::ObjectNotFound(obj)) => {
                    debug!(object = %obj, "Object no longer exists");
                }
                Err(ControllerError::ReconcilerFailed(e, obj)) if e.is_not_found() => {
                    debug!(name = %obj.name, error = %e, "Object no longer exists");
                }
                Err(e) => error!(error = %e, "Reconciliation error"),
            }
        })
        .await;

    info!("Controller stream ended");
}
