//! End-to-end scenarios: a service is created, becomes available, fails.

use kube::ResourceExt;
use serde_json::json;

use inference_operator::backends::BackendKind;
use inference_operator::controller::reconciler::FINALIZER;
use inference_operator::crd::{ConditionStatus, ServiceState};

use crate::fake_cluster::{Harness, spec};

fn condition_status(h: &Harness, name: &str, condition_type: &str) -> Option<ConditionStatus> {
    h.cluster
        .service(name)?
        .status?
        .conditions
        .iter()
        .find(|c| c.r#type == condition_type)
        .map(|c| c.status)
}

#[tokio::test]
async fn test_new_service_creates_backend_resource() {
    let h = Harness::new();
    h.cluster.create_service("iris", spec("kserve"));

    h.pass("iris").await.unwrap();
    assert_eq!(h.cluster.child_count(), 0);
    assert!(h.cluster.service("iris").unwrap().finalizers().contains(&FINALIZER.to_string()));

    h.pass("iris").await.unwrap();
    let child = h
        .cluster
        .child(&BackendKind::KServe.api_resource(), "iris")
        .expect("backend resource should exist");

    let predictor = &child.data["spec"]["predictor"];
    assert_eq!(predictor["timeout"], json!(60));
    assert_eq!(predictor["serviceAccountName"], json!("sa1"));
    assert_eq!(predictor["sklearn"]["storageUri"], json!("store://m1"));
    assert_eq!(predictor["sklearn"]["protocolVersion"], json!("v2"));
    assert_eq!(predictor["sklearn"]["resources"]["limits"]["memory"], json!("2Gi"));

    let owner = &child.metadata.owner_references.as_ref().unwrap()[0];
    assert_eq!(owner.kind, "InferenceService");
    assert_eq!(owner.uid, "uid-iris");
    assert_eq!(owner.controller, Some(true));

    let status = h.cluster.service("iris").unwrap().status.unwrap();
    assert_eq!(status.state, ServiceState::Creating);
    assert_eq!(status.backend.as_deref(), Some("kserve"));
    assert_eq!(condition_status(&h, "iris", "Ready"), Some(ConditionStatus::Unknown));
    assert!(h.events.all().is_empty());
}

#[tokio::test]
async fn test_backend_ready_makes_service_available() {
    let h = Harness::new();
    h.cluster.create_service("iris", spec("kserve"));
    h.settle("iris").await.unwrap();

    h.cluster.set_child_status(
        &BackendKind::KServe.api_resource(),
        "iris",
        json!({
            "url": "https://svc.example",
            "conditions": [{"type": "Ready", "status": "True"}]
        }),
    );
    h.pass("iris").await.unwrap();

    let status = h.cluster.service("iris").unwrap().status.unwrap();
    assert_eq!(status.state, ServiceState::Available);
    assert_eq!(status.url.as_deref(), Some("https://svc.example"));
    assert_eq!(condition_status(&h, "iris", "Ready"), Some(ConditionStatus::True));
    assert_eq!(condition_status(&h, "iris", "BackendReady"), Some(ConditionStatus::True));

    let available = h.events.with_reason("Available");
    assert_eq!(available.len(), 1);
    assert!(!available[0].warning);
    assert_eq!(
        available[0].note.as_deref(),
        Some("InferenceService iris is Available")
    );

    // A no-op pass emits nothing
    h.pass("iris").await.unwrap();
    assert_eq!(h.events.all().len(), 1);
}

#[tokio::test]
async fn test_backend_failure_makes_service_failed() {
    let h = Harness::new();
    let resource = BackendKind::KServe.api_resource();
    h.cluster.create_service("iris", spec("kserve"));
    h.settle("iris").await.unwrap();

    h.cluster.set_child_status(
        &resource,
        "iris",
        json!({
            "url": "https://svc.example",
            "conditions": [{"type": "Ready", "status": "True"}]
        }),
    );
    h.pass("iris").await.unwrap();
    h.events.clear();

    h.cluster.set_child_status(
        &resource,
        "iris",
        json!({
            "conditions": [{
                "type": "Ready",
                "status": "False",
                "reason": "CrashLoop",
                "message": "container exited"
            }]
        }),
    );
    h.pass("iris").await.unwrap();

    let status = h.cluster.service("iris").unwrap().status.unwrap();
    assert_eq!(status.state, ServiceState::Failed);
    assert!(status.url.is_none());
    let ready = status.conditions.iter().find(|c| c.r#type == "Ready").unwrap();
    assert_eq!(ready.status, ConditionStatus::False);
    assert_eq!(ready.reason, "CrashLoop");
    assert_eq!(ready.message, "container exited");

    let unavailable = h.events.with_reason("Unavailable");
    assert_eq!(unavailable.len(), 1);
    assert!(unavailable[0].warning);
    assert_eq!(
        unavailable[0].note.as_deref(),
        Some("InferenceService iris is no longer Available")
    );

    h.pass("iris").await.unwrap();
    assert_eq!(h.events.with_reason("Unavailable").len(), 1);
}

#[tokio::test]
async fn test_recovery_emits_available_again() {
    let h = Harness::new();
    let resource = BackendKind::KServe.api_resource();
    h.cluster.create_service("iris", spec("kserve"));
    h.settle("iris").await.unwrap();

    let ready = json!({
        "url": "https://svc.example",
        "conditions": [{"type": "Ready", "status": "True"}]
    });
    h.cluster.set_child_status(&resource, "iris", ready.clone());
    h.pass("iris").await.unwrap();
    h.cluster.set_child_status(
        &resource,
        "iris",
        json!({"conditions": [{"type": "Ready", "status": "False", "reason": "CrashLoop"}]}),
    );
    h.pass("iris").await.unwrap();
    h.cluster.set_child_status(&resource, "iris", ready);
    h.pass("iris").await.unwrap();

    assert_eq!(h.events.with_reason("Available").len(), 2);
    assert_eq!(h.events.with_reason("Unavailable").len(), 1);
}

#[tokio::test]
async fn test_seldon_service_lifecycle() {
    let h = Harness::new();
    let resource = BackendKind::Seldon.api_resource();
    h.cluster.create_service("wine", spec("seldon"));
    h.settle("wine").await.unwrap();

    let child = h.cluster.child(&resource, "wine").unwrap();
    assert_eq!(child.data["spec"]["name"], json!("wine"));
    let graph = &child.data["spec"]["predictors"][0]["graph"];
    assert_eq!(graph["modelUri"], json!("store://m1"));
    assert_eq!(graph["envSecretRefName"], json!("sa1"));
    assert_eq!(graph["implementation"], json!("SKLEARN_SERVER"));
    assert_eq!(h.cluster.service("wine").unwrap().status.unwrap().state, ServiceState::Creating);

    h.cluster.set_child_status(
        &resource,
        "wine",
        json!({
            "state": "Available",
            "address": {"url": "http://wine-default.models:8000/api/v1.0/predictions"}
        }),
    );
    h.pass("wine").await.unwrap();
    let status = h.cluster.service("wine").unwrap().status.unwrap();
    assert_eq!(status.state, ServiceState::Available);
    assert_eq!(
        status.url.as_deref(),
        Some("http://wine-default.models:8000/api/v1.0/predictions")
    );

    h.cluster.set_child_status(
        &resource,
        "wine",
        json!({"state": "Failed", "description": "image pull backoff"}),
    );
    h.pass("wine").await.unwrap();
    let status = h.cluster.service("wine").unwrap().status.unwrap();
    assert_eq!(status.state, ServiceState::Failed);
    let backend = status
        .conditions
        .iter()
        .find(|c| c.r#type == "BackendReady")
        .unwrap();
    assert_eq!(backend.reason, "DeploymentFailed");
    assert_eq!(backend.message, "image pull backoff");
}

#[tokio::test]
async fn test_backend_alias_is_accepted() {
    let h = Harness::new();
    h.cluster.create_service("iris", spec("KFServing"));
    h.settle("iris").await.unwrap();

    assert!(h.cluster.child(&BackendKind::KServe.api_resource(), "iris").is_some());
}

#[tokio::test]
async fn test_dropped_component_is_removed_from_parent() {
    let h = Harness::new();
    let resource = BackendKind::KServe.api_resource();
    h.cluster.create_service("iris", spec("kserve"));
    h.settle("iris").await.unwrap();

    h.cluster.set_child_status(
        &resource,
        "iris",
        json!({
            "url": "https://svc.example",
            "conditions": [{"type": "Ready", "status": "True"}],
            "components": {
                "predictor": {
                    "latestReadyRevision": "iris-predictor-00001",
                    "previousRolledoutRevision": "iris-predictor-00000"
                },
                "transformer": {"url": "http://iris-transformer.models"}
            }
        }),
    );
    h.pass("iris").await.unwrap();

    let rolled = json!({"predictor": {"latestReadyRevision": "iris-predictor-00002"}});
    h.cluster.set_child_status(
        &resource,
        "iris",
        json!({
            "url": "https://svc.example",
            "conditions": [{"type": "Ready", "status": "True"}],
            "components": rolled.clone()
        }),
    );
    h.pass("iris").await.unwrap();

    let components = h.cluster.service("iris").unwrap().status.unwrap().components;
    assert_eq!(serde_json::to_value(components).unwrap(), rolled);

    let writes = h.cluster.calls().status_writes;
    h.pass("iris").await.unwrap();
    assert_eq!(h.cluster.calls().status_writes, writes);
}

#[tokio::test]
async fn test_dropped_seldon_deployment_status_is_removed() {
    let h = Harness::new();
    let resource = BackendKind::Seldon.api_resource();
    h.cluster.create_service("wine", spec("seldon"));
    h.settle("wine").await.unwrap();

    h.cluster.set_child_status(
        &resource,
        "wine",
        json!({
            "state": "Available",
            "address": {"url": "http://wine-default.models:8000/api/v1.0/predictions"},
            "deploymentStatus": {
                "wine-default-0": {"replicas": 1, "availableReplicas": 1},
                "wine-canary-0": {"replicas": 1}
            }
        }),
    );
    h.pass("wine").await.unwrap();

    h.cluster.set_child_status(
        &resource,
        "wine",
        json!({
            "state": "Available",
            "address": {"url": "http://wine-default.models:8000/api/v1.0/predictions"},
            "deploymentStatus": {"wine-default-0": {"replicas": 2}}
        }),
    );
    h.pass("wine").await.unwrap();

    let components = h.cluster.service("wine").unwrap().status.unwrap().components;
    assert_eq!(
        serde_json::to_value(components).unwrap(),
        json!({"wine-default-0": {"replicas": 2}})
    );

    let writes = h.cluster.calls().status_writes;
    h.pass("wine").await.unwrap();
    assert_eq!(h.cluster.calls().status_writes, writes);
}

#[tokio::test]
async fn test_lagging_cache_keeps_transition_times() {
    let h = Harness::new();
    let resource = BackendKind::KServe.api_resource();
    h.cluster.create_service("iris", spec("kserve"));
    h.settle("iris").await.unwrap();

    // Cached before the service turned Available
    let cached = h.cluster.service("iris").unwrap();

    h.cluster.set_child_status(
        &resource,
        "iris",
        json!({
            "url": "https://svc.example",
            "conditions": [{"type": "Ready", "status": "True"}]
        }),
    );
    h.pass("iris").await.unwrap();
    let written = h.cluster.service("iris").unwrap().status.unwrap();
    let writes = h.cluster.calls().status_writes;

    h.pass_cached(cached).await.unwrap();

    assert_eq!(h.cluster.calls().status_writes, writes);
    assert_eq!(h.cluster.service("iris").unwrap().status.unwrap(), written);
    assert_eq!(h.events.with_reason("Available").len(), 1);
}
