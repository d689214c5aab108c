//! Backend resource convergence through full reconcile passes.

use serde_json::json;

use inference_operator::backends::BackendKind;
use inference_operator::controller::convergence::MAX_UPDATE_ATTEMPTS;
use inference_operator::controller::error::{Error, Stage};
use inference_operator::controller::events::reasons;

use crate::fake_cluster::{Harness, spec};

#[tokio::test]
async fn test_repeated_passes_do_not_update() {
    let h = Harness::new();
    h.cluster.create_service("iris", spec("kserve"));
    h.settle("iris").await.unwrap();

    for _ in 0..3 {
        h.pass("iris").await.unwrap();
    }

    let calls = h.cluster.calls();
    assert_eq!(calls.child_creates, 1);
    assert_eq!(calls.child_updates, 0);
    assert_eq!(calls.status_writes, 1);
    assert_eq!(calls.finalizer_writes, 1);
}

#[tokio::test]
async fn test_backend_defaulted_fields_do_not_trigger_update() {
    let h = Harness::new();
    let resource = BackendKind::KServe.api_resource();
    h.cluster.create_service("iris", spec("kserve"));
    h.settle("iris").await.unwrap();

    h.cluster.edit_child(&resource, "iris", |child| {
        child.data["spec"]["predictor"]["minReplicas"] = json!(1);
        child.data["spec"]["transformer"] = json!({"containers": []});
        child
            .metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert("serving.kserve.io/deploymentMode".to_string(), "Serverless".to_string());
    });
    h.pass("iris").await.unwrap();

    assert_eq!(h.cluster.calls().child_updates, 0);
    let child = h.cluster.child(&resource, "iris").unwrap();
    assert_eq!(child.data["spec"]["predictor"]["minReplicas"], json!(1));
}

#[tokio::test]
async fn test_spec_edit_updates_owned_fields_only() {
    let h = Harness::new();
    let resource = BackendKind::KServe.api_resource();
    h.cluster.create_service("iris", spec("kserve"));
    h.settle("iris").await.unwrap();

    let child_status = json!({
        "url": "https://svc.example",
        "conditions": [{"type": "Ready", "status": "True"}],
        "components": {"predictor": {"latestReadyRevision": "iris-predictor-00001"}}
    });
    h.cluster.set_child_status(&resource, "iris", child_status.clone());
    h.cluster.edit_child(&resource, "iris", |child| {
        child.data["spec"]["transformer"] = json!({"containers": []});
    });
    h.pass("iris").await.unwrap();

    h.cluster
        .edit_spec("iris", |spec| spec.model_uri = "store://m2".to_string());
    h.pass("iris").await.unwrap();

    assert_eq!(h.cluster.calls().child_updates, 1);
    let child = h.cluster.child(&resource, "iris").unwrap();
    assert_eq!(
        child.data["spec"]["predictor"]["sklearn"]["storageUri"],
        json!("store://m2")
    );
    assert_eq!(child.data["spec"]["transformer"], json!({"containers": []}));
    assert_eq!(child.data["status"], child_status);

    let status = h.cluster.service("iris").unwrap().status.unwrap();
    assert_eq!(status.observed_generation, Some(2));
}

#[tokio::test]
async fn test_persistent_conflicts_fail_the_pass() {
    let h = Harness::new();
    let resource = BackendKind::KServe.api_resource();
    h.cluster.create_service("iris", spec("kserve"));
    h.settle("iris").await.unwrap();
    let writes_before = h.cluster.calls().status_writes;
    let status_before = h.cluster.service("iris").unwrap().status;

    h.cluster
        .edit_spec("iris", |spec| spec.model_uri = "store://m2".to_string());
    h.cluster.inject_child_conflicts(MAX_UPDATE_ATTEMPTS);
    let err = h.pass("iris").await.unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Converge));
    assert!(matches!(err.root(), Error::ConvergenceFailed { name, .. } if name == "iris"));
    assert!(err.is_retryable());

    let calls = h.cluster.calls();
    assert_eq!(calls.child_updates, 0);
    assert_eq!(calls.status_writes, writes_before);
    assert_eq!(h.cluster.service("iris").unwrap().status, status_before);

    let child = h.cluster.child(&resource, "iris").unwrap();
    assert_eq!(
        child.data["spec"]["predictor"]["sklearn"]["storageUri"],
        json!("store://m1")
    );

    assert_eq!(h.events.with_reason(reasons::CONVERGENCE_FAILED).len(), 1);
    assert_eq!(h.events.with_reason(reasons::INTERNAL_ERROR).len(), 1);
}

#[tokio::test]
async fn test_transient_conflicts_are_retried() {
    let h = Harness::new();
    let resource = BackendKind::KServe.api_resource();
    h.cluster.create_service("iris", spec("kserve"));
    h.settle("iris").await.unwrap();

    h.cluster
        .edit_spec("iris", |spec| spec.model_uri = "store://m2".to_string());
    h.cluster.inject_child_conflicts(2);
    h.pass("iris").await.unwrap();

    assert_eq!(h.cluster.calls().child_updates, 1);
    let child = h.cluster.child(&resource, "iris").unwrap();
    assert_eq!(
        child.data["spec"]["predictor"]["sklearn"]["storageUri"],
        json!("store://m2")
    );
    assert!(h.events.all().is_empty());
}

#[tokio::test]
async fn test_status_conflict_is_left_for_next_pass() {
    let h = Harness::new();
    h.cluster.create_service("iris", spec("kserve"));
    h.pass("iris").await.unwrap();

    h.cluster.inject_status_conflicts(1);
    h.pass("iris").await.unwrap();
    assert_eq!(h.cluster.calls().status_writes, 0);
    assert!(h.cluster.service("iris").unwrap().status.is_none());

    h.pass("iris").await.unwrap();
    assert_eq!(h.cluster.calls().status_writes, 1);
    assert!(h.cluster.service("iris").unwrap().status.is_some());
    assert!(h.events.all().is_empty());
}

#[tokio::test]
async fn test_seldon_spec_edit_updates_predictors() {
    let h = Harness::new();
    let resource = BackendKind::Seldon.api_resource();
    h.cluster.create_service("wine", spec("seldon"));
    h.settle("wine").await.unwrap();

    h.cluster
        .edit_spec("wine", |spec| spec.service_account_name = "sa2".to_string());
    h.pass("wine").await.unwrap();

    assert_eq!(h.cluster.calls().child_updates, 1);
    let child = h.cluster.child(&resource, "wine").unwrap();
    assert_eq!(
        child.data["spec"]["predictors"][0]["graph"]["envSecretRefName"],
        json!("sa2")
    );
}
