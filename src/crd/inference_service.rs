//! InferenceService Custom Resource Definition.
//!
//! The parent resource users author: a backend choice plus the location of
//! a trained model. The operator materialises exactly one backend-specific
//! child resource per InferenceService and folds its status back here.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// InferenceService is the backend-agnostic model serving resource.
///
/// Example:
/// ```yaml
/// apiVersion: serving.inference-operator.io/v1alpha1
/// kind: InferenceService
/// metadata:
///   name: iris
/// spec:
///   backend: kserve
///   modelUri: s3://models/iris
///   serviceAccountName: models-reader
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "serving.inference-operator.io",
    version = "v1alpha1",
    kind = "InferenceService",
    plural = "inferenceservices",
    shortname = "infsvc",
    status = "InferenceServiceStatus",
    namespaced,
    printcolumn = r#"{"name":"Backend", "type":"string", "jsonPath":".spec.backend"}"#,
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"URL", "type":"string", "jsonPath":".status.url"}"#,
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type=='Ready')].status"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct InferenceServiceSpec {
    /// Serving backend for the model (`kserve` or `seldon`).
    ///
    /// Kept as a plain string so an unknown value still reaches the
    /// controller and is reported through status.
    pub backend: String,

    /// URI where the trained model is stored (e.g. an s3 URI).
    pub model_uri: String,

    /// Service account used to run the inference service.
    #[serde(default)]
    pub service_account_name: String,
}

/// Observed state of an InferenceService.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InferenceServiceStatus {
    /// Coarse serving state.
    #[serde(default)]
    pub state: ServiceState,

    /// URL the model is reachable at, once available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Backend kind the service was reconciled with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,

    /// The generation most recently observed by the controller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Conditions ordered by type.
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Component-level status copied verbatim from the backend resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub components: Option<BTreeMap<String, serde_json::Value>>,
}

/// ServiceState is the three-valued serving state of an InferenceService.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ServiceState {
    /// The backend resource exists but is not serving yet.
    #[default]
    Creating,
    /// The model is being served.
    Available,
    /// The backend reported a failure, or the backend is unsupported.
    Failed,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceState::Creating => write!(f, "Creating"),
            ServiceState::Available => write!(f, "Available"),
            ServiceState::Failed => write!(f, "Failed"),
        }
    }
}

/// Status of a condition.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionStatus::True => write!(f, "True"),
            ConditionStatus::False => write!(f, "False"),
            ConditionStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Condition describes one aspect of the service's health.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition.
    pub r#type: String,
    /// Status of the condition.
    pub status: ConditionStatus,
    /// Machine-readable reason for the condition's last transition.
    #[serde(default)]
    pub reason: String,
    /// Human-readable message indicating details about last transition.
    #[serde(default)]
    pub message: String,
    /// Last time the condition transitioned from one status to another.
    #[serde(default)]
    pub last_transition_time: String,
}

impl Condition {
    /// Create a new condition stamped with the given transition time.
    pub fn new(
        condition_type: &str,
        status: ConditionStatus,
        reason: &str,
        message: &str,
        transition_time: &str,
    ) -> Self {
        Self {
            r#type: condition_type.to_string(),
            status,
            reason: reason.to_string(),
            message: message.to_string(),
            last_transition_time: transition_time.to_string(),
        }
    }

    /// Whether the condition status is `True`.
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Types of conditions for InferenceService.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize, JsonSchema)]
pub enum ConditionType {
    /// Aggregate readiness derived from every dependent condition.
    Ready,
    /// The backend resource reports that it is serving.
    BackendReady,
}

impl ConditionType {
    /// Wire name of the condition type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConditionType::Ready => "Ready",
            ConditionType::BackendReady => "BackendReady",
        }
    }
}

impl std::fmt::Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema for opaque maps copied from another controller's status.
fn preserve_unknown_fields(_: &mut schemars::r#gen::SchemaGenerator) -> schemars::schema::Schema {
    let mut schema = schemars::schema::SchemaObject {
        instance_type: Some(schemars::schema::InstanceType::Object.into()),
        ..Default::default()
    };
    schema.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".to_string(),
        serde_json::Value::Bool(true),
    );
    schemars::schema::Schema::Object(schema)
}
