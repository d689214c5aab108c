//! Single-model server backend (KServe).
//!
//! Materialises a `serving.kserve.io/v1beta1` InferenceService with an
//! sklearn predictor. The operator owns `spec.predictor` and the labels;
//! the rest of the resource, status included, belongs to KServe.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

use crate::crd::InferenceServiceSpec;

use super::common::{child_metadata, labels_of};
use super::{BackendAdapter, BackendKind, BackendStatus, ChildResource};

/// Request timeout of the predictor, in seconds.
pub const TIMEOUT_SECONDS: i64 = 60;

/// Inference protocol version served by the predictor.
pub const PROTOCOL_VERSION: &str = "v2";

/// Version of the sklearn model server runtime.
pub const RUNTIME_VERSION: &str = "0.2.1";

/// Name of the model server container.
pub const CONTAINER_NAME: &str = "kserve-container";

// Quantities are written in canonical form so that a server-side round trip
// leaves them unchanged.
const CPU_LIMIT: &str = "1";
const MEMORY_LIMIT: &str = "2Gi";
const CPU_REQUEST: &str = "100m";
const MEMORY_REQUEST: &str = "128Mi";

// ============================================================================
// KServe InferenceService types
// ============================================================================

/// KServe InferenceService resource.
///
/// Simplified representation covering the fields this operator writes and
/// the status it reads.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KServeInferenceService {
    /// API version (`serving.kserve.io/v1beta1`).
    #[serde(default)]
    pub api_version: String,

    /// Kind is always "InferenceService".
    #[serde(default)]
    pub kind: String,

    /// Standard object metadata.
    #[serde(default)]
    pub metadata: ObjectMeta,

    /// Service specification.
    #[serde(default)]
    pub spec: KServeSpec,

    /// Status written by the KServe controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<KServeStatus>,
}

/// Specification of a KServe InferenceService.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KServeSpec {
    /// Predictor component.
    #[serde(default)]
    pub predictor: PredictorSpec,
}

/// Predictor component of a KServe InferenceService.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PredictorSpec {
    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,

    /// Service account of the predictor pods.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_account_name: String,

    /// sklearn model server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sklearn: Option<ModelServerSpec>,
}

/// Framework model server settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelServerSpec {
    /// Location of the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_uri: Option<String>,

    /// Inference protocol version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,

    /// Model server runtime version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_version: Option<String>,

    /// Container name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Container resource requirements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

/// Container resource requests and limits.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub limits: BTreeMap<String, String>,
    #[serde(default)]
    pub requests: BTreeMap<String, String>,
}

/// Status of a KServe InferenceService.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KServeStatus {
    /// Externally reachable URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Cluster-internal address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Addressable>,

    /// Conditions reported by KServe.
    #[serde(default)]
    pub conditions: Vec<ChildCondition>,

    /// Per-component status (predictor, transformer, explainer).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<BTreeMap<String, serde_json::Value>>,
}

impl KServeStatus {
    /// The primary readiness condition: the `Ready` condition, or the first
    /// reported condition when no `Ready` condition exists.
    pub fn readiness(&self) -> Option<&ChildCondition> {
        self.conditions
            .iter()
            .find(|c| c.r#type == "Ready")
            .or_else(|| self.conditions.first())
    }

    /// URL the service answers on: the external URL, falling back to the
    /// cluster-internal address.
    pub fn serving_url(&self) -> Option<&str> {
        self.url
            .as_deref()
            .or_else(|| self.address.as_ref().and_then(|a| a.url.as_deref()))
    }
}

/// Address of a service.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Addressable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A condition as reported by a backend controller.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ChildCondition {
    pub r#type: String,
    /// "True", "False" or "Unknown".
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ChildResource for KServeInferenceService {
    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}

// ============================================================================
// Adapter
// ============================================================================

/// Adapter for the single-model server backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct KServeAdapter;

impl BackendAdapter for KServeAdapter {
    type Child = KServeInferenceService;

    fn kind(&self) -> BackendKind {
        BackendKind::KServe
    }

    fn owned_spec_field(&self) -> &'static str {
        "predictor"
    }

    fn build_desired(&self, meta: &ObjectMeta, spec: &InferenceServiceSpec) -> Self::Child {
        let gvk = self.kind().gvk();
        KServeInferenceService {
            api_version: format!("{}/{}", gvk.group, gvk.version),
            kind: gvk.kind,
            metadata: child_metadata(meta),
            spec: KServeSpec {
                predictor: PredictorSpec {
                    timeout: Some(TIMEOUT_SECONDS),
                    service_account_name: spec.service_account_name.clone(),
                    sklearn: Some(ModelServerSpec {
                        storage_uri: Some(spec.model_uri.clone()),
                        protocol_version: Some(PROTOCOL_VERSION.to_string()),
                        runtime_version: Some(RUNTIME_VERSION.to_string()),
                        name: CONTAINER_NAME.to_string(),
                        resources: Some(ResourceRequirements {
                            limits: BTreeMap::from([
                                ("cpu".to_string(), CPU_LIMIT.to_string()),
                                ("memory".to_string(), MEMORY_LIMIT.to_string()),
                            ]),
                            requests: BTreeMap::from([
                                ("cpu".to_string(), CPU_REQUEST.to_string()),
                                ("memory".to_string(), MEMORY_REQUEST.to_string()),
                            ]),
                        }),
                    }),
                },
            },
            status: None,
        }
    }

    fn diff(&self, desired: &Self::Child, observed: &Self::Child) -> bool {
        desired.spec.predictor != observed.spec.predictor
            || labels_of(&desired.metadata) != labels_of(&observed.metadata)
    }

    fn status(&self, child: &Self::Child) -> BackendStatus {
        BackendStatus::KServe(child.status.clone().unwrap_or_default())
    }
}
