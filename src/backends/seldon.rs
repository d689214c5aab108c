//! Graph/predictor backend (Seldon Core).
//!
//! Materialises a `machinelearning.seldon.io/v1` SeldonDeployment with a
//! single predictor running the prepackaged sklearn server. The operator
//! owns `spec.predictors` and the labels.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

use crate::crd::InferenceServiceSpec;

use super::common::{child_metadata, labels_of};
use super::{BackendAdapter, BackendKind, BackendStatus, ChildResource};

/// Replicas of the predictor.
pub const REPLICAS: i32 = 1;

/// Name of the model node in the inference graph.
pub const GRAPH_NODE_NAME: &str = "classifier";

/// Prepackaged server implementing the graph node.
pub const IMPLEMENTATION: &str = "SKLEARN_SERVER";

/// Prediction method invoked on the model.
pub const PREDICT_METHOD: &str = "predict";

/// SeldonDeployment resource.
///
/// Simplified representation covering the fields this operator writes and
/// the status it reads.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeldonDeployment {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: SeldonDeploymentSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SeldonStatus>,
}

/// Specification of a SeldonDeployment.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeldonDeploymentSpec {
    /// Deployment name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Predictors serving traffic.
    #[serde(default)]
    pub predictors: Vec<PredictorSpec>,
}

/// A named predictor of a SeldonDeployment.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PredictorSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default)]
    pub graph: PredictiveUnit,
}

/// A node of the inference graph.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PredictiveUnit {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation: Option<String>,
    #[serde(default, rename = "modelUri", skip_serializing_if = "String::is_empty")]
    pub model_uri: String,
    /// Secret holding the credentials used to fetch the model.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub env_secret_ref_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
}

/// A typed parameter passed to a graph node.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub r#type: String,
    pub value: String,
}

/// Status of a SeldonDeployment.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeldonStatus {
    /// "Creating", "Available" or "Failed".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Service address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<SeldonAddress>,

    /// Per-deployment status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_status: Option<BTreeMap<String, serde_json::Value>>,
}

/// Address of a SeldonDeployment.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SeldonAddress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ChildResource for SeldonDeployment {
    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}

/// Adapter for the graph/predictor backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct SeldonAdapter;

impl BackendAdapter for SeldonAdapter {
    type Child = SeldonDeployment;

    fn kind(&self) -> BackendKind {
        BackendKind::Seldon
    }

    fn owned_spec_field(&self) -> &'static str {
        "predictors"
    }

    fn build_desired(&self, meta: &ObjectMeta, spec: &InferenceServiceSpec) -> Self::Child {
        let gvk = self.kind().gvk();
        let name = meta.name.clone().unwrap_or_default();
        SeldonDeployment {
            api_version: format!("{}/{}", gvk.group, gvk.version),
            kind: gvk.kind,
            metadata: child_metadata(meta),
            spec: SeldonDeploymentSpec {
                name: name.clone(),
                predictors: vec![PredictorSpec {
                    name,
                    replicas: Some(REPLICAS),
                    graph: PredictiveUnit {
                        name: GRAPH_NODE_NAME.to_string(),
                        implementation: Some(IMPLEMENTATION.to_string()),
                        model_uri: spec.model_uri.clone(),
                        env_secret_ref_name: spec.service_account_name.clone(),
                        parameters: vec![Parameter {
                            name: "method".to_string(),
                            r#type: "STRING".to_string(),
                            value: PREDICT_METHOD.to_string(),
                        }],
                    },
                }],
            },
            status: None,
        }
    }

    fn diff(&self, desired: &Self::Child, observed: &Self::Child) -> bool {
        desired.spec.predictors != observed.spec.predictors
            || labels_of(&desired.metadata) != labels_of(&observed.metadata)
    }

    fn status(&self, child: &Self::Child) -> BackendStatus {
        BackendStatus::Seldon(child.status.clone().unwrap_or_default())
    }
}
