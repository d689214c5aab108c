//! Backend adapters.
//!
//! A backend adapter knows one serving backend's resource shape: how to
//! synthesise the desired backend resource from an InferenceService, which
//! part of that resource the operator owns, and how to read its status.
//!
//! | Backend | Child resource | Owned sub-tree |
//! |---------|----------------|----------------|
//! | `kserve` | `serving.kserve.io/v1beta1` InferenceService | `spec.predictor` |
//! | `seldon` | `machinelearning.seldon.io/v1` SeldonDeployment | `spec.predictors` |
//!
//! Adapter defaults (timeouts, quotas, protocol and runtime versions) are
//! constants of each adapter and are not configurable per resource.

pub mod common;
pub mod kserve;
pub mod seldon;

use std::fmt::Debug;
use std::str::FromStr;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{ApiResource, GroupVersionKind};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::controller::error::Error;
use crate::crd::InferenceServiceSpec;

pub use kserve::KServeAdapter;
pub use seldon::SeldonAdapter;

/// The closed set of serving backends.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BackendKind {
    /// Single-model server (KServe, formerly KFServing).
    KServe,
    /// Inference graph with named predictors (Seldon Core).
    Seldon,
}

impl BackendKind {
    /// Every supported backend.
    pub const ALL: [BackendKind; 2] = [BackendKind::KServe, BackendKind::Seldon];

    /// Canonical name of the backend as written in `spec.backend`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            BackendKind::KServe => "kserve",
            BackendKind::Seldon => "seldon",
        }
    }

    /// Group/version/kind of the backend resource.
    pub fn gvk(&self) -> GroupVersionKind {
        match self {
            BackendKind::KServe => {
                GroupVersionKind::gvk("serving.kserve.io", "v1beta1", "InferenceService")
            }
            BackendKind::Seldon => {
                GroupVersionKind::gvk("machinelearning.seldon.io", "v1", "SeldonDeployment")
            }
        }
    }

    /// API resource used to address the backend resource dynamically.
    pub fn api_resource(&self) -> ApiResource {
        let gvk = self.gvk();
        let plural = match self {
            BackendKind::KServe => "inferenceservices",
            BackendKind::Seldon => "seldondeployments",
        };
        ApiResource::from_gvk_with_plural(&gvk, plural)
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kserve" | "kfserving" => Ok(BackendKind::KServe),
            "seldon" => Ok(BackendKind::Seldon),
            _ => Err(Error::UnsupportedBackend(s.to_string())),
        }
    }
}

/// Status reported by a backend resource, in the backend's own shape.
#[derive(Clone, Debug, PartialEq)]
pub enum BackendStatus {
    KServe(kserve::KServeStatus),
    Seldon(seldon::SeldonStatus),
}

/// A materialised backend resource.
pub trait ChildResource: Serialize + DeserializeOwned + Clone + Debug + Send + Sync {
    /// Object metadata of the resource.
    fn metadata(&self) -> &ObjectMeta;
}

/// Knows one backend's resource shape and defaults.
pub trait BackendAdapter: Send + Sync {
    /// Typed view of the backend resource.
    type Child: ChildResource;

    /// Backend this adapter drives.
    fn kind(&self) -> BackendKind;

    /// Key under `spec` that this adapter owns. Everything else in the
    /// backend resource belongs to the backend's own controller.
    fn owned_spec_field(&self) -> &'static str;

    /// Build the desired backend resource. Pure: identical inputs produce
    /// an identical resource.
    fn build_desired(&self, meta: &ObjectMeta, spec: &InferenceServiceSpec) -> Self::Child;

    /// Whether the adapter-owned fields (owned spec sub-tree and labels)
    /// of `observed` differ from `desired`.
    fn diff(&self, desired: &Self::Child, observed: &Self::Child) -> bool;

    /// Status reported by the backend resource.
    fn status(&self, child: &Self::Child) -> BackendStatus;

    /// API resource used to address the backend resource dynamically.
    fn api_resource(&self) -> ApiResource {
        self.kind().api_resource()
    }
}
