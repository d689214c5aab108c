//! Common backend resource utilities.
//!
//! Metadata shared by every backend resource, owner references, and the
//! conversions between typed backend resources and `DynamicObject`.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::Resource;
use kube::api::DynamicObject;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::controller::error::Error;
use crate::crd::InferenceService;

/// Metadata for a backend resource: identity, labels and annotations are
/// copied verbatim from the parent, plus a controller owner reference.
pub fn child_metadata(parent: &ObjectMeta) -> ObjectMeta {
    ObjectMeta {
        name: parent.name.clone(),
        namespace: parent.namespace.clone(),
        labels: Some(parent.labels.clone().unwrap_or_default()),
        annotations: Some(parent.annotations.clone().unwrap_or_default()),
        owner_references: Some(vec![owner_reference(parent)]),
        ..Default::default()
    }
}

/// Controller owner reference pointing at an InferenceService.
///
/// Deleting the parent makes the platform garbage collector delete the child.
pub fn owner_reference(parent: &ObjectMeta) -> OwnerReference {
    OwnerReference {
        api_version: InferenceService::api_version(&()).to_string(),
        kind: InferenceService::kind(&()).to_string(),
        name: parent.name.clone().unwrap_or_default(),
        uid: parent.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Labels of a resource, with an absent map read as empty.
pub fn labels_of(meta: &ObjectMeta) -> BTreeMap<String, String> {
    meta.labels.clone().unwrap_or_default()
}

/// Convert a typed backend resource into a `DynamicObject`.
pub fn to_dynamic<T: Serialize>(child: &T) -> Result<DynamicObject, Error> {
    Ok(serde_json::from_value(serde_json::to_value(child)?)?)
}

/// Read a typed view of a `DynamicObject`.
///
/// Fields the typed view does not model are dropped from the view only;
/// the `DynamicObject` itself is left untouched.
pub fn from_dynamic<T: DeserializeOwned>(obj: &DynamicObject) -> Result<T, Error> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}
