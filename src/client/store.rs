//! The `ServingClient` trait.
//!
//! Resources are addressed by `(kind, namespace, name)`. Reads of absent
//! objects return `Ok(None)`. Writes carry the resourceVersion of the object
//! they were derived from, and a stale version surfaces as a 409 conflict
//! (`Error::is_conflict`).

use async_trait::async_trait;
use kube::api::{ApiResource, DynamicObject};

#[cfg(test)]
use mockall::automock;

use crate::controller::error::Error;
use crate::crd::InferenceService;

/// Trait abstracting the Kubernetes operations of the serving controller
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ServingClient: Send + Sync {
    /// Get an InferenceService by namespace and name
    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<InferenceService>, Error>;

    /// Overwrite the finalizer list of an InferenceService.
    ///
    /// When `resource_version` is set the write fails with a conflict if the
    /// object changed since it was read.
    async fn set_finalizers(
        &self,
        namespace: &str,
        name: &str,
        finalizers: Vec<String>,
        resource_version: Option<String>,
    ) -> Result<(), Error>;

    /// Replace the status sub-document of an InferenceService.
    ///
    /// The stored status becomes exactly `service.status`; nothing of the
    /// previous status survives. Uses the resourceVersion carried in
    /// `service.metadata`.
    async fn replace_service_status(&self, service: &InferenceService) -> Result<(), Error>;

    /// Get a backend resource
    async fn get_child(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error>;

    /// Create a backend resource, returning the stored object
    async fn create_child(
        &self,
        resource: &ApiResource,
        namespace: &str,
        child: &DynamicObject,
    ) -> Result<DynamicObject, Error>;

    /// Replace a backend resource, returning the stored object.
    ///
    /// Uses the resourceVersion carried in `child.metadata`.
    async fn replace_child(
        &self,
        resource: &ApiResource,
        namespace: &str,
        child: &DynamicObject,
    ) -> Result<DynamicObject, Error>;
}
