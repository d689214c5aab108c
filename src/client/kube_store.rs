//! `ServingClient` implementation over the Kubernetes API.

use async_trait::async_trait;
use kube::api::{Api, ApiResource, DynamicObject, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

use crate::controller::context::FIELD_MANAGER;
use crate::controller::error::Error;
use crate::crd::InferenceService;

use super::store::ServingClient;

/// Real Kubernetes client implementation
#[derive(Clone)]
pub struct KubeServingClient {
    client: Client,
}

impl KubeServingClient {
    /// Create a new client wrapping the given kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn services(&self, namespace: &str) -> Api<InferenceService> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn children(&self, resource: &ApiResource, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, resource)
    }
}

#[async_trait]
impl ServingClient for KubeServingClient {
    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<InferenceService>, Error> {
        match self.services(namespace).get(name).await {
            Ok(svc) => Ok(Some(svc)),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_finalizers(
        &self,
        namespace: &str,
        name: &str,
        finalizers: Vec<String>,
        resource_version: Option<String>,
    ) -> Result<(), Error> {
        // resourceVersion in a merge patch turns it into a conditional write
        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers,
                "resourceVersion": resource_version,
            }
        });
        self.services(namespace)
            .patch(
                name,
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await?;
        debug!(name = %name, namespace = %namespace, "Updated finalizers");
        Ok(())
    }

    async fn replace_service_status(&self, service: &InferenceService) -> Result<(), Error> {
        let name = service.name_any();
        let namespace = service
            .namespace()
            .ok_or_else(|| Error::MissingField("metadata.namespace".to_string()))?;
        let pp = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        self.services(&namespace)
            .replace_status(&name, &pp, status_body(service)?)
            .await?;
        Ok(())
    }

    async fn get_child(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error> {
        match self.children(resource, namespace).get(name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_child(
        &self,
        resource: &ApiResource,
        namespace: &str,
        child: &DynamicObject,
    ) -> Result<DynamicObject, Error> {
        let pp = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        Ok(self.children(resource, namespace).create(&pp, child).await?)
    }

    async fn replace_child(
        &self,
        resource: &ApiResource,
        namespace: &str,
        child: &DynamicObject,
    ) -> Result<DynamicObject, Error> {
        let pp = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        Ok(self
            .children(resource, namespace)
            .replace(&child.name_any(), &pp, child)
            .await?)
    }
}

/// Body of a status replace.
///
/// The whole object goes out so the stored status becomes exactly the
/// computed one, nested maps included. Its resourceVersion makes the write
/// conditional.
fn status_body(service: &InferenceService) -> Result<Vec<u8>, Error> {
    Ok(serde_json::to_vec(service)?)
}
