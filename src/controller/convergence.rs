//! Convergence of backend resources.
//!
//! Get-or-create-or-update of a single backend resource, parameterised over
//! a [`BackendAdapter`]. Updates copy only the adapter-owned fields into the
//! live object, so fields written by the backend's own controller (status,
//! revision bookkeeping, defaulted spec fields) survive untouched.

use std::time::Duration;

use kube::api::{ApiResource, DynamicObject};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::backends::common::{from_dynamic, to_dynamic};
use crate::backends::{BackendAdapter, BackendStatus, ChildResource};
use crate::client::ServingClient;
use crate::controller::error::{Error, Result};

/// Update attempts before giving up on optimistic-concurrency conflicts.
pub const MAX_UPDATE_ATTEMPTS: u32 = 5;

/// Base delay between conflicting update attempts, multiplied by the attempt.
pub const CONFLICT_BACKOFF: Duration = Duration::from_millis(10);

/// What a convergence pass did to the backend resource.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChildOp {
    Create,
    Update,
    Noop,
}

impl ChildOp {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ChildOp::Create => "create",
            ChildOp::Update => "update",
            ChildOp::Noop => "noop",
        }
    }
}

impl std::fmt::Display for ChildOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful convergence pass.
#[derive(Clone, Debug, PartialEq)]
pub struct Converged {
    /// Status reported by the live backend resource.
    pub status: BackendStatus,
    /// Operation performed.
    pub op: ChildOp,
}

/// Drives one backend resource towards its desired state.
pub struct ConvergenceEngine<'a, A: BackendAdapter> {
    adapter: &'a A,
    client: &'a dyn ServingClient,
}

impl<'a, A: BackendAdapter> ConvergenceEngine<'a, A> {
    pub fn new(adapter: &'a A, client: &'a dyn ServingClient) -> Self {
        Self { adapter, client }
    }

    /// Converge the live backend resource onto `desired`.
    ///
    /// Performs at most one create or one update, plus bounded retries when
    /// an update conflicts with a concurrent writer.
    pub async fn converge(&self, desired: &A::Child) -> Result<Converged> {
        let meta = desired.metadata();
        let name = meta
            .name
            .clone()
            .ok_or_else(|| Error::MissingField("metadata.name".to_string()))?;
        let namespace = meta
            .namespace
            .clone()
            .ok_or_else(|| Error::MissingField("metadata.namespace".to_string()))?;
        let resource = self.adapter.api_resource();
        let desired_obj = to_dynamic(desired)?;

        let live = match self.client.get_child(&resource, &namespace, &name).await? {
            Some(live) => live,
            None => match self.client.create_child(&resource, &namespace, &desired_obj).await {
                Ok(created) => {
                    info!(
                        name = %name,
                        namespace = %namespace,
                        backend = %self.adapter.kind(),
                        "Created backend resource"
                    );
                    return Ok(Converged {
                        status: self.status_of(&created)?,
                        op: ChildOp::Create,
                    });
                }
                Err(e) if e.is_conflict() => {
                    // Someone else created it between our read and write
                    debug!(name = %name, "Backend resource appeared concurrently, re-reading");
                    self.refetch(&resource, &namespace, &name).await?
                }
                Err(e) if e.is_rejected() => return Err(rejected(&name, &e)),
                Err(e) => return Err(e),
            },
        };

        self.update(&resource, &namespace, &name, desired, &desired_obj, live)
            .await
    }

    async fn update(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        desired: &A::Child,
        desired_obj: &DynamicObject,
        mut live: DynamicObject,
    ) -> Result<Converged> {
        let field = self.adapter.owned_spec_field();

        let observed: A::Child = from_dynamic(&live)?;
        if !self.adapter.diff(desired, &observed) {
            debug!(name = %name, namespace = %namespace, "Backend resource up to date");
            return Ok(Converged {
                status: self.adapter.status(&observed),
                op: ChildOp::Noop,
            });
        }

        let patch = json_patch::diff(&owned_view(&live, field), &owned_view(desired_obj, field));
        let diff = serde_json::to_string(&patch)?;
        info!(
            name = %name,
            namespace = %namespace,
            backend = %self.adapter.kind(),
            diff = %diff,
            "Updating backend resource"
        );

        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            apply_owned(&mut live, desired_obj, field);
            match self.client.replace_child(resource, namespace, &live).await {
                Ok(updated) => {
                    return Ok(Converged {
                        status: self.status_of(&updated)?,
                        op: ChildOp::Update,
                    });
                }
                Err(e) if e.is_conflict() => {
                    warn!(
                        name = %name,
                        attempt,
                        max_attempts = MAX_UPDATE_ATTEMPTS,
                        "Conflict updating backend resource"
                    );
                    if attempt == MAX_UPDATE_ATTEMPTS {
                        break;
                    }
                    tokio::time::sleep(CONFLICT_BACKOFF * attempt).await;
                    live = self.refetch(resource, namespace, name).await?;
                    let observed: A::Child = from_dynamic(&live)?;
                    if !self.adapter.diff(desired, &observed) {
                        return Ok(Converged {
                            status: self.adapter.status(&observed),
                            op: ChildOp::Noop,
                        });
                    }
                }
                Err(e) if e.is_rejected() => return Err(rejected(name, &e)),
                Err(e) => return Err(e),
            }
        }

        Err(Error::ConvergenceFailed {
            name: name.to_string(),
            reason: format!("update conflicted {MAX_UPDATE_ATTEMPTS} times"),
        })
    }

    async fn refetch(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<DynamicObject> {
        self.client
            .get_child(resource, namespace, name)
            .await?
            .ok_or_else(|| {
                Error::TransientStore(format!("backend resource {namespace}/{name} disappeared"))
            })
    }

    fn status_of(&self, obj: &DynamicObject) -> Result<BackendStatus> {
        let child: A::Child = from_dynamic(obj)?;
        Ok(self.adapter.status(&child))
    }
}

fn rejected(name: &str, e: &Error) -> Error {
    Error::ConvergenceFailed {
        name: name.to_string(),
        reason: format!("backend rejected the desired spec: {e}"),
    }
}

/// The adapter-owned part of a backend resource, for diff logging.
fn owned_view(obj: &DynamicObject, field: &str) -> Value {
    json!({
        "metadata": { "labels": obj.metadata.labels.clone().unwrap_or_default() },
        "spec": { field: obj.data.get("spec").and_then(|s| s.get(field)).cloned() },
    })
}

/// Copy the adapter-owned fields of `desired` into `live`.
fn apply_owned(live: &mut DynamicObject, desired: &DynamicObject, field: &str) {
    live.metadata.labels = desired.metadata.labels.clone();
    let value = desired
        .data
        .get("spec")
        .and_then(|s| s.get(field))
        .cloned()
        .unwrap_or(Value::Null);

    if !live.data.is_object() {
        live.data = json!({});
    }
    if let Some(data) = live.data.as_object_mut() {
        let spec = data.entry("spec").or_insert_with(|| json!({}));
        match spec.as_object_mut() {
            Some(spec) => {
                spec.insert(field.to_string(), value);
            }
            None => *spec = json!({ field: value }),
        }
    }
}
