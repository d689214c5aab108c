//! Reconciliation loop for InferenceService.
//!
//! The controller hands each pass the cached parent. The pass selects a
//! backend adapter, converges the backend resource, folds its status back
//! and persists it when it changed.
//!
//! ```text
//!   no finalizer ──add──▶ Active ──deletionTimestamp──▶ Deleting ──remove──▶ Gone
//!                          │  ▲
//!                          └──┘ build → converge → propagate → persist
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use kube::{ResourceExt, runtime::controller::Action};
use tracing::{debug, error, info, warn};

use crate::{
    backends::{BackendAdapter, BackendKind, BackendStatus, KServeAdapter, SeldonAdapter},
    controller::{
        common::{with_finalizer, without_finalizer},
        context::Context,
        convergence::ConvergenceEngine,
        error::{Error, Stage},
        events::{actions, reasons},
        status::{is_available, propagate, unsupported_backend},
    },
    crd::{InferenceService, InferenceServiceStatus, ServiceState},
};

/// Finalizer name for graceful deletion
pub const FINALIZER: &str = "serving.inference-operator.io/finalizer";

/// Reconcile an InferenceService
///
/// This is the main reconciliation function called by the controller.
/// It handles the full lifecycle: finalizer, convergence, status, deletion.
pub async fn reconcile(obj: Arc<InferenceService>, ctx: Arc<Context>) -> Result<Action, Error> {
    let start_time = Instant::now();
    let name = obj.name_any();
    let namespace = obj
        .namespace()
        .ok_or_else(|| Error::MissingField("metadata.namespace".to_string()))?;

    debug!(name = %name, namespace = %namespace, "Reconciling InferenceService");

    let result = reconcile_service(&obj, &ctx, &namespace, &name).await;

    if let Some(ref health_state) = ctx.health_state {
        health_state.metrics.record_reconcile(
            &namespace,
            &name,
            start_time.elapsed().as_secs_f64(),
        );
    }

    if let Err(ref e) = result {
        // Unsupported backends report once through their own event; conflicts
        // clear on the next pass.
        let reported = matches!(e.root(), Error::UnsupportedBackend(_));
        if !reported && !e.is_conflict() && !e.is_not_found() {
            ctx.publish_warning_event(
                &obj,
                reasons::INTERNAL_ERROR,
                actions::RECONCILE,
                Some(e.to_string()),
            )
            .await;
        }
    }

    result
}

async fn reconcile_service(
    obj: &InferenceService,
    ctx: &Context,
    namespace: &str,
    name: &str,
) -> Result<Action, Error> {
    if obj.metadata.deletion_timestamp.is_some() {
        return handle_deletion(obj, ctx, namespace, name).await;
    }

    // The child is not touched in the pass that adds the finalizer
    if let Some(finalizers) = with_finalizer(obj.finalizers(), FINALIZER) {
        info!(name = %name, namespace = %namespace, "Adding finalizer");
        ctx.client
            .set_finalizers(namespace, name, finalizers, obj.resource_version())
            .await
            .map_err(|e| e.in_stage(Stage::Finalizer))?;
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    let observed_gen = obj.status.as_ref().and_then(|s| s.observed_generation);
    if observed_gen != obj.metadata.generation {
        info!(
            name = %name,
            current_gen = ?obj.metadata.generation,
            observed_gen = ?observed_gen,
            "Spec changed, reconciling"
        );
    }

    let now = format!("{:.0}", jiff::Timestamp::now());

    let kind = obj
        .spec
        .backend
        .parse::<BackendKind>()
        .and_then(|kind| {
            if ctx.backends.contains(&kind) {
                Ok(kind)
            } else {
                Err(Error::UnsupportedBackend(obj.spec.backend.clone()))
            }
        });

    let kind = match kind {
        Ok(kind) => kind,
        Err(e) => {
            warn!(name = %name, backend = %obj.spec.backend, "Unsupported backend");
            let persisted = persist_status(obj, ctx, namespace, name, |current| {
                unsupported_backend(current, &obj.spec.backend, &now)
            })
            .await?;
            if persisted.written {
                ctx.publish_warning_event(
                    obj,
                    reasons::UNSUPPORTED_BACKEND,
                    actions::RECONCILE,
                    Some(e.to_string()),
                )
                .await;
            }
            return Err(e.in_stage(Stage::Build));
        }
    };

    let child = match kind {
        BackendKind::KServe => converge_backend(&KServeAdapter, obj, ctx).await?,
        BackendKind::Seldon => converge_backend(&SeldonAdapter, obj, ctx).await?,
    };
    let state = persist_status(obj, ctx, namespace, name, |current| {
        propagate(current, kind.as_str(), &child, &now)
    })
    .await?
    .state;

    if let Some(ref health_state) = ctx.health_state {
        health_state
            .metrics
            .observe_service_state(namespace, name, &state.to_string());
    }

    Ok(Action::requeue(requeue_interval(state)))
}

/// Build and converge the backend resource, returning its status.
async fn converge_backend<A: BackendAdapter>(
    adapter: &A,
    obj: &InferenceService,
    ctx: &Context,
) -> Result<BackendStatus, Error> {
    let desired = adapter.build_desired(&obj.metadata, &obj.spec);

    let converged = match ConvergenceEngine::new(adapter, ctx.client.as_ref())
        .converge(&desired)
        .await
    {
        Ok(converged) => converged,
        Err(e) => {
            if matches!(e, Error::ConvergenceFailed { .. }) {
                ctx.publish_warning_event(
                    obj,
                    reasons::CONVERGENCE_FAILED,
                    actions::CONVERGE,
                    Some(e.to_string()),
                )
                .await;
            }
            return Err(e.in_stage(Stage::Converge));
        }
    };

    if let Some(ref health_state) = ctx.health_state {
        health_state
            .metrics
            .record_child_op(adapter.kind().as_str(), converged.op.as_str());
    }

    Ok(converged.status)
}

/// Outcome of a status write
struct Persisted {
    /// State of the computed status
    state: ServiceState,
    written: bool,
}

/// Compute the status from the freshly read parent and write it if it
/// differs.
///
/// `build` maps the stored status to the new one, so condition transition
/// times carry over from what is stored rather than from a lagging cache.
/// Conflicts are left for the next pass.
async fn persist_status(
    obj: &InferenceService,
    ctx: &Context,
    namespace: &str,
    name: &str,
    build: impl FnOnce(&InferenceServiceStatus) -> InferenceServiceStatus,
) -> Result<Persisted, Error> {
    let fresh = ctx
        .client
        .get_service(namespace, name)
        .await
        .map_err(|e| e.in_stage(Stage::Persist))?;

    let current = fresh
        .as_ref()
        .unwrap_or(obj)
        .status
        .clone()
        .unwrap_or_default();
    let mut status = build(&current);
    status.observed_generation = obj.metadata.generation;
    let state = status.state;

    let Some(mut fresh) = fresh else {
        debug!(name = %name, "InferenceService gone before status write");
        return Ok(Persisted { state, written: false });
    };

    if fresh.status.as_ref() == Some(&status) {
        debug!(name = %name, "Status unchanged, skipping update");
        return Ok(Persisted { state, written: false });
    }

    let was_available = is_available(fresh.status.as_ref());
    let now_available = status.state == ServiceState::Available;
    fresh.status = Some(status);

    match ctx.client.replace_service_status(&fresh).await {
        Ok(()) => {}
        Err(e) if e.is_conflict() => {
            debug!(name = %name, "Status update conflicted, leaving it to the next pass");
            return Ok(Persisted { state, written: false });
        }
        Err(e) => {
            error!(name = %name, error = %e, "Failed to update status");
            ctx.publish_warning_event(
                obj,
                reasons::UPDATE_FAILED,
                actions::UPDATE_STATUS,
                Some(e.to_string()),
            )
            .await;
            return Err(e.in_stage(Stage::Persist));
        }
    }

    if !was_available && now_available {
        ctx.publish_normal_event(
            obj,
            reasons::AVAILABLE,
            actions::RECONCILE,
            Some(format!("InferenceService {name} is Available")),
        )
        .await;
    } else if was_available && !now_available {
        ctx.publish_warning_event(
            obj,
            reasons::UNAVAILABLE,
            actions::RECONCILE,
            Some(format!("InferenceService {name} is no longer Available")),
        )
        .await;
    }

    Ok(Persisted { state, written: true })
}

/// Handle deletion of an InferenceService
///
/// The backend resource carries an owner reference, so the platform garbage
/// collector removes it once the parent is gone.
async fn handle_deletion(
    obj: &InferenceService,
    ctx: &Context,
    namespace: &str,
    name: &str,
) -> Result<Action, Error> {
    if let Some(finalizers) = without_finalizer(obj.finalizers(), FINALIZER) {
        info!(name = %name, namespace = %namespace, "Removing finalizer");
        ctx.client
            .set_finalizers(namespace, name, finalizers, obj.resource_version())
            .await
            .map_err(|e| e.in_stage(Stage::Finalizer))?;
    }

    if let Some(ref health_state) = ctx.health_state {
        health_state.metrics.forget_service(namespace, name);
    }

    Ok(Action::await_change())
}

/// Periodic resync interval by state
fn requeue_interval(state: ServiceState) -> Duration {
    match state {
        ServiceState::Available => Duration::from_secs(300),
        ServiceState::Creating => Duration::from_secs(30),
        ServiceState::Failed => Duration::from_secs(120),
    }
}

/// Error policy for the controller
pub fn error_policy(obj: Arc<InferenceService>, error: &Error, ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();

    if let Some(ref health_state) = ctx.health_state {
        health_state.metrics.record_error(&namespace, &name);
    }

    if error.is_not_found() {
        debug!(name = %name, "Resource not found (likely deleted)");
        return Action::await_change();
    }

    if error.is_retryable() {
        warn!(name = %name, error = %error, "Retryable error, will retry");
    } else {
        error!(name = %name, error = %error, "Non-retryable error");
    }
    Action::requeue(error.requeue_after())
}
