//! Health server for Kubernetes probes and Prometheus metrics.
//!
//! | Path | Purpose |
//! |------|---------|
//! | `/healthz` | liveness, 200 while the process answers |
//! | `/readyz` | readiness, 200 once the controller runs, 503 otherwise |
//! | `/metrics` | Prometheus text exposition |

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tracing::{error, info};

const METRIC_PREFIX: &str = "inference_operator";

/// States reported by the services gauge
const SERVICE_STATES: [&str; 3] = ["Creating", "Available", "Failed"];

/// Identifies one InferenceService
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ServiceLabels {
    pub namespace: String,
    pub name: String,
}

impl ServiceLabels {
    fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

/// Backend resource operation
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ChildOpLabels {
    pub backend: String,
    pub op: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StateLabels {
    pub state: String,
}

/// Operator metrics and the registry they are exposed through
pub struct Metrics {
    pub reconciliations_total: Family<ServiceLabels, Counter>,
    pub reconciliation_errors_total: Family<ServiceLabels, Counter>,
    pub reconcile_duration_seconds: Family<ServiceLabels, Histogram>,
    /// Creates, updates and no-op passes per backend
    pub child_operations_total: Family<ChildOpLabels, Counter>,
    /// InferenceServices by last observed state
    pub services: Family<StateLabels, Gauge>,
    /// Last observed state per (namespace, name); the gauge is derived from it
    service_states: Mutex<BTreeMap<(String, String), String>>,
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix(METRIC_PREFIX);

        let reconciliations_total = Family::<ServiceLabels, Counter>::default();
        registry.register(
            "reconciliations",
            "Total number of reconciliations",
            reconciliations_total.clone(),
        );

        let reconciliation_errors_total = Family::<ServiceLabels, Counter>::default();
        registry.register(
            "reconciliation_errors",
            "Total number of failed reconciliations",
            reconciliation_errors_total.clone(),
        );

        let reconcile_duration_seconds =
            Family::<ServiceLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 15))
            });
        registry.register(
            "reconcile_duration_seconds",
            "Duration of a reconcile pass in seconds",
            reconcile_duration_seconds.clone(),
        );

        let child_operations_total = Family::<ChildOpLabels, Counter>::default();
        registry.register(
            "child_operations",
            "Backend resource operations by backend and operation",
            child_operations_total.clone(),
        );

        let services = Family::<StateLabels, Gauge>::default();
        registry.register(
            "services",
            "Number of InferenceServices by state",
            services.clone(),
        );

        Self {
            reconciliations_total,
            reconciliation_errors_total,
            reconcile_duration_seconds,
            child_operations_total,
            services,
            service_states: Mutex::new(BTreeMap::new()),
            registry,
        }
    }

    pub fn record_reconcile(&self, namespace: &str, name: &str, duration_secs: f64) {
        let labels = ServiceLabels::new(namespace, name);
        self.reconciliations_total.get_or_create(&labels).inc();
        self.reconcile_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    pub fn record_error(&self, namespace: &str, name: &str) {
        self.reconciliation_errors_total
            .get_or_create(&ServiceLabels::new(namespace, name))
            .inc();
    }

    /// Record an operation on a backend resource (`create`, `update`, `noop`)
    pub fn record_child_op(&self, backend: &str, op: &str) {
        self.child_operations_total
            .get_or_create(&ChildOpLabels {
                backend: backend.to_string(),
                op: op.to_string(),
            })
            .inc();
    }

    pub fn observe_service_state(&self, namespace: &str, name: &str, state: &str) {
        let mut states = self
            .service_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        states.insert((namespace.to_string(), name.to_string()), state.to_string());
        self.publish_states(&states);
    }

    /// Stop counting a deleted service
    pub fn forget_service(&self, namespace: &str, name: &str) {
        let mut states = self
            .service_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        states.remove(&(namespace.to_string(), name.to_string()));
        self.publish_states(&states);
    }

    fn publish_states(&self, states: &BTreeMap<(String, String), String>) {
        for state in SERVICE_STATES {
            let count = states.values().filter(|s| s.as_str() == state).count();
            self.services
                .get_or_create(&StateLabels {
                    state: state.to_string(),
                })
                .set(i64::try_from(count).unwrap_or(i64::MAX));
        }
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if let Err(e) = encode(&mut buffer, &self.registry) {
            error!(error = %e, "Failed to encode metrics");
            return "# Error encoding metrics\n".to_string();
        }
        buffer
    }
}

/// Shared state for the health server
#[derive(Default)]
pub struct HealthState {
    /// Set once the controller runs; cleared on shutdown
    ready: AtomicBool,
    pub metrics: Metrics,
}

impl HealthState {
    /// Create a new health state (starts as not ready)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    if state.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.metrics.encode(),
    )
}

pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Serve probes and metrics on `0.0.0.0:port` until the listener fails.
pub async fn run_health_server(state: Arc<HealthState>, port: u16) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "Starting health server");
    axum::serve(listener, create_router(state)).await
}
