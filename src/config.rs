//! Operator configuration.
//!
//! Read once at startup from the environment. Invalid values fall back to
//! their defaults with a warning rather than aborting startup.

use tracing::warn;

use crate::backends::BackendKind;

/// Default port of the health and metrics server
pub const DEFAULT_HEALTH_PORT: u16 = 8080;

/// Runtime configuration of the operator
#[derive(Clone, Debug, PartialEq)]
pub struct OperatorConfig {
    /// Namespace to watch; `None` watches cluster-wide
    pub watch_namespace: Option<String>,
    /// Port of the health and metrics server
    pub health_port: u16,
    /// Backends whose resources are reconciled and watched
    pub enabled_backends: Vec<BackendKind>,
    /// Pod name, used as leader election identity and event instance
    pub pod_name: Option<String>,
    /// Namespace holding the leader election lease
    pub pod_namespace: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            health_port: DEFAULT_HEALTH_PORT,
            enabled_backends: BackendKind::ALL.to_vec(),
            pod_name: None,
            pod_namespace: "default".to_string(),
        }
    }
}

impl OperatorConfig {
    /// Load configuration from process environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let health_port = match non_empty("HEALTH_PORT") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!(value = %raw, "Invalid HEALTH_PORT, using default");
                DEFAULT_HEALTH_PORT
            }),
            None => DEFAULT_HEALTH_PORT,
        };

        let enabled_backends = match non_empty("ENABLED_BACKENDS") {
            Some(raw) => parse_backends(&raw),
            None => defaults.enabled_backends,
        };

        let pod_namespace = non_empty("POD_NAMESPACE").unwrap_or_else(|| {
            warn!("POD_NAMESPACE not set, using 'default'");
            defaults.pod_namespace
        });

        Self {
            watch_namespace: non_empty("WATCH_NAMESPACE"),
            health_port,
            enabled_backends,
            pod_name: non_empty("POD_NAME"),
            pod_namespace,
        }
    }
}

/// Parse a comma-separated backend list, skipping unknown entries.
///
/// An empty result falls back to every backend.
fn parse_backends(raw: &str) -> Vec<BackendKind> {
    let mut backends = Vec::new();
    for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match item.parse::<BackendKind>() {
            Ok(kind) if !backends.contains(&kind) => backends.push(kind),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Ignoring entry in ENABLED_BACKENDS"),
        }
    }
    if backends.is_empty() {
        warn!(value = %raw, "ENABLED_BACKENDS names no supported backend, enabling all");
        return BackendKind::ALL.to_vec();
    }
    backends
}
