//! inference-operator entry point.
//!
//! Starts the health server, waits for the leader lease, then runs the
//! InferenceService controller until it ends or a shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams};
use tokio::signal;
use tracing::{error, info, warn};

use inference_operator::OperatorConfig;
use inference_operator::health::{HealthState, run_health_server};
use inference_operator::run_controller;

const LEASE_NAME: &str = "inference-operator-leader";
const LEASE_TTL: Duration = Duration::from_secs(15);
const LEASE_RENEW_INTERVAL: Duration = Duration::from_secs(5);

/// Time left to in-flight passes after readiness is withdrawn
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("inference_operator=info".parse()?)
                .add_directive("kube=info".parse()?)
                .add_directive("kube_leader_election=info".parse()?),
        )
        .json()
        .init();

    let config = OperatorConfig::from_env();
    info!(
        watch_namespace = ?config.watch_namespace,
        health_port = config.health_port,
        backends = ?config.enabled_backends,
        "Starting inference-operator"
    );

    let client = Client::try_default().await?;

    let holder_id = config.pod_name.clone().unwrap_or_else(|| {
        warn!("POD_NAME not set, using hostname as lease holder");
        hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string())
    });
    let lease = lease_lock(&client, &config.pod_namespace, &holder_id);

    let health_state = Arc::new(HealthState::new());

    // Probes answer before leadership is acquired
    let health_handle = {
        let health_state = health_state.clone();
        let port = config.health_port;
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state, port).await {
                error!(error = %e, "Health server failed");
            }
        })
    };

    info!(
        holder_id = %holder_id,
        namespace = %config.pod_namespace,
        lease_name = LEASE_NAME,
        "Waiting for leadership"
    );
    acquire_leadership(&lease).await;

    let renewal_handle = tokio::spawn(renew_leadership(lease));

    let controller_handle = {
        let health_state = health_state.clone();
        tokio::spawn(run_controller(client, config, Some(health_state)))
    };

    tokio::select! {
        result = controller_handle => {
            if let Err(e) = result {
                error!(error = %e, "Controller task panicked");
            }
        }
        result = health_handle => {
            if let Err(e) = result {
                error!(error = %e, "Health server task panicked");
            }
        }
        // Renewal only returns by panicking
        Err(e) = renewal_handle => {
            error!(error = %e, "Lease renewal task panicked");
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal");
            health_state.set_ready(false);
            info!(
                grace_secs = SHUTDOWN_GRACE_PERIOD.as_secs(),
                "Waiting for in-flight reconciliations"
            );
            tokio::time::sleep(SHUTDOWN_GRACE_PERIOD).await;
        }
    }

    info!("Operator stopped");
    Ok(())
}

fn lease_lock(client: &Client, namespace: &str, holder_id: &str) -> LeaseLock {
    LeaseLock::new(
        client.clone(),
        namespace,
        LeaseLockParams {
            holder_id: holder_id.to_string(),
            lease_name: LEASE_NAME.to_string(),
            lease_ttl: LEASE_TTL,
        },
    )
}

/// Block until this instance holds the lease.
async fn acquire_leadership(lease: &LeaseLock) {
    loop {
        match lease.try_acquire_or_renew().await {
            Ok(result) if result.acquired_lease => {
                info!("Acquired leadership");
                return;
            }
            Ok(_) => info!("Another instance is leader, waiting"),
            Err(e) => warn!(error = %e, "Failed to acquire lease, retrying"),
        }
        tokio::time::sleep(LEASE_RENEW_INTERVAL).await;
    }
}

/// Renew the lease forever; exit the process once it is lost so the pod
/// restarts and re-enters the election.
#[allow(clippy::exit)]
async fn renew_leadership(lease: LeaseLock) {
    loop {
        tokio::time::sleep(LEASE_RENEW_INTERVAL).await;
        match lease.try_acquire_or_renew().await {
            Ok(result) if result.acquired_lease => {}
            Ok(_) => {
                error!("Lost leadership, shutting down");
                std::process::exit(1);
            }
            Err(e) => {
                error!(error = %e, "Failed to renew lease, shutting down");
                std::process::exit(1);
            }
        }
    }
}

/// Wait for SIGTERM or SIGINT.
///
/// Failing to install a handler leaves no way to shut down cleanly, so it
/// aborts startup.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
